use crate::builder::WaitStrategy;
use crate::indicator::{ReadIndicator, ShardedIndicator};
use crate::reader::ReadHandle;
use crate::state::{Epoch, SLOW_DRAIN_SPINS, SharedState, Side};
use crate::sync::{Arc, Mutex, spin_loop, yield_now};
use std::fmt;

/// The unique write handle of a left-right primitive.
///
/// There is exactly one `WriteHandle` per primitive. It is `!Clone` and
/// `write` takes `&mut self`, so the single-writer rule is enforced at compile
/// time. To issue writes from several threads, convert it with
/// [`into_shared`](Self::into_shared).
///
/// Every write is applied twice: first to the hidden replica, which is then
/// published, and again to the previously published replica once all readers
/// that could still see it have left.
///
/// 左右原语的唯一写入句柄。
/// 每个原语恰好有一个 `WriteHandle`。它是 `!Clone` 的，且 `write` 接受 `&mut self`，
/// 因此单写入者规则在编译期被强制执行。若要从多个线程写入，
/// 请使用 [`into_shared`](Self::into_shared) 进行转换。
/// 每次写入都会被应用两次：先应用于隐藏副本并将其发布，
/// 再在所有可能仍看到旧副本的读者离开后应用于之前发布的副本。
pub struct WriteHandle<T, I: ReadIndicator = ShardedIndicator> {
    pub(crate) shared: Arc<SharedState<T, I>>,
    pub(crate) wait: WaitStrategy,
    pub(crate) poisoned: bool,
    pub(crate) writes: u64,
}

impl<T, I: ReadIndicator> WriteHandle<T, I> {
    pub(crate) fn new(shared: Arc<SharedState<T, I>>, wait: WaitStrategy) -> Self {
        Self {
            shared,
            wait,
            poisoned: false,
            writes: 0,
        }
    }

    /// Apply `mutator` to both replicas and return the result of its first call.
    ///
    /// Protocol:
    /// 1. Apply `mutator` to the hidden replica. Readers are unaffected.
    /// 2. Publish the hidden replica. Reads that start from now on see the new state.
    /// 3. Drain: wait out readers of the next epoch, advance the epoch, then
    ///    wait until every reader registered under the old epoch has left.
    /// 4. Apply `mutator` to the previously published replica.
    ///
    /// `mutator` is called twice, once per replica, and must produce the same
    /// effect on both: it may only depend on the replica it is given and on
    /// what it captured, and it must not have side effects elsewhere.
    ///
    /// Blocks only in the drain, for as long as the slowest reader that was
    /// inside the old epoch. Readers are never blocked.
    ///
    /// # Panics
    ///
    /// Panics if the handle is poisoned. If `mutator` panics, the panic
    /// propagates and the handle becomes poisoned; see [`recover`](Self::recover).
    ///
    /// 将 `mutator` 应用于两个副本，并返回其第一次调用的结果。
    /// 协议：
    /// 1. 将 `mutator` 应用于隐藏副本。读者不受影响。
    /// 2. 发布隐藏副本。此后开始的读取看到新状态。
    /// 3. 排空：等待下一纪元的读者离开，推进纪元，然后等待所有注册在旧纪元下的读者离开。
    /// 4. 将 `mutator` 应用于之前发布的副本。
    /// `mutator` 会被调用两次，每个副本一次，并且必须对两者产生相同的效果。
    pub fn write<R>(&mut self, mut mutator: impl FnMut(&mut T) -> R) -> R {
        assert!(
            !self.poisoned,
            "write on a poisoned WriteHandle: a previous mutator panicked and the replicas may differ; call `recover` first"
        );

        let active = self.shared.load_side();
        let stale = active.other();

        // Cleared only once both replicas hold the mutation.
        self.poisoned = true;

        // SAFETY: `stale` is not published, and the previous write drained
        // every reader that could have resolved to it.
        let result = self
            .shared
            .replica(stale)
            .with_mut(|ptr| mutator(unsafe { &mut *ptr }));

        self.shared.publish(stale);
        tracing::trace!(target: "swmr_leftright", published = ?stale, "published hidden replica");

        self.drain();

        // SAFETY: readers that arrived after the publish resolve to `stale`, and
        // the drain waited out every reader registered before the epoch advance.
        self.shared
            .replica(active)
            .with_mut(|ptr| mutator(unsafe { &mut *ptr }));

        self.poisoned = false;
        self.writes += 1;
        result
    }

    /// Wait until no reader can still be resolving through the previously
    /// published replica.
    ///
    /// A reader may load the epoch, stall, and only register after this drain
    /// has finished. It then sits in what becomes `next` for the following
    /// write, so the first wait is required as well.
    ///
    /// 等待直到没有读者仍可能通过之前发布的副本进行解析。
    fn drain(&self) {
        let old = self.shared.load_epoch();
        let next = old.next();

        let straggler_spins = self.wait_until_empty(next);
        self.shared.advance_epoch(next);
        let drain_spins = self.wait_until_empty(old);

        if straggler_spins + drain_spins >= SLOW_DRAIN_SPINS {
            tracing::debug!(
                target: "swmr_leftright",
                old = old.index(),
                next = next.index(),
                straggler_spins,
                drain_spins,
                "slow drain: readers held the old epoch"
            );
        }
    }

    fn wait_until_empty(&self, epoch: Epoch) -> usize {
        let indicator = self.shared.indicator(epoch);
        let mut backoff = Backoff::new(self.wait);
        while !indicator.is_empty() {
            backoff.snooze();
        }
        backoff.spins
    }

    /// The published replica, read without registering as a reader.
    ///
    /// The writer is the only party that mutates replicas, and it cannot write
    /// while this borrow is alive.
    ///
    /// 已发布的副本，读取时无需注册为读者。
    #[inline]
    pub fn get(&self) -> &T {
        let side = self.shared.load_side();
        // SAFETY: only `write(&mut self)` mutates a replica.
        self.shared.replica(side).with(|ptr| unsafe { &*ptr })
    }

    /// Both replicas as `(published, hidden)`.
    ///
    /// Outside a poisoned state the two are equal.
    ///
    /// 以 `(已发布, 隐藏)` 形式返回两个副本。
    /// 在非中毒状态下二者相等。
    pub fn replicas(&self) -> (&T, &T) {
        let side = self.shared.load_side();
        // SAFETY: only `write(&mut self)` mutates a replica.
        let published = self.shared.replica(side).with(|ptr| unsafe { &*ptr });
        let hidden = self.shared.replica(side.other()).with(|ptr| unsafe { &*ptr });
        (published, hidden)
    }

    /// Create another read handle for this primitive.
    pub fn reader(&self) -> ReadHandle<T, I> {
        ReadHandle::new(Arc::clone(&self.shared))
    }

    /// Number of completed writes.
    #[inline]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// The replica new readers currently resolve to.
    #[inline]
    pub fn published_side(&self) -> Side {
        self.shared.load_side()
    }

    /// The epoch new readers currently register under.
    #[inline]
    pub fn epoch(&self) -> Epoch {
        self.shared.load_epoch()
    }

    /// `true` if a mutator panicked during a write.
    ///
    /// Readers keep observing the published replica, which is always fully
    /// formed, but the hidden replica may hold a partial mutation.
    ///
    /// 如果某个 mutator 在写入期间 panic，则为 `true`。
    /// 读者继续观察已发布的副本（它始终是完整的），但隐藏副本可能包含部分修改。
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Wrap the handle in a mutex so several threads can write, one at a time.
    pub fn into_shared(self) -> SharedWriteHandle<T, I> {
        SharedWriteHandle {
            inner: Arc::new(Mutex::new(self)),
        }
    }
}

impl<T: Clone, I: ReadIndicator> WriteHandle<T, I> {
    /// Clear poisoning by overwriting the hidden replica with the published one.
    ///
    /// Whatever the panicking mutator managed to apply to the published
    /// replica stays; whatever it left in the hidden replica is discarded.
    /// Does nothing if the handle is not poisoned.
    ///
    /// 用已发布的副本覆盖隐藏副本，从而清除中毒状态。
    /// 如果句柄未中毒则不做任何事。
    pub fn recover(&mut self) {
        if !self.poisoned {
            return;
        }

        let published = self.shared.load_side();
        // SAFETY: a panic before the publish left readers on `published`; a
        // panic after it happened after the drain. Either way no reader can be
        // inside the hidden replica.
        self.shared.replica(published).with(|src| {
            self.shared
                .replica(published.other())
                .with_mut(|dst| unsafe { (*dst).clone_from(&*src) })
        });

        self.poisoned = false;
        tracing::info!(target: "swmr_leftright", published = ?published, "recovered poisoned write handle");
    }
}

impl<T, I: ReadIndicator> Drop for WriteHandle<T, I> {
    fn drop(&mut self) {
        if self.poisoned {
            tracing::warn!(
                target: "swmr_leftright",
                writes = self.writes,
                "write handle dropped while poisoned: a mutator panicked mid-write"
            );
        }
    }
}

impl<T, I: ReadIndicator> fmt::Debug for WriteHandle<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("side", &self.shared.load_side())
            .field("epoch", &self.shared.load_epoch())
            .field("writes", &self.writes)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

/// A cloneable write handle that serializes writers through a mutex.
///
/// Readers are unaffected by the mutex; only concurrent writers queue on it.
///
/// 通过互斥锁串行化写入者的可克隆写入句柄。
/// 读者不受互斥锁影响；只有并发的写入者会在其上排队。
pub struct SharedWriteHandle<T, I: ReadIndicator = ShardedIndicator> {
    inner: Arc<Mutex<WriteHandle<T, I>>>,
}

impl<T, I: ReadIndicator> SharedWriteHandle<T, I> {
    /// Lock the writer and run [`WriteHandle::write`].
    pub fn write<R>(&self, mutator: impl FnMut(&mut T) -> R) -> R {
        self.inner.lock().write(mutator)
    }

    /// Run `f` with exclusive access to the underlying write handle.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut WriteHandle<T, I>) -> R) -> R {
        let mut writer = self.inner.lock();
        f(&mut *writer)
    }

    pub fn reader(&self) -> ReadHandle<T, I> {
        self.inner.lock().reader()
    }
}

impl<T, I: ReadIndicator> Clone for SharedWriteHandle<T, I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Wait policy state for one drain loop.
struct Backoff {
    strategy: WaitStrategy,
    step: u32,
    spins: usize,
}

impl Backoff {
    #[inline]
    fn new(strategy: WaitStrategy) -> Self {
        Self {
            strategy,
            step: 0,
            spins: 0,
        }
    }

    #[inline]
    fn snooze(&mut self) {
        self.spins += 1;
        match self.strategy {
            WaitStrategy::Yield => yield_now(),
            WaitStrategy::Spin => spin_loop(),
            WaitStrategy::Backoff { spin_limit } => {
                if self.step <= spin_limit {
                    for _ in 0..(1u32 << self.step.min(31)) {
                        spin_loop();
                    }
                    self.step += 1;
                } else {
                    yield_now();
                }
            }
        }
    }
}
