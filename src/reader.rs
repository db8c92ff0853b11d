use crate::indicator::{ReadIndicator, ShardedIndicator};
use crate::state::{Epoch, SharedState};
use crate::sync::{Arc, UnsafeCell};
use std::fmt;
use std::ops::Deref;

/// A handle for wait-free reads of the replicated value.
///
/// `ReadHandle` is `Clone`, `Send` and `Sync`. Clone it into every thread that
/// needs to read; all clones share the same primitive. Reads never block and
/// never wait for the writer.
///
/// 用于无等待读取复制值的句柄。
/// `ReadHandle` 是 `Clone`、`Send` 和 `Sync` 的。将其克隆到每个需要读取的线程中；
/// 所有克隆共享同一个原语。读取从不阻塞，也从不等待写入者。
pub struct ReadHandle<T, I: ReadIndicator = ShardedIndicator> {
    pub(crate) shared: Arc<SharedState<T, I>>,
}

impl<T, I: ReadIndicator> ReadHandle<T, I> {
    pub(crate) fn new(shared: Arc<SharedState<T, I>>) -> Self {
        Self { shared }
    }

    /// Apply `visitor` to the currently published replica and return its result.
    ///
    /// Runs in a bounded number of steps regardless of what the writer is
    /// doing. The visitor sees one fully formed replica: either the state
    /// before a concurrent write or the state after it, never a mixture.
    ///
    /// If `visitor` panics, the panic propagates to the caller; the reader is
    /// still deregistered, so a panicking reader never starves the writer.
    ///
    /// 将 `visitor` 应用于当前已发布的副本并返回其结果。
    /// 无论写入者在做什么，都在有限步内完成。访问者看到的是一个完整的副本：
    /// 要么是并发写入之前的状态，要么是之后的状态，绝不会是两者的混合。
    /// 如果 `visitor` panic，panic 会传播给调用者；读者依然会被注销，
    /// 因此 panic 的读者永远不会饿死写入者。
    #[inline]
    pub fn read<R>(&self, visitor: impl FnOnce(&T) -> R) -> R {
        let registration = Registration::arrive(&*self.shared);
        let side = self.shared.load_side();
        let result = self
            .shared
            .replica(side)
            // SAFETY: we are registered under `registration.epoch`, so the
            // writer will not touch this replica until we depart.
            .with(|ptr| visitor(unsafe { &*ptr }));
        drop(registration);
        result
    }

    /// Enter the primitive and hold the published replica until the guard drops.
    ///
    /// Prefer [`read`](Self::read) for short accesses. A held guard keeps its
    /// epoch occupied, so the next `write` waits in its drain until the guard
    /// is dropped. Readers are never affected. Writing from the thread that
    /// holds the guard therefore deadlocks.
    ///
    /// 进入原语，并在守卫被 drop 之前持有已发布的副本。
    /// 短时间访问请优先使用 [`read`](Self::read)。被持有的守卫会占用其纪元，
    /// 因此下一次 `write` 会在排空阶段等待，直到守卫被 drop。读者不受影响。
    /// 因此在持有守卫的线程上写入会导致死锁。
    #[inline]
    pub fn enter(&self) -> ReadGuard<'_, T, I> {
        let registration = Registration::arrive(&*self.shared);
        let side = self.shared.load_side();
        ReadGuard {
            replica: self.shared.replica(side),
            _registration: registration,
        }
    }
}

impl<T, I: ReadIndicator> Clone for ReadHandle<T, I> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, I: ReadIndicator> fmt::Debug for ReadHandle<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHandle")
            .field("side", &self.shared.load_side())
            .field("epoch", &self.shared.load_epoch())
            .finish()
    }
}

/// One reader's presence in one epoch. Departs on drop, including during unwinding.
/// 一个读者在一个纪元中的存在。在 drop 时离开，包括栈展开期间。
struct Registration<'a, T, I: ReadIndicator> {
    shared: &'a SharedState<T, I>,
    epoch: Epoch,
}

impl<'a, T, I: ReadIndicator> Registration<'a, T, I> {
    #[inline]
    fn arrive(shared: &'a SharedState<T, I>) -> Self {
        let epoch = shared.arrive();
        Self { shared, epoch }
    }
}

impl<T, I: ReadIndicator> Drop for Registration<'_, T, I> {
    #[inline]
    fn drop(&mut self) {
        self.shared.depart(self.epoch);
    }
}

/// Access to the published replica, obtained from [`ReadHandle::enter`].
///
/// Dereferences to `&T`. While it lives, the replica it points to is not
/// modified. The writer can still publish new writes to the other replica,
/// but its next drain waits for this guard.
///
/// 通过 [`ReadHandle::enter`] 获得的对已发布副本的访问。
/// 解引用为 `&T`。在其存活期间，它指向的副本不会被修改。
/// 写入者仍然可以向另一个副本发布新的写入，但其下一次排空会等待此守卫。
#[must_use]
pub struct ReadGuard<'a, T, I: ReadIndicator = ShardedIndicator> {
    replica: &'a UnsafeCell<T>,
    _registration: Registration<'a, T, I>,
}

impl<T, I: ReadIndicator> Deref for ReadGuard<'_, T, I> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: `_registration` keeps our epoch occupied for the guard's
        // whole lifetime, so the writer cannot mutate this replica.
        self.replica.with(|ptr| unsafe { &*ptr })
    }
}

impl<T: fmt::Debug, I: ReadIndicator> fmt::Debug for ReadGuard<'_, T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadGuard").field(&**self).finish()
    }
}
