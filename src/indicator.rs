use crate::sync::{AtomicUsize, Ordering};
use hint::shard_hint;

/// Tracks whether any reader is still inside one epoch.
///
/// The primitive owns two indicators, one per epoch slot. Readers call
/// `arrive` before resolving a replica and `depart` once they are done with it;
/// the writer calls `is_empty` while draining.
///
/// 跟踪是否仍有读者处于某个纪元之内。
/// 原语拥有两个指示器，每个纪元槽一个。读者在解析副本之前调用 `arrive`，
/// 用完之后调用 `depart`；写入者在排空时调用 `is_empty`。
///
/// # Safety
///
/// `is_empty` must never return `true` while an `arrive` lacks its matching
/// `depart`. The writer mutates a replica as soon as the drained indicator
/// reports empty, so over-reporting is a data race on the replica.
/// Under-reporting (returning `false` for an empty indicator) only costs the
/// writer another wait iteration and is allowed.
///
/// `arrive` and `depart` must be callable concurrently from any number of
/// threads without blocking. `is_empty` is only ever called by one thread at a
/// time.
///
/// `is_empty` 绝不能在某个 `arrive` 尚无匹配 `depart` 时返回 `true`。
/// 写入者在被排空的指示器报告为空后会立即修改副本，因此多报是副本上的数据竞争。
/// 少报（对空指示器返回 `false`）只会让写入者多等待一轮，这是允许的。
pub unsafe trait ReadIndicator: Send + Sync + 'static {
    /// Create an empty indicator. `shards` is a power of two and may be ignored.
    /// 创建一个空指示器。`shards` 是 2 的幂，可以被忽略。
    fn with_shards(shards: usize) -> Self
    where
        Self: Sized;

    /// Record one reader entering.
    fn arrive(&self);

    /// Record one reader leaving. Called exactly once per `arrive`.
    fn depart(&self);

    /// `true` only if every `arrive` so far has a matching `depart`.
    fn is_empty(&self) -> bool;
}

/// Single shared counter: `+1` on arrive, `-1` on depart.
///
/// Minimal and exact, but every reader contends on the same cache line.
///
/// 单一共享计数器：arrive 时 `+1`，depart 时 `-1`。
/// 简单且精确，但所有读者都争用同一个缓存行。
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicIndicator {
    readers: AtomicUsize,
}

unsafe impl ReadIndicator for AtomicIndicator {
    #[inline]
    fn with_shards(_shards: usize) -> Self {
        Self {
            readers: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn arrive(&self) {
        self.readers.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    fn depart(&self) {
        let prev = self.readers.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "BUG: depart without a matching arrive");
    }

    #[inline]
    fn is_empty(&self) -> bool {
        // RMW rather than load: it reads the latest value in modification order.
        self.readers.fetch_add(0, Ordering::SeqCst) == 0
    }
}

/// Ingress/egress indicator over two striped accumulators.
///
/// `arrive` bumps the ingress counter and `depart` bumps the egress counter,
/// each on the calling thread's shard, so concurrent readers mostly touch
/// distinct cache lines. Both counters only ever grow (modulo wrap-around);
/// the indicator is empty when their sums are equal.
///
/// 基于两个分条累加器的入口/出口指示器。
/// `arrive` 增加入口计数器，`depart` 增加出口计数器，各自落在调用线程的分片上，
/// 因此并发读者大多访问不同的缓存行。两个计数器只增不减（按回绕取模）；
/// 当二者之和相等时指示器为空。
#[derive(Debug)]
pub struct ShardedIndicator {
    ingress: StripedCounter,
    egress: StripedCounter,
}

unsafe impl ReadIndicator for ShardedIndicator {
    fn with_shards(shards: usize) -> Self {
        Self {
            ingress: StripedCounter::new(shards),
            egress: StripedCounter::new(shards),
        }
    }

    #[inline]
    fn arrive(&self) {
        self.ingress.increment();
    }

    #[inline]
    fn depart(&self) {
        self.egress.increment();
    }

    #[inline]
    fn is_empty(&self) -> bool {
        // Egress must be summed before ingress. Every depart in the egress sum
        // was preceded by its arrive, and ingress only grows, so that arrive
        // is in the later ingress sum. Equality therefore cannot hide an active
        // reader. Summing in the other order can count a depart whose arrive
        // was missed and report empty too early.
        let egress = self.egress.sum();
        let ingress = self.ingress.sum();
        egress == ingress
    }
}

impl ShardedIndicator {
    /// Number of shards in each accumulator.
    pub fn shards(&self) -> usize {
        self.ingress.stripes.len()
    }
}

#[derive(Debug)]
#[repr(align(64))]
struct PaddedCounter {
    value: AtomicUsize,
}

/// A monotonically increasing counter split across cache-aligned stripes.
/// 分布在缓存对齐分条上的单调递增计数器。
#[derive(Debug)]
struct StripedCounter {
    stripes: Box<[PaddedCounter]>,
    mask: usize,
}

impl StripedCounter {
    fn new(shards: usize) -> Self {
        let shards = shards.max(1).next_power_of_two();
        let stripes = (0..shards)
            .map(|_| PaddedCounter {
                value: AtomicUsize::new(0),
            })
            .collect();

        Self {
            stripes,
            mask: shards - 1,
        }
    }

    #[inline]
    fn increment(&self) {
        let stripe = &self.stripes[shard_hint() & self.mask];
        stripe.value.fetch_add(1, Ordering::SeqCst);
    }

    /// Not a snapshot: each stripe is read at a different instant.
    ///
    /// Each stripe is read with an RMW so the sum sees every increment that
    /// precedes it, as `AtomicIndicator::is_empty` does.
    #[inline]
    fn sum(&self) -> usize {
        self.stripes.iter().fold(0usize, |acc, s| {
            acc.wrapping_add(s.value.fetch_add(0, Ordering::SeqCst))
        })
    }
}

// The stripe a thread lands on only affects contention, never correctness.
#[cfg(not(feature = "loom"))]
mod hint {
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_SHARD_HINT: AtomicUsize = AtomicUsize::new(0);

    std::thread_local! {
        static SHARD_HINT: Cell<Option<usize>> = const { Cell::new(None) };
    }

    /// Per-thread stripe index, assigned round-robin on first use.
    /// 每线程的分条索引，首次使用时轮询分配。
    #[inline]
    pub(super) fn shard_hint() -> usize {
        SHARD_HINT
            .try_with(|hint| match hint.get() {
                Some(idx) => idx,
                None => {
                    let idx = NEXT_SHARD_HINT.fetch_add(1, Ordering::Relaxed);
                    hint.set(Some(idx));
                    idx
                }
            })
            // Thread-local already torn down: any stripe is valid.
            .unwrap_or(0)
    }
}

// loom replays every execution, so the assignment has to restart with it.
#[cfg(feature = "loom")]
mod hint {
    use loom::sync::atomic::{AtomicUsize, Ordering};
    use std::cell::Cell;

    loom::lazy_static! {
        static ref NEXT_SHARD_HINT: AtomicUsize = AtomicUsize::new(0);
    }

    loom::thread_local! {
        static SHARD_HINT: Cell<Option<usize>> = Cell::new(None);
    }

    pub(super) fn shard_hint() -> usize {
        SHARD_HINT.with(|hint| match hint.get() {
            Some(idx) => idx,
            None => {
                let idx = NEXT_SHARD_HINT.fetch_add(1, Ordering::Relaxed);
                hint.set(Some(idx));
                idx
            }
        })
    }
}
