use crate::error::StateError;
use crate::indicator::ReadIndicator;
use crate::sync::{AtomicU8, Ordering, UnsafeCell};

/// Upper bound for the default shard count of the sharded indicator.
/// 分片指示器默认分片数的上限。
pub(crate) const MAX_DEFAULT_SHARDS: usize = 64;

/// Drain iterations after which a wait is worth reporting.
/// 超过此排空迭代次数的等待值得记录。
pub(crate) const SLOW_DRAIN_SPINS: usize = 1024;

/// Which replica new readers resolve to.
/// 新读者解析到的副本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    /// Decode a raw side flag.
    /// 解码原始的侧标志。
    #[inline]
    pub fn from_raw(raw: u8) -> Result<Self, StateError> {
        match raw {
            0 => Ok(Side::Left),
            1 => Ok(Side::Right),
            other => Err(StateError::InvalidSide(other)),
        }
    }

    /// The opposite replica.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Index of the read indicator that arriving readers register under.
/// 到达的读者所注册的读指示器的索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Epoch(u8);

impl Epoch {
    pub const ZERO: Epoch = Epoch(0);
    pub const ONE: Epoch = Epoch(1);

    #[inline]
    pub fn from_raw(raw: u8) -> Result<Self, StateError> {
        match raw {
            0 | 1 => Ok(Epoch(raw)),
            other => Err(StateError::InvalidEpoch(other)),
        }
    }

    /// `1 - self`.
    #[inline]
    pub fn next(self) -> Self {
        Epoch(1 - self.0)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cold]
#[inline(never)]
fn corrupted(err: StateError) -> ! {
    panic!("BUG: {err}. The left-right state is corrupted and no replica can be trusted.")
}

/// State shared by the write handle and every read handle of one primitive.
///
/// Holds the two replicas, the two per-epoch read indicators and the two
/// selectors. Nothing here is global: each primitive owns its own instance.
///
/// 一个原语的写入句柄与所有读取句柄共享的状态。
/// 持有两个副本、两个按纪元划分的读指示器以及两个选择器。
/// 这里没有任何全局状态：每个原语拥有自己的实例。
pub(crate) struct SharedState<T, I> {
    /// Read indicators, indexed by `Epoch`.
    /// 读指示器，按 `Epoch` 索引。
    indicators: [I; 2],
    /// Raw `Epoch`. Stored only by the writer.
    /// 原始 `Epoch`。只有写入者会存储。
    epoch: AtomicU8,
    /// Raw `Side`. Stored only by the writer.
    /// 原始 `Side`。只有写入者会存储。
    side: AtomicU8,
    left: UnsafeCell<T>,
    right: UnsafeCell<T>,
}

// SAFETY: readers on any thread obtain `&T` (needs `T: Sync`), and the writer
// mutates the replicas from whichever thread owns the write handle (needs
// `T: Send`). Exclusive access to the hidden replica is guaranteed by the
// epoch drain, not by the type system.
unsafe impl<T: Send + Sync, I: ReadIndicator> Send for SharedState<T, I> {}
unsafe impl<T: Send + Sync, I: ReadIndicator> Sync for SharedState<T, I> {}

impl<T, I: ReadIndicator> SharedState<T, I> {
    pub(crate) fn new(left: T, right: T, shards: usize) -> Self {
        Self {
            indicators: [I::with_shards(shards), I::with_shards(shards)],
            epoch: AtomicU8::new(Epoch::ZERO.0),
            side: AtomicU8::new(Side::Left as u8),
            left: UnsafeCell::new(left),
            right: UnsafeCell::new(right),
        }
    }

    #[inline]
    pub(crate) fn load_epoch(&self) -> Epoch {
        match Epoch::from_raw(self.epoch.load(Ordering::SeqCst)) {
            Ok(epoch) => epoch,
            Err(err) => corrupted(err),
        }
    }

    #[inline]
    pub(crate) fn load_side(&self) -> Side {
        match Side::from_raw(self.side.load(Ordering::SeqCst)) {
            Ok(side) => side,
            Err(err) => corrupted(err),
        }
    }

    #[inline]
    pub(crate) fn indicator(&self, epoch: Epoch) -> &I {
        &self.indicators[epoch.index()]
    }

    #[inline]
    pub(crate) fn replica(&self, side: Side) -> &UnsafeCell<T> {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Register a reader under the current epoch and return that epoch.
    /// 在当前纪元下注册一个读者，并返回该纪元。
    #[inline]
    pub(crate) fn arrive(&self) -> Epoch {
        let epoch = self.load_epoch();
        self.indicator(epoch).arrive();
        epoch
    }

    #[inline]
    pub(crate) fn depart(&self, epoch: Epoch) {
        self.indicator(epoch).depart();
    }

    /// The single publish point of a write.
    ///
    /// A read-modify-write, so the later indicator reads (also RMWs) cannot be
    /// ordered before it even where `SeqCst` degrades to acquire/release.
    ///
    /// 一次写入的唯一发布点。
    #[inline]
    pub(crate) fn publish(&self, side: Side) {
        self.side.swap(side as u8, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn advance_epoch(&self, next: Epoch) {
        self.epoch.store(next.0, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn store_raw_side(&self, raw: u8) {
        self.side.store(raw, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn store_raw_epoch(&self, raw: u8) {
        self.epoch.store(raw, Ordering::SeqCst);
    }
}
