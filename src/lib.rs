//! Single-writer multi-reader left-right primitive.
//!
//! Two replicas of a value are kept. Readers always resolve to the published
//! one and read it without locks, waiting or retries. The single writer
//! mutates the hidden replica, publishes it, waits for readers still inside the
//! previously published replica to leave, and then applies the same mutation
//! to that replica as well.
//!
//! Readers register in one of two epochs through a [`ReadIndicator`]. Two
//! strategies are provided: [`AtomicIndicator`] (one shared counter) and
//! [`ShardedIndicator`] (striped ingress/egress counters, the default).
//!
//! ```
//! let (mut writer, reader) = swmr_leftright::new(0u64);
//!
//! let r = reader.clone();
//! let t = std::thread::spawn(move || {
//!     let v = r.read(|v| *v);
//!     assert!(v == 0 || v == 1);
//! });
//!
//! writer.write(|v| *v += 1);
//! assert_eq!(reader.read(|v| *v), 1);
//! t.join().unwrap();
//! ```
//!
//! 单写入者多读取者的左右原语。
//! 维护一个值的两个副本。读者总是解析到已发布的副本，并在无锁、无等待、无重试的情况下读取。
//! 唯一的写入者修改隐藏副本、发布它、等待仍在先前发布副本中的读者离开，
//! 然后将同样的修改也应用于那个副本。

mod builder;
mod error;
mod indicator;
pub mod map;
mod reader;
mod state;
mod sync;
mod writer;

pub use builder::{LeftRightBuilder, MAX_SPIN_LIMIT, WaitStrategy};
pub use error::StateError;
pub use indicator::{AtomicIndicator, ReadIndicator, ShardedIndicator};
pub use reader::{ReadGuard, ReadHandle};
pub use state::{Epoch, Side};
pub use writer::{SharedWriteHandle, WriteHandle};

/// Create a primitive with both replicas cloned from `initial`, using the
/// default configuration.
///
/// 使用默认配置创建原语，两个副本都从 `initial` 克隆而来。
#[inline]
pub fn new<T: Clone>(initial: T) -> (WriteHandle<T>, ReadHandle<T>) {
    LeftRightBuilder::new().build(initial)
}

/// Create a builder for configuring the primitive.
#[inline]
pub fn builder() -> LeftRightBuilder {
    LeftRightBuilder::new()
}

#[cfg(all(test, not(feature = "loom")))]
mod tests;
