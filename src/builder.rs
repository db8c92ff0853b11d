use crate::indicator::{ReadIndicator, ShardedIndicator};
use crate::reader::ReadHandle;
use crate::state::{MAX_DEFAULT_SHARDS, SharedState};
use crate::sync::Arc;
use crate::writer::WriteHandle;
use std::marker::PhantomData;

/// Largest accepted `spin_limit` for [`WaitStrategy::Backoff`].
pub const MAX_SPIN_LIMIT: u32 = 16;

/// How the writer waits while readers drain out of an epoch.
///
/// Every strategy keeps waiting until the readers are gone; none of them
/// gives up or times out.
///
/// 写入者在读者从某个纪元中排空时的等待方式。
/// 每种策略都会一直等待直到读者离开；没有一种会放弃或超时。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Yield the processor on every iteration.
    /// 每次迭代都让出处理器。
    #[default]
    Yield,
    /// Issue a CPU spin hint on every iteration. Lowest latency when readers
    /// run on other cores, wasteful when they share the writer's core.
    /// 每次迭代发出 CPU 自旋提示。当读者运行在其他核心时延迟最低，
    /// 当它们与写入者共享核心时则浪费资源。
    Spin,
    /// Spin `2^step` hints for steps `0..=spin_limit`, then yield on every
    /// iteration. `spin_limit` is clamped to [`MAX_SPIN_LIMIT`].
    /// 在步骤 `0..=spin_limit` 中自旋 `2^step` 次，之后每次迭代都让出处理器。
    Backoff { spin_limit: u32 },
}

/// Builder for configuring a left-right primitive.
///
/// - `read_indicator`: choose the read indicator strategy
/// - `shards`: shard count for [`ShardedIndicator`]
/// - `wait_strategy`: how the writer waits in its drain
///
/// # Example
/// ```
/// use swmr_leftright::{AtomicIndicator, LeftRightBuilder, WaitStrategy};
///
/// let (mut writer, reader) = LeftRightBuilder::new()
///     .read_indicator::<AtomicIndicator>()
///     .wait_strategy(WaitStrategy::Backoff { spin_limit: 6 })
///     .build(Vec::<u32>::new());
///
/// writer.write(|v| v.push(7));
/// assert_eq!(reader.read(|v| v.clone()), vec![7]);
/// ```
///
/// 用于配置左右原语的构建器。
pub struct LeftRightBuilder<I = ShardedIndicator> {
    shards: Option<usize>,
    wait: WaitStrategy,
    _indicator: PhantomData<fn() -> I>,
}

impl LeftRightBuilder<ShardedIndicator> {
    /// Create a builder with default settings: sharded indicator, shard count
    /// from the available parallelism, yielding drain.
    /// 使用默认设置创建构建器：分片指示器、按可用并行度确定的分片数、让出式排空。
    #[inline]
    pub fn new() -> Self {
        Self {
            shards: None,
            wait: WaitStrategy::default(),
            _indicator: PhantomData,
        }
    }
}

impl Default for LeftRightBuilder<ShardedIndicator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ReadIndicator> LeftRightBuilder<I> {
    /// Use `J` as the read indicator.
    /// 使用 `J` 作为读指示器。
    #[inline]
    pub fn read_indicator<J: ReadIndicator>(self) -> LeftRightBuilder<J> {
        LeftRightBuilder {
            shards: self.shards,
            wait: self.wait,
            _indicator: PhantomData,
        }
    }

    /// Set the shard count of each accumulator in the sharded indicator.
    ///
    /// Rounded up to a power of two, minimum 1. Ignored by indicators that
    /// are not sharded.
    ///
    /// 设置分片指示器中每个累加器的分片数。
    /// 向上取整为 2 的幂，最小为 1。非分片指示器会忽略此设置。
    #[inline]
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards.max(1).next_power_of_two());
        self
    }

    /// Set how the writer waits for readers to drain.
    #[inline]
    pub fn wait_strategy(mut self, wait: WaitStrategy) -> Self {
        self.wait = match wait {
            WaitStrategy::Backoff { spin_limit } => WaitStrategy::Backoff {
                spin_limit: spin_limit.min(MAX_SPIN_LIMIT),
            },
            other => other,
        };
        self
    }

    /// Build the primitive with both replicas cloned from `initial`.
    /// 构建原语，两个副本都从 `initial` 克隆而来。
    pub fn build<T: Clone>(self, initial: T) -> (WriteHandle<T, I>, ReadHandle<T, I>) {
        let left = initial.clone();
        self.assemble(left, initial)
    }

    /// Build the primitive with each replica produced by `make`.
    ///
    /// `make` is called twice and must return equal values both times.
    ///
    /// 构建原语，每个副本由 `make` 生成。
    /// `make` 会被调用两次，且两次必须返回相等的值。
    pub fn build_with<T>(
        self,
        mut make: impl FnMut() -> T,
    ) -> (WriteHandle<T, I>, ReadHandle<T, I>) {
        let left = make();
        let right = make();
        self.assemble(left, right)
    }

    fn assemble<T>(self, left: T, right: T) -> (WriteHandle<T, I>, ReadHandle<T, I>) {
        let shards = self.shards.unwrap_or_else(default_shards);
        let shared = Arc::new(SharedState::new(left, right, shards));

        tracing::debug!(
            target: "swmr_leftright",
            shards,
            wait = ?self.wait,
            "left-right primitive created"
        );

        let writer = WriteHandle::new(Arc::clone(&shared), self.wait);
        let reader = ReadHandle::new(shared);
        (writer, reader)
    }
}

fn default_shards() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .next_power_of_two()
        .min(MAX_DEFAULT_SHARDS)
}
