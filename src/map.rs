//! A `HashMap` replicated with the left-right primitive.
//!
//! `get` never blocks and never waits for `put`. Keys and values are cloned
//! into both replicas on every write.
//!
//! ```
//! let (mut writer, reader) = swmr_leftright::map::new::<u32, u32>();
//!
//! assert_eq!(reader.get(&1), None);
//! writer.put(1, 1);
//! assert_eq!(reader.get(&1), Some(1));
//! ```
//!
//! 使用左右原语复制的 `HashMap`。
//! `get` 从不阻塞，也从不等待 `put`。每次写入时键和值都会被克隆到两个副本中。

use crate::builder::LeftRightBuilder;
use crate::indicator::{ReadIndicator, ShardedIndicator};
use crate::reader::ReadHandle;
use crate::writer::WriteHandle;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Create an empty map with the default configuration.
/// 使用默认配置创建一个空映射。
pub fn new<K, V>() -> (MapWriter<K, V>, MapReader<K, V>)
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    with_builder(LeftRightBuilder::new())
}

/// Create an empty map from a configured builder.
pub fn with_builder<K, V, I>(builder: LeftRightBuilder<I>) -> (MapWriter<K, V, I>, MapReader<K, V, I>)
where
    K: Eq + Hash + Clone,
    V: Clone,
    I: ReadIndicator,
{
    let (writer, reader) = builder.build_with(HashMap::new);
    (MapWriter { inner: writer }, MapReader { inner: reader })
}

/// The unique writer of a replicated map.
/// 复制映射的唯一写入者。
#[derive(Debug)]
pub struct MapWriter<K, V, I: ReadIndicator = ShardedIndicator> {
    inner: WriteHandle<HashMap<K, V>, I>,
}

impl<K, V, I> MapWriter<K, V, I>
where
    K: Eq + Hash + Clone,
    V: Clone,
    I: ReadIndicator,
{
    /// Insert `value` under `key`, returning the previous value.
    ///
    /// The hidden replica gets a clone of the entry; the original is moved
    /// into the other replica.
    ///
    /// 在 `key` 下插入 `value`，返回之前的值。
    /// 隐藏副本得到条目的克隆；原始条目被移动到另一个副本中。
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let mut entry = Some((key, value));
        let mut reapply = false;
        self.inner.write(|map| {
            let pair = if reapply {
                entry.take()
            } else {
                reapply = true;
                entry.clone()
            };
            pair.and_then(|(k, v)| map.insert(k, v))
        })
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.write(|map| map.remove(key))
    }

    pub fn clear(&mut self) {
        self.inner.write(|map| map.clear());
    }

    /// Read the published map directly, without registering as a reader.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.get().get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.get().is_empty()
    }

    pub fn reader(&self) -> MapReader<K, V, I> {
        MapReader {
            inner: self.inner.reader(),
        }
    }

    /// The underlying write handle.
    pub fn handle(&self) -> &WriteHandle<HashMap<K, V>, I> {
        &self.inner
    }

    /// `true` if a `put`, `remove` or `clear` panicked halfway, for example in
    /// `K::clone` or `V::clone`. Writes panic until [`recover`](Self::recover).
    ///
    /// 如果 `put`、`remove` 或 `clear` 中途 panic（例如在 `K::clone` 或 `V::clone` 中），
    /// 则为 `true`。在 [`recover`](Self::recover) 之前写入都会 panic。
    pub fn is_poisoned(&self) -> bool {
        self.inner.is_poisoned()
    }

    /// Make the hidden map equal to the published one again and clear poisoning.
    /// 使隐藏映射重新等于已发布的映射，并清除中毒状态。
    pub fn recover(&mut self) {
        self.inner.recover();
    }
}

/// A cloneable, wait-free reader of a replicated map.
/// 复制映射的可克隆、无等待读取者。
#[derive(Debug)]
pub struct MapReader<K, V, I: ReadIndicator = ShardedIndicator> {
    inner: ReadHandle<HashMap<K, V>, I>,
}

impl<K, V, I: ReadIndicator> Clone for MapReader<K, V, I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, I> MapReader<K, V, I>
where
    K: Eq + Hash,
    I: ReadIndicator,
{
    /// Look up `key`, cloning the value out of the published replica.
    /// 查找 `key`，从已发布的副本中克隆出值。
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.inner.read(|map| map.get(key).cloned())
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.read(|map| map.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.inner.read(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read(|map| map.is_empty())
    }

    /// Run `visitor` over the whole published map.
    pub fn read<R>(&self, visitor: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        self.inner.read(visitor)
    }
}
