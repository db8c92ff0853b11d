use thiserror::Error;

/// A raw selector value that does not decode to a legal state.
///
/// Only the writer ever stores these selectors, so seeing one of these means
/// the primitive's own bookkeeping is broken. The primitive never continues
/// past such a value; it panics with the error as the message.
///
/// 一个无法解码为合法状态的原始选择器值。
/// 只有写入者会存储这些选择器，因此出现此错误意味着原语自身的簿记已损坏。
/// 原语遇到这种值时不会继续，而是以该错误作为消息 panic。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid side flag {0}: readers can only resolve to LEFT (0) or RIGHT (1)")]
    InvalidSide(u8),
    #[error("invalid epoch index {0}: only epochs 0 and 1 exist")]
    InvalidEpoch(u8),
}
