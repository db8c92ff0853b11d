/// 边界情况测试模块
/// 测试 panic 路径、中毒与恢复、非法状态以及配置边界
use crate::{Epoch, LeftRightBuilder, MAX_SPIN_LIMIT, ReadIndicator, Side, StateError, WaitStrategy};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

fn panic_message(err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        String::new()
    }
}

/// 测试1: 读取闭包 panic 时 panic 传播给调用者，且读者依然离开
#[test]
fn test_panicking_visitor_still_departs() {
    let (mut writer, reader) = crate::new(5u32);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        reader.read(|v| {
            if *v == 5 {
                panic!("visitor failed");
            }
        })
    }));
    assert_eq!(panic_message(result.unwrap_err()), "visitor failed");

    assert!(writer.shared.indicator(Epoch::ZERO).is_empty());
    // Would spin forever if the panicking reader had not departed.
    // 如果 panic 的读者没有离开，这里会永远自旋。
    writer.write(|v| *v = 6);
    writer.write(|v| *v = 7);
    assert_eq!(reader.read(|v| *v), 7);
}

/// 测试2: 在另一个线程中 panic 的读取守卫同样会离开
#[test]
fn test_guard_released_when_thread_panics() {
    let (mut writer, reader) = crate::new(0u8);

    let r = reader.clone();
    let handle = thread::spawn(move || {
        let _guard = r.enter();
        panic!("reader thread died");
    });
    assert!(handle.join().is_err());

    writer.write(|v| *v = 1);
    writer.write(|v| *v = 2);
    assert_eq!(reader.read(|v| *v), 2);
}

/// 测试3: 第一次应用修改时 panic，句柄中毒，读者仍看到旧值
#[test]
fn test_mutator_panic_before_publish_poisons() {
    let (mut writer, reader) = crate::new(vec![1, 2]);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        writer.write(|v| {
            v.push(3);
            if v.len() == 3 {
                panic!("mutator failed");
            }
        })
    }));
    assert!(result.is_err());

    assert!(writer.is_poisoned());
    assert_eq!(writer.published_side(), Side::Left);
    assert_eq!(reader.read(|v| v.clone()), vec![1, 2]);
    let (published, hidden) = writer.replicas();
    assert_eq!(published, &vec![1, 2]);
    assert_eq!(hidden, &vec![1, 2, 3]);

    writer.recover();
    assert!(!writer.is_poisoned());
    let (published, hidden) = writer.replicas();
    assert_eq!(published, hidden);

    writer.write(|v| v.push(4));
    assert_eq!(reader.read(|v| v.clone()), vec![1, 2, 4]);
}

/// 测试4: 第二次应用修改时 panic，新值已经发布，恢复后两个副本一致
#[test]
fn test_mutator_panic_after_publish_poisons() {
    let (mut writer, reader) = crate::new(0u32);
    let mut calls = 0;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        writer.write(|v| {
            calls += 1;
            if calls == 2 {
                panic!("second application failed");
            }
            *v = 10;
        })
    }));
    assert!(result.is_err());
    assert!(writer.is_poisoned());
    assert_eq!(writer.published_side(), Side::Right);
    assert_eq!(writer.epoch(), Epoch::ONE);
    assert_eq!(reader.read(|v| *v), 10);

    writer.recover();
    assert_eq!(writer.replicas(), (&10, &10));
    writer.write(|v| *v += 1);
    assert_eq!(reader.read(|v| *v), 11);
}

/// 测试5: 中毒的句柄拒绝写入
#[test]
fn test_write_on_poisoned_handle_panics() {
    let (mut writer, _reader) = crate::new(0u32);
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        writer.write(|v| {
            if *v == 0 {
                panic!("boom");
            }
        });
    }));
    assert!(writer.is_poisoned());

    let result = panic::catch_unwind(AssertUnwindSafe(|| writer.write(|v| *v = 1)));
    let msg = panic_message(result.unwrap_err());
    assert!(msg.contains("poisoned"), "{msg}");
}

/// 测试6: 未中毒时 recover 不做任何事
#[test]
fn test_recover_without_poison_is_noop() {
    let (mut writer, _reader) = crate::new(String::from("a"));
    writer.write(|s| s.push('b'));
    let side = writer.published_side();

    writer.recover();
    assert_eq!(writer.published_side(), side);
    assert_eq!(writer.replicas(), (&"ab".to_string(), &"ab".to_string()));
}

/// 测试7: 非法的侧标志是致命错误，读者在 panic 路径上依然离开
#[test]
fn test_corrupted_side_flag_aborts_loudly() {
    let (writer, reader) = crate::new(0u8);
    writer.shared.store_raw_side(7);

    let result = panic::catch_unwind(AssertUnwindSafe(|| reader.read(|v| *v)));
    let msg = panic_message(result.unwrap_err());
    assert!(msg.starts_with("BUG: invalid side flag 7"), "{msg}");

    assert!(writer.shared.indicator(Epoch::ZERO).is_empty());
    writer.shared.store_raw_side(Side::Left as u8);
}

/// 测试8: 非法的纪元索引同样是致命错误，且不会留下读者注册
#[test]
fn test_corrupted_epoch_aborts_loudly() {
    let (writer, reader) = crate::new(0u8);
    writer.shared.store_raw_epoch(9);

    let result = panic::catch_unwind(AssertUnwindSafe(|| reader.read(|v| *v)));
    let msg = panic_message(result.unwrap_err());
    assert!(msg.starts_with("BUG: invalid epoch index 9"), "{msg}");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = reader.enter();
    }));
    assert!(result.is_err());

    writer.shared.store_raw_epoch(0);
    assert!(writer.shared.indicator(Epoch::ZERO).is_empty());
    assert!(writer.shared.indicator(Epoch::ONE).is_empty());
    assert_eq!(reader.read(|v| *v), 0);
}

/// 测试9: 原始值解码
#[test]
fn test_raw_decoding() {
    assert_eq!(Side::from_raw(0), Ok(Side::Left));
    assert_eq!(Side::from_raw(1), Ok(Side::Right));
    assert_eq!(Side::from_raw(2), Err(StateError::InvalidSide(2)));
    assert_eq!(Epoch::from_raw(1), Ok(Epoch::ONE));
    assert_eq!(Epoch::from_raw(255), Err(StateError::InvalidEpoch(255)));

    assert_eq!(Side::Left.other(), Side::Right);
    assert_eq!(Side::Right.other().other(), Side::Right);
    assert_eq!(Epoch::ZERO.next(), Epoch::ONE);
    assert_eq!(Epoch::ONE.next(), Epoch::ZERO);

    assert_eq!(
        StateError::InvalidEpoch(3).to_string(),
        "invalid epoch index 3: only epochs 0 and 1 exist"
    );
}

/// 测试10: 分片数向上取整为 2 的幂，自旋上限被截断
#[test]
fn test_builder_clamps_configuration() {
    let (writer, _reader) = LeftRightBuilder::new().shards(0).build(());
    assert_eq!(writer.shared.indicator(Epoch::ZERO).shards(), 1);

    let (writer, _reader) = LeftRightBuilder::new().shards(5).build(());
    assert_eq!(writer.shared.indicator(Epoch::ONE).shards(), 8);

    let (writer, _reader) = LeftRightBuilder::new()
        .wait_strategy(WaitStrategy::Backoff { spin_limit: 1_000 })
        .build(());
    assert_eq!(
        writer.wait,
        WaitStrategy::Backoff {
            spin_limit: MAX_SPIN_LIMIT
        }
    );

    let (writer, _reader) = crate::builder().build(());
    let shards = writer.shared.indicator(Epoch::ZERO).shards();
    assert!(shards.is_power_of_two() && shards <= 64);
}

/// 测试11: 读取句柄可以比写入句柄活得更久
#[test]
fn test_reader_outlives_writer() {
    let (mut writer, reader) = crate::new(1i64);
    writer.write(|v| *v = -1);
    drop(writer);

    let r = reader.clone();
    let handle = thread::spawn(move || r.read(|v| *v));
    assert_eq!(handle.join().unwrap(), -1);
    assert_eq!(reader.read(|v| *v), -1);
}

/// 测试12: 同一线程中的嵌套读取守卫
#[test]
fn test_nested_guards_same_thread() {
    let (mut writer, reader) = crate::new(3u16);

    {
        let outer = reader.enter();
        let inner = reader.enter();
        let via_read = reader.read(|v| *v);
        assert_eq!((*outer, *inner, via_read), (3, 3, 3));
    }

    writer.write(|v| *v = 4);
    assert_eq!(*reader.enter(), 4);
}

/// 测试13: 零大小类型
#[test]
fn test_zero_sized_replica() {
    #[derive(Clone, Debug, PartialEq)]
    struct Marker;

    let (mut writer, reader) = crate::new(Marker);
    let out = writer.write(|_| 1u8);
    assert_eq!(out, 1);
    assert_eq!(reader.read(|m| m.clone()), Marker);
}
