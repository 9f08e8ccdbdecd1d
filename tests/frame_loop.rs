//! 模拟 GPU 上的帧循环集成测试

use std::thread;
use std::time::Duration;

use frame_sync::core::error::{FrameSyncError, SyncError};
use frame_sync::gfx::sim::{SimCommandList, SimContext, SimFence};
use frame_sync::gfx::GraphicsBackend;
use frame_sync::renderer::sync::{CommandQueue, Fence, FenceValue, PresentMode, SyncStrategy};
use frame_sync::renderer::{FrameSynchronizer, SlotState};

fn render_frame(
    ctx: &SimContext,
    sync: &mut FrameSynchronizer<SimFence>,
    gpu_time: Duration,
) -> (usize, FenceValue) {
    let slot = sync.acquire_next_slot(&ctx.surface).unwrap();
    ctx.queue
        .execute_command_lists(&[SimCommandList::new(slot, gpu_time)])
        .unwrap();
    let value = sync
        .end_frame(&ctx.queue, &ctx.surface, slot, PresentMode::immediate())
        .unwrap();
    (slot, value)
}

#[test]
fn pipelined_blocks_only_when_reusing_an_unfinished_slot() {
    let ctx = SimContext::new(3, Duration::ZERO).unwrap();
    let mut sync = ctx.create_synchronizer(SyncStrategy::Pipelined).unwrap();

    ctx.queue.pause();
    for expected in 1..=3u64 {
        let (slot, value) = render_frame(&ctx, &mut sync, Duration::ZERO);
        assert_eq!(slot as u64, expected - 1);
        assert_eq!(value, FenceValue::new(expected));
    }
    assert_eq!(sync.fence().completed_value(), FenceValue::ZERO);
    assert_eq!(sync.stats().blocking_waits, 0);

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            ctx.queue.resume();
        });

        // 槽位 0 的目标值为 1，必须等 GPU 恢复
        let slot = sync.acquire_next_slot(&ctx.surface).unwrap();
        assert_eq!(slot, 0);
    });

    assert!(sync.fence().completed_value() >= FenceValue::new(1));
    assert_eq!(sync.stats().blocking_waits, 1);
    assert_eq!(sync.slots().get(0).unwrap().state(), SlotState::Recording);

    ctx.queue
        .execute_command_lists(&[SimCommandList::new(0, Duration::ZERO)])
        .unwrap();
    let value = sync
        .end_frame(&ctx.queue, &ctx.surface, 0, PresentMode::immediate())
        .unwrap();
    assert_eq!(value, FenceValue::new(4));
    assert_eq!(sync.slots().get(0).unwrap().target(), FenceValue::new(4));

    let drained = sync.drain_all(&ctx.queue).unwrap();
    assert_eq!(drained, FenceValue::new(5));
    assert_eq!(sync.fence().completed_value(), sync.counter());
    assert!(sync.slots().all_idle());
}

#[test]
fn serial_completes_each_frame_before_returning() {
    let ctx = SimContext::new(2, Duration::ZERO).unwrap();
    let mut sync = ctx.create_synchronizer(SyncStrategy::Serial).unwrap();

    for frame in 0..5u64 {
        let (slot, value) = render_frame(&ctx, &mut sync, Duration::from_millis(2));
        assert_eq!(slot as u64, frame % 2);
        assert_eq!(sync.fence().completed_value(), value);
        assert!(sync.slots().all_idle());
    }
    assert_eq!(ctx.queue.executed_lists(), 5);
    assert_eq!(ctx.surface.presents(), 5);
}

#[test]
fn completed_never_exceeds_counter_and_targets_increase() {
    let ctx = SimContext::new(3, Duration::ZERO).unwrap();
    let mut sync = ctx.create_synchronizer(SyncStrategy::Pipelined).unwrap();

    let mut last_target = [FenceValue::ZERO; 3];
    for _ in 0..30 {
        let (slot, value) = render_frame(&ctx, &mut sync, Duration::from_millis(1));
        assert!(value > last_target[slot]);
        last_target[slot] = value;
        assert!(sync.fence().completed_value() <= sync.counter());

        // 同时在途的槽位不超过缓冲数量
        let in_flight = sync.slots().iter().filter(|slot| slot.is_in_flight()).count();
        assert!(in_flight <= 3);
    }

    sync.drain_all(&ctx.queue).unwrap();
    assert_eq!(sync.stats().frames_submitted, 30);
}

#[test]
fn resize_requires_drain_and_keeps_counter() {
    let ctx = SimContext::new(3, Duration::ZERO).unwrap();
    let mut sync = ctx.create_synchronizer(SyncStrategy::Pipelined).unwrap();

    ctx.queue.pause();
    render_frame(&ctx, &mut sync, Duration::ZERO);
    render_frame(&ctx, &mut sync, Duration::ZERO);

    let err = sync.reset_slots(2).unwrap_err();
    assert!(matches!(
        err,
        FrameSyncError::Sync(SyncError::ResetWhileInFlight { index: 0, .. })
    ));

    ctx.queue.resume();
    let drained = sync.drain_all(&ctx.queue).unwrap();
    sync.reset_slots(2).unwrap();

    assert_eq!(sync.counter(), drained);
    assert_eq!(sync.slots().len(), 2);
    assert!(sync.slots().all_idle());
}

#[test]
fn device_loss_surfaces_as_fatal_error() {
    let ctx = SimContext::new(2, Duration::ZERO).unwrap();
    let mut sync = ctx.create_synchronizer(SyncStrategy::Pipelined).unwrap();

    render_frame(&ctx, &mut sync, Duration::ZERO);
    ctx.lose_device();

    let err = sync.drain_all(&ctx.queue).unwrap_err();
    assert!(err.is_fatal());
}
