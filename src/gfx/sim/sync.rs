//! 模拟 GPU 的 Fence 与完成事件
//!
//! `SimFence` 的完成值只由 GPU 线程写入，CPU 侧只读。
//! `SimEvent` 语义与 Win32 自动重置事件一致：`wait` 返回时消费掉这一次触发。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::core::error::{GraphicsError, Result};
use crate::renderer::sync::{CompletionEvent, Fence, FenceValue};

#[derive(Default)]
struct EventState {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// 自动重置事件
#[derive(Clone, Default)]
pub struct SimEvent {
    state: Arc<EventState>,
}

impl SimEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        let mut signaled = self.state.signaled.lock();
        *signaled = true;
        self.state.cond.notify_one();
    }

    /// 当前是否处于触发状态（不消费）
    pub fn is_set(&self) -> bool {
        *self.state.signaled.lock()
    }
}

impl CompletionEvent for SimEvent {
    fn wait(&self) -> Result<()> {
        let mut signaled = self.state.signaled.lock();
        while !*signaled {
            self.state.cond.wait(&mut signaled);
        }
        *signaled = false;
        Ok(())
    }
}

struct FenceState {
    completed: AtomicU64,
    waiters: Mutex<Vec<(u64, SimEvent)>>,
    device_lost: Arc<AtomicBool>,
}

/// 模拟 Fence
///
/// 克隆共享同一个计数器，GPU 线程持有一份用于 signal。
#[derive(Clone)]
pub struct SimFence {
    state: Arc<FenceState>,
}

impl SimFence {
    pub(crate) fn new(device_lost: Arc<AtomicBool>) -> Self {
        Self {
            state: Arc::new(FenceState {
                completed: AtomicU64::new(0),
                waiters: Mutex::new(Vec::new()),
                device_lost,
            }),
        }
    }

    /// GPU 侧写入完成值并触发已满足的事件
    ///
    /// 完成值只增不减。
    pub(crate) fn complete(&self, value: u64) {
        let completed = self.state.completed.fetch_max(value, Ordering::AcqRel).max(value);

        let mut waiters = self.state.waiters.lock();
        waiters.retain(|(target, event)| {
            if *target <= completed {
                event.set();
                false
            } else {
                true
            }
        });
    }

    /// 已注册但尚未触发的事件数量
    pub fn pending_registrations(&self) -> usize {
        self.state.waiters.lock().len()
    }
}

impl Fence for SimFence {
    type Event = SimEvent;

    fn completed_value(&self) -> FenceValue {
        FenceValue::new(self.state.completed.load(Ordering::Acquire))
    }

    fn set_event_on_completion(&self, value: FenceValue, event: &SimEvent) -> Result<()> {
        if self.state.device_lost.load(Ordering::Acquire) {
            return Err(GraphicsError::device_failure("SetEventOnCompletion", "device removed").into());
        }

        // 持锁检查，与 GPU 线程的 complete 互斥，避免漏掉触发
        let mut waiters = self.state.waiters.lock();
        if self.state.completed.load(Ordering::Acquire) >= value.value() {
            event.set();
        } else {
            waiters.push((value.value(), event.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn fence() -> SimFence {
        SimFence::new(Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_completed_value_is_monotonic() {
        let fence = fence();
        fence.complete(3);
        fence.complete(1);
        assert_eq!(fence.completed_value(), FenceValue::new(3));
    }

    #[test]
    fn test_registration_on_reached_value_fires_immediately() {
        let fence = fence();
        let event = SimEvent::new();
        fence.complete(2);

        fence.set_event_on_completion(FenceValue::new(2), &event).unwrap();
        assert!(event.is_set());
        assert_eq!(fence.pending_registrations(), 0);

        event.wait().unwrap();
        assert!(!event.is_set());
    }

    #[test]
    fn test_event_fires_when_value_reached() {
        let fence = fence();
        let event = SimEvent::new();

        fence.set_event_on_completion(FenceValue::new(2), &event).unwrap();
        assert_eq!(fence.pending_registrations(), 1);

        fence.complete(1);
        assert!(!event.is_set());

        let gpu = fence.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gpu.complete(2);
        });

        event.wait().unwrap();
        assert!(fence.completed_value() >= FenceValue::new(2));
        assert_eq!(fence.pending_registrations(), 0);
        handle.join().unwrap();
    }

    #[test]
    fn test_lost_device_rejects_registration() {
        let lost = Arc::new(AtomicBool::new(false));
        let fence = SimFence::new(lost.clone());
        lost.store(true, Ordering::Release);

        let err = fence
            .set_event_on_completion(FenceValue::new(1), &SimEvent::new())
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
