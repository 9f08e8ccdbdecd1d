//! 模拟 GPU 后端
//!
//! 用一个工作线程充当 GPU 时间线，按 FIFO 顺序执行提交的命令列表和 signal。
//! 不依赖任何图形 API，可在所有平台和测试中运行。
//!
//! # 组件
//!
//! - `SimQueue`：命令队列，向 GPU 线程发送命令
//! - `SimSurface`：交换链，按轮转顺序给出后缓冲索引
//! - `SimContext`：持有上述对象，实现 `GraphicsBackend`

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::core::config::Config;
use crate::core::error::{FrameSyncError, GraphicsError, Result};
use crate::gfx::backend::GraphicsBackend;
use crate::gfx::sim::sync::{SimEvent, SimFence};
use crate::renderer::sync::{CommandQueue, FenceValue, PresentMode, PresentationSurface};

/// 模拟命令列表
///
/// 只记录所属槽位和 GPU 执行耗时。
#[derive(Debug, Clone)]
pub struct SimCommandList {
    pub slot: usize,
    pub gpu_time: Duration,
}

impl SimCommandList {
    pub fn new(slot: usize, gpu_time: Duration) -> Self {
        Self { slot, gpu_time }
    }
}

enum GpuCommand {
    Execute(SimCommandList),
    Signal(SimFence, u64),
}

/// GPU 闸门，关闭时 GPU 线程停在下一条命令之前
#[derive(Default)]
struct GpuGate {
    paused: Mutex<bool>,
    cond: Condvar,
}

impl GpuGate {
    fn wait_open(&self) {
        let mut paused = self.paused.lock();
        while *paused {
            self.cond.wait(&mut paused);
        }
    }

    fn set_paused(&self, value: bool) {
        *self.paused.lock() = value;
        self.cond.notify_all();
    }
}

/// 模拟命令队列
pub struct SimQueue {
    sender: Option<Sender<GpuCommand>>,
    worker: Option<JoinHandle<()>>,
    gate: Arc<GpuGate>,
    executed: Arc<AtomicU64>,
    device_lost: Arc<AtomicBool>,
}

impl SimQueue {
    fn new(device_lost: Arc<AtomicBool>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let gate = Arc::new(GpuGate::default());
        let executed = Arc::new(AtomicU64::new(0));

        let worker = {
            let gate = gate.clone();
            let executed = executed.clone();
            thread::Builder::new()
                .name("sim-gpu".to_string())
                .spawn(move || gpu_main(receiver, gate, executed))
                .map_err(|e| GraphicsError::DeviceCreation(format!("Failed to spawn GPU thread: {}", e)))?
        };

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            gate,
            executed,
            device_lost,
        })
    }

    fn send(&self, call: &str, command: GpuCommand) -> Result<()> {
        if self.device_lost.load(Ordering::Acquire) {
            return Err(GraphicsError::device_failure(call, "device removed").into());
        }

        self.sender
            .as_ref()
            .ok_or_else(|| GraphicsError::device_failure(call, "queue closed"))?
            .send(command)
            .map_err(|_| FrameSyncError::from(GraphicsError::device_failure(call, "GPU thread exited")))
    }

    /// GPU 已执行完的命令列表数量
    pub fn executed_lists(&self) -> u64 {
        self.executed.load(Ordering::Acquire)
    }

    /// 暂停 GPU：已提交的工作保持排队，直到 `resume`
    pub fn pause(&self) {
        self.gate.set_paused(true);
    }

    pub fn resume(&self) {
        self.gate.set_paused(false);
    }
}

fn gpu_main(receiver: Receiver<GpuCommand>, gate: Arc<GpuGate>, executed: Arc<AtomicU64>) {
    for command in receiver {
        gate.wait_open();
        match command {
            GpuCommand::Execute(list) => {
                if !list.gpu_time.is_zero() {
                    thread::sleep(list.gpu_time);
                }
                executed.fetch_add(1, Ordering::AcqRel);
                trace!(frame_index = list.slot, "GPU executed command list");
            }
            GpuCommand::Signal(fence, value) => {
                fence.complete(value);
                trace!(fence_value = value, "GPU reached fence value");
            }
        }
    }
    debug!("Simulated GPU thread exiting");
}

impl CommandQueue for SimQueue {
    type Fence = SimFence;
    type CommandList = SimCommandList;

    fn execute_command_lists(&self, lists: &[SimCommandList]) -> Result<()> {
        for list in lists {
            self.send("ExecuteCommandLists", GpuCommand::Execute(list.clone()))?;
        }
        Ok(())
    }

    fn signal(&self, fence: &SimFence, value: FenceValue) -> Result<()> {
        self.send("Signal", GpuCommand::Signal(fence.clone(), value.value()))
    }
}

impl Drop for SimQueue {
    fn drop(&mut self) {
        // 关闭通道后 GPU 线程执行完剩余命令再退出
        self.gate.set_paused(false);
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Simulated GPU thread panicked");
            }
        }
    }
}

/// 模拟交换链
pub struct SimSurface {
    buffer_count: usize,
    current: AtomicUsize,
    presents: AtomicU64,
    refresh_period: Duration,
}

impl SimSurface {
    pub fn new(buffer_count: usize, refresh_period: Duration) -> Self {
        Self {
            buffer_count,
            current: AtomicUsize::new(0),
            presents: AtomicU64::new(0),
            refresh_period,
        }
    }

    pub fn presents(&self) -> u64 {
        self.presents.load(Ordering::Acquire)
    }
}

impl PresentationSurface for SimSurface {
    fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    fn current_slot_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    fn present(&self, mode: PresentMode) -> Result<()> {
        // 按垂直同步间隔节流
        if mode.sync_interval > 0 {
            thread::sleep(self.refresh_period * mode.sync_interval);
        }

        let next = (self.current.load(Ordering::Acquire) + 1) % self.buffer_count;
        self.current.store(next, Ordering::Release);
        self.presents.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// 模拟 GPU 上下文
pub struct SimContext {
    pub queue: SimQueue,
    pub surface: SimSurface,
    device_lost: Arc<AtomicBool>,
}

impl SimContext {
    /// 创建模拟上下文
    ///
    /// # 参数
    ///
    /// * `buffer_count` - 后缓冲数量
    /// * `refresh_period` - 一次垂直同步的时长
    pub fn new(buffer_count: usize, refresh_period: Duration) -> Result<Self> {
        let device_lost = Arc::new(AtomicBool::new(false));
        let queue = SimQueue::new(device_lost.clone())?;
        let surface = SimSurface::new(buffer_count, refresh_period);

        debug!(buffer_count, "Simulated GPU context created");
        Ok(Self { queue, surface, device_lost })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.graphics.buffer_count as usize,
            config.simulation.refresh_period(),
        )
    }

    /// 模拟设备丢失，之后所有 GPU 调用都返回 `DeviceFailure`
    pub fn lose_device(&self) {
        warn!("Simulated device removed");
        self.device_lost.store(true, Ordering::Release);
    }
}

impl GraphicsBackend for SimContext {
    type Fence = SimFence;
    type Queue = SimQueue;
    type Surface = SimSurface;

    fn backend_name(&self) -> &str {
        "Simulated GPU"
    }

    fn queue(&self) -> &SimQueue {
        &self.queue
    }

    fn surface(&self) -> &SimSurface {
        &self.surface
    }

    fn create_fence(&self) -> Result<(SimFence, SimEvent)> {
        Ok((SimFence::new(self.device_lost.clone()), SimEvent::new()))
    }
}
