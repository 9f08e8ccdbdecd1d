//! GPU 同步机制模块
//!
//! 实现基于 Fence 的 CPU-GPU 帧同步协议，避免 CPU 复用仍被 GPU 读写的帧资源。
//!
//! # 协议
//!
//! - 一个 Fence、一个单调递增的计数器，每次 signal 使用 `counter + 1`
//! - 每个帧槽位记录最近一次提交的目标值
//! - 复用槽位前，若 GPU 完成值小于该槽位的目标值则阻塞等待
//! - 关闭或调整交换链大小前先 `drain_all`，确保 GPU 空闲
//!
//! # 同步策略
//!
//! - **Serial**：每帧 present 后立即等待本帧完成，不做流水
//! - **Pipelined**：只在即将复用未完成的槽位时等待，CPU 最多领先 N-1 帧
//!
//! 图形 API 相关的部分通过 `CommandQueue`、`Fence`、`CompletionEvent`、
//! `PresentationSurface` 四个 trait 注入，由 `gfx` 下的各个后端实现。

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::error::{Result, SyncError};
use crate::renderer::resource::FrameSlotPool;

/// Fence 值
///
/// 用于CPU-GPU同步的单调递增值。
/// CPU可以等待GPU完成特定Fence值对应的工作。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 初始值，Fence 创建时的完成值
    pub const ZERO: FenceValue = FenceValue(0);

    /// 创建新的Fence值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 完成事件
///
/// 对应 Win32 的自动重置事件：Fence 达到注册值时触发，`wait` 消费一次触发。
pub trait CompletionEvent {
    /// 阻塞当前线程直到事件触发，没有超时
    fn wait(&self) -> Result<()>;
}

/// GPU Fence
pub trait Fence {
    type Event: CompletionEvent;

    /// GPU 已完成的值，单调不减
    fn completed_value(&self) -> FenceValue;

    /// 注册事件，在完成值达到 `value` 时触发
    ///
    /// 如果完成值已经达到 `value`，事件立即触发。
    fn set_event_on_completion(&self, value: FenceValue, event: &Self::Event) -> Result<()>;
}

/// 命令提交队列
///
/// 按提交顺序（FIFO）执行命令列表和 signal。
pub trait CommandQueue {
    type Fence: Fence;
    type CommandList;

    /// 提交一批命令列表
    fn execute_command_lists(&self, lists: &[Self::CommandList]) -> Result<()>;

    /// 在已提交的工作之后追加 "将 fence 设为 value" 的操作
    fn signal(&self, fence: &Self::Fence, value: FenceValue) -> Result<()>;
}

/// 呈现表面（交换链）
pub trait PresentationSurface {
    /// 后缓冲数量
    fn buffer_count(&self) -> usize;

    /// 下一帧应使用的后缓冲索引，由交换链内部轮转
    fn current_slot_index(&self) -> usize;

    /// 呈现当前后缓冲
    fn present(&self, mode: PresentMode) -> Result<()>;
}

/// Present 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentMode {
    /// 0 = 不等待垂直同步，1 = 等待一次垂直同步
    pub sync_interval: u32,
    /// 关闭 vsync 且设备支持时允许撕裂
    pub allow_tearing: bool,
}

impl PresentMode {
    pub fn new(vsync: bool, tearing_supported: bool) -> Self {
        Self {
            sync_interval: if vsync { 1 } else { 0 },
            allow_tearing: !vsync && tearing_supported,
        }
    }

    pub fn immediate() -> Self {
        Self::new(false, false)
    }
}

/// CPU-GPU 同步策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// 每帧结束后等待 GPU 完成
    Serial,
    /// 仅在复用未完成的槽位时等待
    Pipelined,
}

/// `wait_for_slot` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// 完成值已达到目标，未触碰事件
    AlreadyComplete,
    /// 注册事件并阻塞等待过
    Waited,
}

/// 同步统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// 已提交的帧数
    pub frames_submitted: u64,
    /// signal 次数
    pub signals: u64,
    /// 阻塞等待次数
    pub blocking_waits: u64,
    /// 无需等待直接返回的次数
    pub fast_path_hits: u64,
    /// drain 次数
    pub drains: u64,
}

/// 请求队列在已排队工作之后 signal `counter + 1`，递增并返回新的计数器值
///
/// 不会阻塞。
pub fn signal_and_advance<Q: CommandQueue>(
    queue: &Q,
    fence: &Q::Fence,
    counter: &mut FenceValue,
) -> Result<FenceValue> {
    let value = counter.next();
    queue.signal(fence, value)?;
    *counter = value;
    Ok(value)
}

/// 等待 Fence 达到 `target`
///
/// 完成值已达到时直接返回，不注册事件；否则注册事件并无限期阻塞。
/// 注册或等待失败属于设备错误，直接向上传播。
pub fn wait_for_slot<F: Fence>(fence: &F, target: FenceValue, event: &F::Event) -> Result<WaitOutcome> {
    if fence.completed_value() >= target {
        return Ok(WaitOutcome::AlreadyComplete);
    }

    fence.set_event_on_completion(target, event)?;
    event.wait()?;

    debug_assert!(fence.completed_value() >= target);
    Ok(WaitOutcome::Waited)
}

/// 帧同步器
///
/// 持有 Fence、完成事件、计数器以及每个帧槽位的目标值，由渲染循环独占。
///
/// # 示例
///
/// ```ignore
/// let slot = sync.acquire_next_slot(&surface)?;
/// // 重置 slot 对应的命令分配器并录制命令
/// queue.execute_command_lists(&[list])?;
/// sync.end_frame(&queue, &surface, slot, PresentMode::new(true, false))?;
///
/// // 关闭前
/// sync.drain_all(&queue)?;
/// ```
pub struct FrameSynchronizer<F: Fence> {
    fence: F,
    event: F::Event,
    /// CPU 侧最近一次 signal 的值
    counter: FenceValue,
    slots: FrameSlotPool,
    strategy: SyncStrategy,
    stats: SyncStats,
}

impl<F: Fence> FrameSynchronizer<F> {
    /// 创建帧同步器
    ///
    /// # 参数
    ///
    /// * `fence` - 初始完成值为 0 的 Fence
    /// * `event` - 与 Fence 配合使用的完成事件
    /// * `buffer_count` - 帧槽位数量（2 或 3）
    /// * `strategy` - 同步策略
    pub fn new(fence: F, event: F::Event, buffer_count: usize, strategy: SyncStrategy) -> Result<Self> {
        let slots = FrameSlotPool::new(buffer_count)?;
        debug!(buffer_count, ?strategy, "Frame synchronizer created");

        Ok(Self {
            fence,
            event,
            counter: FenceValue::ZERO,
            slots,
            strategy,
            stats: SyncStats::default(),
        })
    }

    pub fn fence(&self) -> &F {
        &self.fence
    }

    /// CPU 侧最近一次 signal 的值
    pub fn counter(&self) -> FenceValue {
        self.counter
    }

    pub fn slots(&self) -> &FrameSlotPool {
        &self.slots
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// 切换同步策略，从下一帧开始生效
    pub fn set_strategy(&mut self, strategy: SyncStrategy) {
        self.strategy = strategy;
    }

    /// 请求 GPU 在已排队工作之后 signal 下一个值
    pub fn signal_and_advance<Q>(&mut self, queue: &Q) -> Result<FenceValue>
    where
        Q: CommandQueue<Fence = F>,
    {
        let value = signal_and_advance(queue, &self.fence, &mut self.counter)?;
        self.stats.signals += 1;
        trace!(fence_value = value.value(), "Fence signaled");
        Ok(value)
    }

    /// 阻塞直到 GPU 完成 `target`，并回收已完成的槽位
    pub fn wait_for_value(&mut self, target: FenceValue) -> Result<WaitOutcome> {
        let start = Instant::now();
        let outcome = wait_for_slot(&self.fence, target, &self.event)?;

        match outcome {
            WaitOutcome::AlreadyComplete => self.stats.fast_path_hits += 1,
            WaitOutcome::Waited => {
                self.stats.blocking_waits += 1;
                debug!(
                    fence_value = target.value(),
                    waited_us = start.elapsed().as_micros() as u64,
                    "GPU wait completed"
                );
            }
        }

        self.slots.retire_completed(self.fence.completed_value());
        Ok(outcome)
    }

    /// 获取下一帧使用的槽位
    ///
    /// 槽位索引由交换链决定。若该槽位上一次提交的工作尚未完成则阻塞等待，
    /// 返回时槽位处于 `Recording` 状态，其命令分配器可以安全重置。
    pub fn acquire_next_slot<S: PresentationSurface>(&mut self, surface: &S) -> Result<usize> {
        let index = surface.current_slot_index();
        if index >= self.slots.len() {
            return Err(SyncError::SlotOutOfRange { index, count: self.slots.len() }.into());
        }

        if let Some(target) = self.slots.pending_target(index)? {
            self.wait_for_value(target)?;
        }

        let completed = self.fence.completed_value();
        self.slots.retire_completed(completed);
        self.slots.begin_recording(index, completed)?;

        trace!(frame_index = index, completed = completed.value(), "Frame slot acquired");
        Ok(index)
    }

    /// signal 并将值记录为槽位的目标值
    pub fn submit_slot<Q>(&mut self, queue: &Q, slot: usize) -> Result<FenceValue>
    where
        Q: CommandQueue<Fence = F>,
    {
        // 先校验状态，避免为非法提交消耗一个 fence 值
        self.slots.ensure_recording(slot)?;

        let value = self.signal_and_advance(queue)?;
        self.slots.mark_submitted(slot, value)?;
        self.stats.frames_submitted += 1;
        Ok(value)
    }

    /// 结束一帧：present、signal、记录目标值
    ///
    /// Serial 策略下还会立即等待本帧完成。
    pub fn end_frame<Q, S>(&mut self, queue: &Q, surface: &S, slot: usize, mode: PresentMode) -> Result<FenceValue>
    where
        Q: CommandQueue<Fence = F>,
        S: PresentationSurface,
    {
        surface.present(mode)?;
        trace!(frame_index = slot, sync_interval = mode.sync_interval, "Presented");

        let value = self.submit_slot(queue, slot)?;

        if self.strategy == SyncStrategy::Serial {
            self.wait_for_value(value)?;
        }

        Ok(value)
    }

    /// 等待 GPU 完成所有已提交的工作
    ///
    /// 返回时完成值等于计数器。释放任何 GPU 资源之前必须调用。
    pub fn drain_all<Q>(&mut self, queue: &Q) -> Result<FenceValue>
    where
        Q: CommandQueue<Fence = F>,
    {
        let value = self.signal_and_advance(queue)?;
        self.wait_for_value(value)?;
        self.stats.drains += 1;

        debug!(fence_value = value.value(), "GPU drained");
        Ok(value)
    }

    /// 按新的缓冲数量重建槽位表（交换链 resize 后调用）
    ///
    /// 只能在 drain 之后调用；计数器保持不变。
    pub fn reset_slots(&mut self, buffer_count: usize) -> Result<()> {
        if let Some((index, target)) = self.slots.first_in_flight() {
            return Err(SyncError::ResetWhileInFlight { index, target }.into());
        }

        self.slots = FrameSlotPool::new(buffer_count)?;
        debug!(buffer_count, "Frame slots reset");
        Ok(())
    }
}
