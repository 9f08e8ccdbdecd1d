//! 帧槽位管理模块
//!
//! 每个后缓冲对应一个帧槽位，槽位持有自己的命令分配器以及一个 Fence 目标值。
//! 槽位的生命周期：
//!
//! ```text
//! Idle ──begin_recording──▶ Recording ──mark_submitted(T)──▶ Submitted(T)
//!  ▲                                                              │
//!  └────────────────── retire_completed(completed >= T) ──────────┘
//! ```
//!
//! `Submitted(T)` 状态下，只有 GPU 的完成值达到 T 后才允许再次进入 `Recording`。

use std::fmt;

use crate::core::config::{MAX_BUFFER_COUNT, MIN_BUFFER_COUNT};
use crate::core::error::{Result, SyncError};
use crate::renderer::sync::FenceValue;

/// 帧槽位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// 空闲，CPU 可以复用该槽位的资源
    Idle,
    /// CPU 正在录制命令
    Recording,
    /// 已提交，GPU 完成值达到目标前资源归 GPU 所有
    Submitted(FenceValue),
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Idle => write!(f, "idle"),
            SlotState::Recording => write!(f, "recording"),
            SlotState::Submitted(target) => write!(f, "submitted (target {})", target),
        }
    }
}

/// 单个帧槽位
#[derive(Debug, Clone)]
pub struct FrameSlot {
    /// 槽位索引（与交换链后缓冲索引一致）
    index: usize,
    /// 当前状态
    state: SlotState,
    /// 最近一次提交记录的 Fence 目标值
    target: FenceValue,
}

impl FrameSlot {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: SlotState::Idle,
            target: FenceValue::ZERO,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// 最近一次提交的目标值，从未提交过时为 0
    pub fn target(&self) -> FenceValue {
        self.target
    }

    /// GPU 是否仍然持有该槽位
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, SlotState::Submitted(_))
    }

    fn invalid(&self, action: &'static str) -> SyncError {
        SyncError::InvalidTransition {
            index: self.index,
            action,
            state: self.state.to_string(),
        }
    }
}

/// 帧槽位池
///
/// 槽位的轮转顺序由交换链决定，这里只按索引管理状态。
#[derive(Debug)]
pub struct FrameSlotPool {
    slots: Vec<FrameSlot>,
}

impl FrameSlotPool {
    /// 创建帧槽位池
    ///
    /// # 参数
    ///
    /// * `count` - 槽位数量（2 或 3）
    pub fn new(count: usize) -> Result<Self> {
        if !(MIN_BUFFER_COUNT as usize..=MAX_BUFFER_COUNT as usize).contains(&count) {
            return Err(SyncError::InvalidBufferCount(count).into());
        }

        Ok(Self {
            slots: (0..count).map(FrameSlot::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 根据索引获取槽位
    pub fn get(&self, index: usize) -> Result<&FrameSlot> {
        self.slots.get(index).ok_or_else(|| {
            SyncError::SlotOutOfRange { index, count: self.slots.len() }.into()
        })
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut FrameSlot> {
        let count = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or_else(|| SyncError::SlotOutOfRange { index, count }.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }

    /// 槽位复用前必须等待的目标值
    ///
    /// 槽位处于 `Submitted(T)` 时返回 `Some(T)`，否则返回 `None`。
    pub fn pending_target(&self, index: usize) -> Result<Option<FenceValue>> {
        match self.get(index)?.state {
            SlotState::Submitted(target) => Ok(Some(target)),
            _ => Ok(None),
        }
    }

    /// 根据 GPU 完成值回收槽位
    ///
    /// 返回本次转为 `Idle` 的槽位数量。
    pub fn retire_completed(&mut self, completed: FenceValue) -> usize {
        let mut retired = 0;
        for slot in &mut self.slots {
            if let SlotState::Submitted(target) = slot.state {
                if target <= completed {
                    slot.state = SlotState::Idle;
                    retired += 1;
                }
            }
        }
        retired
    }

    /// 开始录制
    ///
    /// 槽位必须为 `Idle`，或者为 `Submitted(T)` 且 `completed >= T`。
    pub fn begin_recording(&mut self, index: usize, completed: FenceValue) -> Result<()> {
        let slot = self.get_mut(index)?;
        match slot.state {
            SlotState::Idle => {}
            SlotState::Submitted(target) if target <= completed => {}
            _ => return Err(slot.invalid("begin recording").into()),
        }
        slot.state = SlotState::Recording;
        Ok(())
    }

    /// 确认槽位处于 `Recording` 状态
    pub fn ensure_recording(&self, index: usize) -> Result<()> {
        let slot = self.get(index)?;
        if slot.state != SlotState::Recording {
            return Err(slot.invalid("be submitted").into());
        }
        Ok(())
    }

    /// 标记提交
    ///
    /// 新目标值必须严格大于该槽位上一次的目标值。
    pub fn mark_submitted(&mut self, index: usize, target: FenceValue) -> Result<()> {
        let slot = self.get_mut(index)?;
        if slot.state != SlotState::Recording {
            return Err(slot.invalid("be submitted").into());
        }
        if target <= slot.target {
            return Err(slot.invalid("reuse an older fence target").into());
        }
        slot.state = SlotState::Submitted(target);
        slot.target = target;
        Ok(())
    }

    /// 第一个仍被 GPU 持有的槽位
    pub fn first_in_flight(&self) -> Option<(usize, FenceValue)> {
        self.slots.iter().find_map(|slot| match slot.state {
            SlotState::Submitted(target) => Some((slot.index, target)),
            _ => None,
        })
    }

    /// 是否所有槽位都空闲
    pub fn all_idle(&self) -> bool {
        self.slots.iter().all(|slot| slot.state == SlotState::Idle)
    }
}
