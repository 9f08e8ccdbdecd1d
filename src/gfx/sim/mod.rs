//! 模拟 GPU 实现模块
//!
//! - Context: 工作线程 GPU、命令队列、交换链
//! - Sync: Fence 与完成事件
//! - Renderer: 无窗口的帧循环

pub mod context;
pub mod renderer;
pub mod sync;

// 重新导出常用类型
pub use context::{SimCommandList, SimContext, SimQueue, SimSurface};
pub use renderer::{FrameReport, Renderer};
pub use sync::{SimEvent, SimFence};
