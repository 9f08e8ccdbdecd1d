//! 图形后端模块
//!
//! 本模块封装了不同的 GPU 实现：
//! - 模拟 GPU：工作线程按 FIFO 顺序执行命令，用于无窗口运行与测试
//! - DirectX 12：Windows 平台的真实后端
//!
//! 所有后端都实现了统一的 `GraphicsBackend` trait，
//! 帧同步器对两者的行为完全一致。

pub mod backend;
pub mod sim;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::GraphicsBackend;
pub use sim::SimContext;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Context;
