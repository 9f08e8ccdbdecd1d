//! DirectX 12 实现模块（仅 Windows）
//!
//! - Context: 设备、命令队列、交换链
//! - Sync: Fence、事件与队列
//! - Renderer: 清屏渲染器
//! - Window: winit 事件循环

pub mod context;
pub mod renderer;
pub mod sync;
pub mod window;

// 重新导出常用类型
pub use context::{Dx12Context, Dx12SwapChain};
pub use renderer::Renderer;
pub use sync::{Dx12Event, Dx12Fence, Dx12Queue};
pub use window::run;
