//! FrameSync - 基于 Fence 的 CPU/GPU 帧同步
//!
//! CPU 录制帧 N+1 时 GPU 仍在执行帧 N，
//! 每个后缓冲槽位记录一个 Fence 目标值，只有 GPU 越过该值后 CPU 才会复用槽位资源。
//!
//! # 模块结构
//!
//! - `core`: 日志、配置、错误处理
//! - `renderer`: 帧同步器、帧槽位池和帧循环入口
//! - `gfx`: 图形后端（模拟 GPU、DirectX 12）
//!
//! # 使用示例
//!
//! ```no_run
//! use frame_sync::core::Config;
//! use frame_sync::gfx::{GraphicsBackend, SimContext};
//! use frame_sync::renderer::sync::{CommandQueue, PresentMode, SyncStrategy};
//! use frame_sync::gfx::sim::SimCommandList;
//! use std::time::Duration;
//!
//! let gfx = SimContext::from_config(&Config::default()).unwrap();
//! let mut sync = gfx.create_synchronizer(SyncStrategy::Pipelined).unwrap();
//!
//! let slot = sync.acquire_next_slot(&gfx.surface).unwrap();
//! gfx.queue.execute_command_lists(&[SimCommandList::new(slot, Duration::from_millis(1))]).unwrap();
//! sync.end_frame(&gfx.queue, &gfx.surface, slot, PresentMode::immediate()).unwrap();
//! sync.drain_all(&gfx.queue).unwrap();
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
