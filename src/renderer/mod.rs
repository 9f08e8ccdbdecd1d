//! 渲染器模块
//!
//! - `sync`：Fence 值、同步原语 trait 与 `FrameSynchronizer`
//! - `resource`：帧槽位及其状态机
//!
//! `run` 根据配置选择后端并驱动帧循环，返回关闭时的同步统计。

use std::time::Instant;

use crate::core::config::GraphicsBackend as GfxBackend;
use crate::core::error::Result;
use crate::core::Config;
use crate::gfx::sim::Renderer as SimRenderer;
use crate::{engine_error, engine_info, engine_warn};

pub mod resource;
pub mod sync;

pub use resource::{FrameSlot, FrameSlotPool, SlotState};
pub use sync::{FenceValue, FrameSynchronizer, PresentMode, SyncStats, SyncStrategy};

/// 运行帧循环直到结束，最后等待 GPU 空闲
pub fn run(config: &Config) -> Result<SyncStats> {
    match config.graphics.backend {
        GfxBackend::Simulated => run_simulated(config),
        #[cfg(target_os = "windows")]
        GfxBackend::Dx12 => {
            engine_info!("Initializing DX12 Backend");
            crate::gfx::dx12::run(config)
        }
        #[cfg(not(target_os = "windows"))]
        GfxBackend::Dx12 => Err(crate::core::error::FrameSyncError::Initialization(
            "DX12 backend is only available on Windows".to_string(),
        )),
    }
}

fn run_simulated(config: &Config) -> Result<SyncStats> {
    if config.graphics.use_warp {
        engine_warn!("WARP adapter has no effect on the simulated backend");
    }

    let mut renderer = SimRenderer::new(config)?;
    engine_info!(frames = config.simulation.frames, "Entering frame loop");

    let start = Instant::now();
    for _ in 0..config.simulation.frames {
        if let Err(e) = renderer.draw() {
            engine_error!(frame = renderer.frames_rendered(), "Frame failed: {}", e);
            return Err(e);
        }
    }

    let stats = renderer.shutdown()?;
    let elapsed = start.elapsed();
    let fps = if elapsed.as_secs_f64() > 0.0 {
        stats.frames_submitted as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    engine_info!(
        frames = stats.frames_submitted,
        elapsed_ms = elapsed.as_millis() as u64,
        fps = format!("{:.1}", fps),
        "Frame loop finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(strategy: SyncStrategy) -> Config {
        let mut config = Config::default();
        config.graphics.strategy = strategy;
        config.graphics.vsync = false;
        config.simulation.frames = 8;
        config.simulation.cpu_frame_ms = 0;
        config.simulation.gpu_frame_ms = 1;
        config
    }

    #[test]
    fn test_run_simulated_pipelined() {
        let stats = run(&fast_config(SyncStrategy::Pipelined)).unwrap();
        assert_eq!(stats.frames_submitted, 8);
        assert_eq!(stats.drains, 1);
        // 每帧一次 signal，加上关闭时的一次
        assert_eq!(stats.signals, 9);
    }

    #[test]
    fn test_run_simulated_serial_never_takes_reuse_wait() {
        let stats = run(&fast_config(SyncStrategy::Serial)).unwrap();
        assert_eq!(stats.frames_submitted, 8);
        // 串行模式下复用槽位时 GPU 早已完成
        assert_eq!(stats.fast_path_hits + stats.blocking_waits, 8 + 1);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_dx12_unavailable_off_windows() {
        let mut config = fast_config(SyncStrategy::Pipelined);
        config.graphics.backend = GfxBackend::Dx12;
        let err = run(&config).unwrap_err();
        assert!(err.to_string().contains("only available on Windows"));
    }
}
