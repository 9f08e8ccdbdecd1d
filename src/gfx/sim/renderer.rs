use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::core::error::Result;
use crate::core::Config;
use crate::gfx::backend::GraphicsBackend;
use crate::gfx::sim::context::{SimCommandList, SimContext};
use crate::gfx::sim::sync::SimFence;
use crate::renderer::sync::{
    CommandQueue, FenceValue, FrameSynchronizer, PresentMode, SyncStats, SyncStrategy,
};

/// 一帧的提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub slot: usize,
    pub fence_value: FenceValue,
}

/// 无窗口的模拟渲染器
///
/// 每帧：获取槽位、按配置的 CPU 耗时 "录制"、提交一个带 GPU 耗时的命令列表、present 并 signal。
pub struct Renderer {
    sync: FrameSynchronizer<SimFence>,
    gfx: SimContext,
    present_mode: PresentMode,
    cpu_frame_time: Duration,
    gpu_frame_time: Duration,
    frame_number: u64,
    drained: bool,
}

impl Renderer {
    pub fn new(config: &Config) -> Result<Self> {
        let gfx = SimContext::from_config(config)?;
        let sync = gfx.create_synchronizer(config.graphics.strategy)?;

        info!(
            backend = gfx.backend_name(),
            buffers = config.graphics.buffer_count,
            strategy = ?config.graphics.strategy,
            vsync = config.graphics.vsync,
            "Simulated renderer initialized"
        );

        Ok(Self {
            sync,
            gfx,
            present_mode: PresentMode::new(config.graphics.vsync, false),
            cpu_frame_time: config.simulation.cpu_frame_time(),
            gpu_frame_time: config.simulation.gpu_frame_time(),
            frame_number: 0,
            drained: false,
        })
    }

    pub fn draw(&mut self) -> Result<FrameReport> {
        let slot = self.sync.acquire_next_slot(&self.gfx.surface)?;
        self.drained = false;

        // 录制：槽位资源此时归 CPU 所有
        if !self.cpu_frame_time.is_zero() {
            thread::sleep(self.cpu_frame_time);
        }

        self.gfx
            .queue
            .execute_command_lists(&[SimCommandList::new(slot, self.gpu_frame_time)])?;

        let fence_value = self
            .sync
            .end_frame(&self.gfx.queue, &self.gfx.surface, slot, self.present_mode)?;

        let report = FrameReport {
            frame_number: self.frame_number,
            slot,
            fence_value,
        };
        trace!(frame = report.frame_number, frame_index = slot, fence_value = fence_value.value(), "Frame completed");

        self.frame_number += 1;
        Ok(report)
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.present_mode = PresentMode::new(vsync, false);
        debug!(vsync, "VSync changed");
    }

    pub fn set_strategy(&mut self, strategy: SyncStrategy) {
        self.sync.set_strategy(strategy);
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer<SimFence> {
        &self.sync
    }

    pub fn context(&self) -> &SimContext {
        &self.gfx
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_number
    }

    /// 等待 GPU 完成全部工作
    pub fn shutdown(&mut self) -> Result<SyncStats> {
        self.sync.drain_all(&self.gfx.queue)?;
        self.drained = true;

        let stats = self.sync.stats();
        info!(
            frames = stats.frames_submitted,
            blocking_waits = stats.blocking_waits,
            fast_path_hits = stats.fast_path_hits,
            fence_value = self.sync.counter().value(),
            "Simulated renderer shut down"
        );
        Ok(stats)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if !self.drained {
            if let Err(e) = self.sync.drain_all(&self.gfx.queue) {
                error!("Failed to drain GPU on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::sync::Fence;

    fn config(strategy: SyncStrategy, buffers: u32) -> Config {
        let mut config = Config::default();
        config.graphics.strategy = strategy;
        config.graphics.buffer_count = buffers;
        config.graphics.vsync = false;
        config.simulation.cpu_frame_ms = 0;
        config.simulation.gpu_frame_ms = 2;
        config
    }

    #[test]
    fn test_draw_reports_increasing_fence_values() {
        let mut renderer = Renderer::new(&config(SyncStrategy::Pipelined, 3)).unwrap();

        let mut last = FenceValue::ZERO;
        for frame in 0..6 {
            let report = renderer.draw().unwrap();
            assert_eq!(report.frame_number, frame);
            assert_eq!(report.slot, frame as usize % 3);
            assert!(report.fence_value > last);
            last = report.fence_value;
        }

        let stats = renderer.shutdown().unwrap();
        assert_eq!(stats.frames_submitted, 6);
        assert_eq!(stats.drains, 1);
        assert_eq!(
            renderer.synchronizer().fence().completed_value(),
            renderer.synchronizer().counter()
        );
        assert_eq!(renderer.context().queue.executed_lists(), 6);
    }

    #[test]
    fn test_serial_completes_every_frame() {
        let mut renderer = Renderer::new(&config(SyncStrategy::Serial, 2)).unwrap();

        for _ in 0..4 {
            let report = renderer.draw().unwrap();
            assert_eq!(renderer.synchronizer().fence().completed_value(), report.fence_value);
            assert!(renderer.synchronizer().slots().all_idle());
        }
    }

    #[test]
    fn test_lost_device_aborts_frame() {
        let mut renderer = Renderer::new(&config(SyncStrategy::Pipelined, 2)).unwrap();
        renderer.draw().unwrap();
        renderer.context().lose_device();

        let err = renderer.draw().unwrap_err();
        assert!(err.is_fatal());
        // drop 中的 drain 同样失败，只记录日志
    }
}
