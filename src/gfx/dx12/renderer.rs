//! DirectX 12 渲染器
//!
//! 每帧只清屏，重点在于帧资源与 Fence 的配合：
//! 每个后缓冲对应一个命令分配器，只有在对应槽位的 Fence 目标值完成后才会重置。

use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::{debug, error, info, trace};
use windows::Win32::Graphics::Direct3D12::*;
use winit::window::Window;

use crate::core::error::Result;
use crate::core::Config;
use crate::gfx::backend::GraphicsBackend;
use crate::gfx::dx12::context::Dx12Context;
use crate::gfx::dx12::sync::{check, Dx12Fence};
use crate::renderer::sync::{CommandQueue, FrameSynchronizer, PresentMode, SyncStats, SyncStrategy};

const CLEAR_COLOR: [f32; 4] = [0.1, 0.2, 0.4, 1.0];

pub struct Renderer {
    sync: FrameSynchronizer<Dx12Fence>,
    command_allocators: Vec<ID3D12CommandAllocator>,
    command_list: ID3D12GraphicsCommandList,
    gfx: Dx12Context,
    vsync: bool,
    frame_number: u64,
    drained: bool,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let gfx = Dx12Context::new(window, config)?;
        let sync = gfx.create_synchronizer(config.graphics.strategy)?;

        let mut command_allocators = Vec::with_capacity(config.graphics.buffer_count as usize);
        for _ in 0..config.graphics.buffer_count {
            let allocator: ID3D12CommandAllocator = check("CreateCommandAllocator", unsafe {
                gfx.device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
            })?;
            command_allocators.push(allocator);
        }

        let command_list: ID3D12GraphicsCommandList = check("CreateCommandList", unsafe {
            gfx.device.CreateCommandList(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                &command_allocators[0],
                None::<&ID3D12PipelineState>,
            )
        })?;
        // 命令列表创建后处于录制状态，先关闭
        check("Close", unsafe { command_list.Close() })?;

        info!(
            backend = gfx.backend_name(),
            buffers = config.graphics.buffer_count,
            strategy = ?config.graphics.strategy,
            "DX12 renderer initialized"
        );

        Ok(Self {
            sync,
            command_allocators,
            command_list,
            gfx,
            vsync: config.graphics.vsync,
            frame_number: 0,
            drained: false,
        })
    }

    fn present_mode(&self) -> PresentMode {
        PresentMode::new(self.vsync, self.gfx.swap_chain.tearing_supported())
    }

    pub fn draw(&mut self) -> Result<()> {
        let slot = self.sync.acquire_next_slot(&self.gfx.swap_chain)?;
        self.drained = false;

        // 槽位已空闲，分配器可以安全重置
        let allocator = &self.command_allocators[slot];
        check("ID3D12CommandAllocator::Reset", unsafe { allocator.Reset() })?;
        check("ID3D12GraphicsCommandList::Reset", unsafe {
            self.command_list.Reset(allocator, None::<&ID3D12PipelineState>)
        })?;

        let back_buffer = &self.gfx.back_buffers[slot];
        unsafe {
            transition(
                &self.command_list,
                back_buffer,
                D3D12_RESOURCE_STATE_PRESENT,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
            );
            self.command_list
                .ClearRenderTargetView(self.gfx.rtv_handle(slot), &CLEAR_COLOR, None);
            transition(
                &self.command_list,
                back_buffer,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                D3D12_RESOURCE_STATE_PRESENT,
            );
        }
        check("ID3D12GraphicsCommandList::Close", unsafe { self.command_list.Close() })?;

        self.gfx
            .queue
            .execute_command_lists(std::slice::from_ref(&self.command_list))?;

        let fence_value = self.sync.end_frame(
            &self.gfx.queue,
            &self.gfx.swap_chain,
            slot,
            self.present_mode(),
        )?;

        trace!(frame = self.frame_number, frame_index = slot, fence_value = fence_value.value(), "Frame completed");
        self.frame_number += 1;
        Ok(())
    }

    /// 窗口尺寸变化
    ///
    /// 先等待 GPU 完成全部工作，再重建交换链缓冲。Fence 计数器不会重置。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        // 最小化时尺寸为 0，跳过
        if width == 0 || height == 0 {
            return Ok(());
        }
        if width == self.gfx.width && height == self.gfx.height {
            return Ok(());
        }

        self.sync.drain_all(&self.gfx.queue)?;
        self.gfx.resize(width, height)?;
        self.sync.reset_slots(self.command_allocators.len())?;

        debug!(width, height, fence_value = self.sync.counter().value(), "Renderer resized");
        Ok(())
    }

    pub fn toggle_vsync(&mut self) {
        self.vsync = !self.vsync;
        info!(vsync = self.vsync, tearing = self.gfx.swap_chain.tearing_supported(), "VSync toggled");
    }

    pub fn set_strategy(&mut self, strategy: SyncStrategy) {
        self.sync.set_strategy(strategy);
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.gfx.window
    }

    pub fn shutdown(&mut self) -> Result<SyncStats> {
        self.sync.drain_all(&self.gfx.queue)?;
        self.drained = true;

        let stats = self.sync.stats();
        info!(
            frames = stats.frames_submitted,
            blocking_waits = stats.blocking_waits,
            fast_path_hits = stats.fast_path_hits,
            "DX12 renderer shut down"
        );
        Ok(stats)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // 后缓冲和分配器释放前 GPU 必须空闲
        if !self.drained {
            if let Err(e) = self.sync.drain_all(&self.gfx.queue) {
                error!("Failed to drain GPU on drop: {}", e);
            }
        }
    }
}

/// 记录一个资源状态转换屏障
unsafe fn transition(
    command_list: &ID3D12GraphicsCommandList,
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) {
    let barrier = D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: ManuallyDrop::new(Some(resource.clone())),
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    };
    command_list.ResourceBarrier(std::slice::from_ref(&barrier));

    // 释放屏障持有的资源引用
    let transition = ManuallyDrop::into_inner(barrier.Anonymous.Transition);
    drop(ManuallyDrop::into_inner(transition.pResource));
}
