//! DirectX 12 图形后端实现
//!
//! # 初始化流程
//!
//! 1. 启用调试层（Debug 模式）
//! 2. 创建 DXGI 工厂，检测撕裂支持
//! 3. 创建 D3D12 设备（可选 WARP 适配器）
//! 4. 创建命令队列
//! 5. 创建交换链，禁用 Alt+Enter
//! 6. 创建 RTV 描述符堆和每个后缓冲的渲染目标视图

use std::sync::Arc;
use tracing::{debug, info, warn};
use windows::{
    core::Interface, Win32::Foundation::HWND, Win32::Graphics::Direct3D::*,
    Win32::Graphics::Direct3D12::*, Win32::Graphics::Dxgi::Common::*, Win32::Graphics::Dxgi::*,
};
use winit::raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::Window;

use crate::core::error::{FrameSyncError, GraphicsError, Result};
use crate::core::Config;
use crate::gfx::backend::GraphicsBackend;
use crate::gfx::dx12::sync::{check, Dx12Event, Dx12Fence, Dx12Queue};
use crate::renderer::sync::{PresentMode, PresentationSurface};

const BACK_BUFFER_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R8G8B8A8_UNORM;

/// DXGI 交换链
pub struct Dx12SwapChain {
    pub swap_chain: IDXGISwapChain3,
    buffer_count: u32,
    tearing_supported: bool,
}

impl Dx12SwapChain {
    fn flags(&self) -> u32 {
        if self.tearing_supported {
            DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32
        } else {
            0
        }
    }

    pub fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }
}

impl PresentationSurface for Dx12SwapChain {
    fn buffer_count(&self) -> usize {
        self.buffer_count as usize
    }

    fn current_slot_index(&self) -> usize {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() as usize }
    }

    fn present(&self, mode: PresentMode) -> Result<()> {
        let flags = if mode.allow_tearing {
            DXGI_PRESENT_ALLOW_TEARING
        } else {
            DXGI_PRESENT(0)
        };
        check("Present", unsafe { self.swap_chain.Present(mode.sync_interval, flags) }.ok())
    }
}

/// DirectX 12 图形上下文
///
/// - `device`：D3D12 设备
/// - `queue`：直接命令队列
/// - `swap_chain`：交换链，后缓冲数量由配置决定
/// - `rtv_heap`：每个后缓冲一个 RTV
pub struct Dx12Context {
    pub device: ID3D12Device,
    pub queue: Dx12Queue,
    pub swap_chain: Dx12SwapChain,
    pub rtv_heap: ID3D12DescriptorHeap,
    pub rtv_descriptor_size: usize,
    pub back_buffers: Vec<ID3D12Resource>,
    pub window: Arc<Window>,
    pub width: u32,
    pub height: u32,
}

impl Dx12Context {
    /// 创建 DirectX 12 上下文
    ///
    /// 任何一步失败都返回错误，不做回退。
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);
        let buffer_count = config.graphics.buffer_count;

        unsafe {
            // 1. 启用调试层（仅 Debug 模式）
            #[cfg(debug_assertions)]
            {
                let mut debug: Option<ID3D12Debug> = None;
                match D3D12GetDebugInterface(&mut debug) {
                    Ok(()) => {
                        if let Some(debug) = debug {
                            debug.EnableDebugLayer();
                            debug!("DX12 Debug Layer enabled");
                        }
                    }
                    Err(_) => warn!("Failed to enable DX12 Debug Layer"),
                }
            }

            // 2. 创建 DXGI 工厂
            let factory_flags = if cfg!(debug_assertions) {
                DXGI_CREATE_FACTORY_DEBUG
            } else {
                DXGI_CREATE_FACTORY_FLAGS(0)
            };
            let factory: IDXGIFactory4 = check("CreateDXGIFactory2", CreateDXGIFactory2(factory_flags))?;
            let tearing_supported = check_tearing_support(&factory);

            // 3. 创建 D3D12 设备
            let mut device: Option<ID3D12Device> = None;
            if config.graphics.use_warp {
                let adapter: IDXGIAdapter = check("EnumWarpAdapter", factory.EnumWarpAdapter())?;
                D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)
                    .map_err(|e| GraphicsError::DeviceCreation(format!("D3D12CreateDevice (WARP): {}", e)))?;
            } else {
                let adapter = hardware_adapter(&factory)?;
                D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)
                    .map_err(|e| GraphicsError::DeviceCreation(format!("D3D12CreateDevice: {}", e)))?;
            }
            let device = device.ok_or_else(|| {
                GraphicsError::DeviceCreation("D3D12CreateDevice returned no device".to_string())
            })?;

            // 4. 创建命令队列
            let queue_desc = D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                ..Default::default()
            };
            let command_queue: ID3D12CommandQueue =
                check("CreateCommandQueue", device.CreateCommandQueue(&queue_desc))?;

            // 5. 创建交换链
            let hwnd = window_hwnd(&window)?;
            let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: width,
                Height: height,
                Format: BACK_BUFFER_FORMAT,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    ..Default::default()
                },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: buffer_count,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                Flags: if tearing_supported { DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32 } else { 0 },
                ..Default::default()
            };

            let swap_chain: IDXGISwapChain1 = factory
                .CreateSwapChainForHwnd(&command_queue, hwnd, &swap_chain_desc, None, None)
                .map_err(|e| GraphicsError::SwapchainError(format!("CreateSwapChainForHwnd: {}", e)))?;
            check("MakeWindowAssociation", factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER))?;
            let swap_chain: IDXGISwapChain3 = swap_chain
                .cast()
                .map_err(|e| GraphicsError::SwapchainError(format!("IDXGISwapChain3 cast: {}", e)))?;

            info!(width, height, buffers = buffer_count, tearing_supported, "Swap chain created");

            // 6. 创建描述符堆
            let rtv_heap_desc = D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: buffer_count,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                NodeMask: 0,
            };
            let rtv_heap: ID3D12DescriptorHeap =
                check("CreateDescriptorHeap", device.CreateDescriptorHeap(&rtv_heap_desc))?;
            let rtv_descriptor_size =
                device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) as usize;

            let mut context = Self {
                device,
                queue: Dx12Queue { queue: command_queue },
                swap_chain: Dx12SwapChain {
                    swap_chain,
                    buffer_count,
                    tearing_supported,
                },
                rtv_heap,
                rtv_descriptor_size,
                back_buffers: Vec::new(),
                window,
                width,
                height,
            };
            context.create_render_targets()?;

            info!("DX12 Backend initialization complete");
            Ok(context)
        }
    }

    /// 第 `index` 个后缓冲的 RTV
    pub fn rtv_handle(&self, index: usize) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let start = unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index * self.rtv_descriptor_size,
        }
    }

    fn create_render_targets(&mut self) -> Result<()> {
        self.back_buffers.clear();
        for i in 0..self.swap_chain.buffer_count {
            let buffer: ID3D12Resource = check("GetBuffer", unsafe { self.swap_chain.swap_chain.GetBuffer(i) })?;
            unsafe {
                self.device
                    .CreateRenderTargetView(&buffer, None, self.rtv_handle(i as usize));
            }
            self.back_buffers.push(buffer);
        }
        Ok(())
    }

    /// 调整交换链大小
    ///
    /// 调用前 GPU 必须已经空闲，否则后缓冲仍可能被读写。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        // 释放所有后缓冲引用
        self.back_buffers.clear();

        check("ResizeBuffers", unsafe {
            self.swap_chain.swap_chain.ResizeBuffers(
                self.swap_chain.buffer_count,
                width,
                height,
                BACK_BUFFER_FORMAT,
                DXGI_SWAP_CHAIN_FLAG(self.swap_chain.flags() as i32),
            )
        })?;

        self.width = width;
        self.height = height;
        self.create_render_targets()?;

        debug!(width, height, "Swap chain resized");
        Ok(())
    }
}

/// 枚举适配器，返回第一个支持 D3D12 的硬件适配器
fn hardware_adapter(factory: &IDXGIFactory4) -> Result<IDXGIAdapter1> {
    for index in 0.. {
        // 枚举结束时返回 DXGI_ERROR_NOT_FOUND
        let Ok(adapter) = (unsafe { factory.EnumAdapters1(index) }) else {
            break;
        };

        let desc = check("GetDesc1", unsafe { adapter.GetDesc1() })?;
        if is_software_adapter(desc.Flags) {
            continue;
        }

        // 只检查是否支持，设备稍后创建
        let supported = unsafe {
            D3D12CreateDevice(
                &adapter,
                D3D_FEATURE_LEVEL_11_0,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok();
        if supported {
            let name = String::from_utf16_lossy(&desc.Description);
            info!(adapter = name.trim_end_matches('\0'), "Hardware adapter selected");
            return Ok(adapter);
        }
    }

    Err(GraphicsError::DeviceCreation("No hardware adapter supports Direct3D 12".to_string()).into())
}

fn is_software_adapter(flags: u32) -> bool {
    flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0
}

fn check_tearing_support(factory: &IDXGIFactory4) -> bool {
    let Ok(factory5) = factory.cast::<IDXGIFactory5>() else {
        return false;
    };

    let mut allow_tearing: i32 = 0;
    let result = unsafe {
        factory5.CheckFeatureSupport(
            DXGI_FEATURE_PRESENT_ALLOW_TEARING,
            &mut allow_tearing as *mut i32 as *mut core::ffi::c_void,
            std::mem::size_of::<i32>() as u32,
        )
    };
    result.is_ok() && allow_tearing != 0
}

fn window_hwnd(window: &Window) -> Result<HWND> {
    let handle = window
        .window_handle()
        .map_err(|e| FrameSyncError::Initialization(format!("Failed to get window handle: {}", e)))?;
    match handle.as_raw() {
        RawWindowHandle::Win32(win32_handle) => Ok(HWND(win32_handle.hwnd.get() as *mut core::ffi::c_void)),
        _ => Err(FrameSyncError::Initialization(
            "Expected Win32 window handle on Windows platform".to_string(),
        )),
    }
}

impl GraphicsBackend for Dx12Context {
    type Fence = Dx12Fence;
    type Queue = Dx12Queue;
    type Surface = Dx12SwapChain;

    fn backend_name(&self) -> &str {
        "DirectX 12"
    }

    fn queue(&self) -> &Dx12Queue {
        &self.queue
    }

    fn surface(&self) -> &Dx12SwapChain {
        &self.swap_chain
    }

    fn create_fence(&self) -> Result<(Dx12Fence, Dx12Event)> {
        let fence = Dx12Fence::new(&self.device)?;
        let event = Dx12Event::new()?;
        debug!("Synchronization objects created");
        Ok((fence, event))
    }
}
