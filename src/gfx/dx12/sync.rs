//! DirectX 12 的 Fence、完成事件与命令队列

use tracing::warn;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::core::error::{GraphicsError, Result};
use crate::renderer::sync::{CommandQueue, CompletionEvent, Fence, FenceValue};

/// 把 `windows::core::Result` 转为设备错误
pub(crate) fn check<T>(call: &str, result: windows::core::Result<T>) -> Result<T> {
    result.map_err(|e| GraphicsError::device_failure(call, e).into())
}

/// Win32 自动重置事件
pub struct Dx12Event {
    handle: HANDLE,
}

impl Dx12Event {
    pub fn new() -> Result<Self> {
        let handle = check("CreateEventA", unsafe { CreateEventA(None, false, false, None) })?;
        Ok(Self { handle })
    }
}

impl CompletionEvent for Dx12Event {
    fn wait(&self) -> Result<()> {
        let result = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        if result != WAIT_OBJECT_0 {
            return Err(GraphicsError::device_failure(
                "WaitForSingleObject",
                format!("unexpected wait result 0x{:08X}", result.0),
            )
            .into());
        }
        Ok(())
    }
}

impl Drop for Dx12Event {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            warn!("Failed to close fence event: {}", e);
        }
    }
}

/// `ID3D12Fence` 封装
pub struct Dx12Fence {
    fence: ID3D12Fence,
}

impl Dx12Fence {
    pub fn new(device: &ID3D12Device) -> Result<Self> {
        let fence: ID3D12Fence = check("CreateFence", unsafe {
            device.CreateFence(0, D3D12_FENCE_FLAG_NONE)
        })?;
        Ok(Self { fence })
    }
}

impl Fence for Dx12Fence {
    type Event = Dx12Event;

    fn completed_value(&self) -> FenceValue {
        FenceValue::new(unsafe { self.fence.GetCompletedValue() })
    }

    fn set_event_on_completion(&self, value: FenceValue, event: &Dx12Event) -> Result<()> {
        check("SetEventOnCompletion", unsafe {
            self.fence.SetEventOnCompletion(value.value(), event.handle)
        })
    }
}

/// 直接命令队列
pub struct Dx12Queue {
    pub queue: ID3D12CommandQueue,
}

impl CommandQueue for Dx12Queue {
    type Fence = Dx12Fence;
    type CommandList = ID3D12GraphicsCommandList;

    fn execute_command_lists(&self, lists: &[ID3D12GraphicsCommandList]) -> Result<()> {
        let lists: Vec<Option<ID3D12CommandList>> = lists
            .iter()
            .map(|list| Some(list.clone().into()))
            .collect();
        unsafe { self.queue.ExecuteCommandLists(&lists) };
        Ok(())
    }

    fn signal(&self, fence: &Dx12Fence, value: FenceValue) -> Result<()> {
        check("Signal", unsafe { self.queue.Signal(&fence.fence, value.value()) })
    }
}
