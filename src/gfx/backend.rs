//! 图形后端的统一抽象接口
//!
//! 每个后端提供一个命令队列、一个交换链和创建 Fence 的能力，
//! 帧同步器只通过这些关联类型与具体图形 API 交互。

use crate::core::error::Result;
use crate::renderer::sync::{
    CommandQueue, Fence, FrameSynchronizer, PresentationSurface, SyncStrategy,
};

/// 图形后端的统一接口
///
/// 目前有两个实现：模拟 GPU（`SimContext`）和 DirectX 12（`Dx12Context`，仅 Windows）。
pub trait GraphicsBackend {
    type Fence: Fence;
    type Queue: CommandQueue<Fence = Self::Fence>;
    type Surface: PresentationSurface;

    /// 获取后端的名称，用于日志输出
    fn backend_name(&self) -> &str;

    /// 直接命令队列
    fn queue(&self) -> &Self::Queue;

    /// 交换链
    fn surface(&self) -> &Self::Surface;

    /// 创建初始值为 0 的 Fence 及其完成事件
    fn create_fence(&self) -> Result<(Self::Fence, <Self::Fence as Fence>::Event)>;

    /// 创建与交换链缓冲数量一致的帧同步器
    fn create_synchronizer(&self, strategy: SyncStrategy) -> Result<FrameSynchronizer<Self::Fence>> {
        let (fence, event) = self.create_fence()?;
        FrameSynchronizer::new(fence, event, self.surface().buffer_count(), strategy)
    }
}
