//! RenderGraph：每帧重建的声明式渲染图
//!
//! # 核心概念
//!
//! - **RgResourceHandle / RgPassHandle**: 当帧有效的句柄，带帧代号
//! - **RgImageState**: 资源状态描述，包含 stage、access、layout
//! - **RgPass**: 渲染 Pass trait，`setup` 声明资源访问和依赖，`execute` 录制命令
//! - **RenderGraph**: 排序、生命周期计算、瞬态资源分配、barrier 插入
//! - **BarrierBatcher**: 资源状态机，每个 pass 前合并提交一次 barrier
//!
//! # 使用示例
//!
//! ```ignore
//! struct BlitPass {
//!     src: RgResourceHandle,
//!     dst: RgResourceHandle,
//!     after: RgPassHandle,
//! }
//!
//! impl RgPass for BlitPass {
//!     fn name(&self) -> &str {
//!         "blit"
//!     }
//!
//!     fn setup(&mut self, graph: &mut RenderGraph, self_handle: RgPassHandle) {
//!         graph.read(self_handle, self.src, RgImageState::TRANSFER_SRC);
//!         graph.write(self_handle, self.dst, RgImageState::TRANSFER_DST);
//!         graph.depends_on(self_handle, self.src, self.after);
//!     }
//!
//!     fn execute(&self, ctx: &RgPassContext<'_>) {
//!         let src = ctx.get_resource(self.src);
//!         // 录制 blit 命令...
//!     }
//! }
//! ```
//!
//! # 排序规则
//!
//! 只有 `depends_on` 声明的边会影响顺序；没有依赖关系的 pass 保持声明顺序。
//! 依赖成环时打印错误并退回到声明顺序。

mod barrier_batcher;
mod dependency_graph;
mod execution_plan;
mod graph;
mod handle;
mod pass;
mod resource;
mod resource_state;
mod settings;

// Re-exports
pub use barrier_batcher::BarrierBatcher;
pub use dependency_graph::RgDependencyGraph;
pub use execution_plan::{RgPlannedPass, format_access_flags, format_pipeline_stage};
pub use graph::{RenderGraph, RgExecuteStats};
pub use handle::{RgPassHandle, RgResourceHandle};
pub use pass::{RgImageAccess, RgPass, RgPassContext, RgPassDependency, RgPassEntry};
pub use resource::{RgResourceLifetime, RgResourceNode, RgResourceSource, RgTransientImageDesc};
pub use resource_state::RgImageState;
pub use settings::RgSettings;
