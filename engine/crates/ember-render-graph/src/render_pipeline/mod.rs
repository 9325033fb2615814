//! 基于 RenderGraph 的级联阴影前向渲染
//!
//! 每帧按 Shadow → Forward → Present 的顺序注册：
//!
//! ```ignore
//! let csm = shadow_map.import(graph, "csm");
//! let shadow = graph.add_pass(ShadowPass::new(ShadowPassDesc { csm, ..shadow_desc }));
//! let forward = graph.add_pass(ForwardPass::new(ForwardPassDesc { csm, shadow_pass: shadow, ..forward_desc }));
//! graph.add_pass(PresentPass::new(color, forward));
//! ```

mod forward_pass;
mod present_pass;
mod renderable;
mod shadow_pass;

use ash::vk;

pub use forward_pass::{FORWARD_PUSH_CONSTANT_SIZE, ForwardPass, ForwardPassDesc, ForwardPushConstants};
pub use present_pass::PresentPass;
pub use renderable::{GpuMesh, RgRenderable, RgRenderableSource};
pub use shadow_pass::{CascadedShadowMap, ShadowPass, ShadowPassDesc};

/// 覆盖整个 extent 的 viewport 和 scissor
pub(crate) fn viewport_and_scissor(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    };
    (viewport, scissor)
}
