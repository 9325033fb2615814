use std::sync::Arc;

use ash::vk;

use crate::render_graph::{RenderGraph, RgImageState, RgPass, RgPassContext, RgPassHandle, RgResourceHandle};
use crate::render_pipeline::renderable::{GpuMesh, RgRenderableSource};
use crate::render_pipeline::viewport_and_scissor;

/// 级联阴影贴图
///
/// 一张 depth array image，外加整体 view（forward 采样）和每层一个 view（shadow 渲染）。
/// 由外部创建并跨帧持有，每帧通过 [`CascadedShadowMap::import`] 注册为物理资源，
/// graph 插入的 barrier 因此落在 shadow pass 真正写入的 image 上。
#[derive(Clone, Debug)]
pub struct CascadedShadowMap {
    pub image: vk::Image,
    /// `TYPE_2D_ARRAY`，覆盖所有 cascade
    pub array_view: vk::ImageView,
    /// 第 i 个 view 只包含第 i 层
    pub layer_views: Vec<vk::ImageView>,
    /// 每层都是 `dim x dim`
    pub dim: u32,
}

impl CascadedShadowMap {
    #[inline]
    pub fn cascade_count(&self) -> u32 {
        self.layer_views.len() as u32
    }

    /// 整个 array 注册为一个资源，`layer_count` 等于 cascade 数量
    pub fn import(&self, graph: &mut RenderGraph, name: impl Into<String>) -> RgResourceHandle {
        graph.add_image(
            name,
            self.image,
            self.array_view,
            vk::ImageLayout::UNDEFINED,
            vk::ImageAspectFlags::DEPTH,
            self.cascade_count(),
        )
    }
}

pub struct ShadowPassDesc {
    /// `shadow_map.import` 返回的句柄
    pub csm: RgResourceHandle,
    pub shadow_map: Arc<CascadedShadowMap>,
    /// 每个 cascade 的光源 view-projection，数量必须和 `shadow_map.layer_views` 一致
    pub cascade_view_projs: Vec<glam::Mat4>,

    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,

    pub renderables: Arc<dyn RgRenderableSource>,
    pub meshes: Arc<[GpuMesh]>,
}

/// 把场景深度渲染到每一层 cascade
pub struct ShadowPass {
    desc: ShadowPassDesc,
}

impl ShadowPass {
    pub fn new(desc: ShadowPassDesc) -> Self {
        Self { desc }
    }
}

impl RgPass for ShadowPass {
    fn name(&self) -> &str {
        "Shadow"
    }

    fn setup(&mut self, graph: &mut RenderGraph, self_handle: RgPassHandle) {
        graph.write(self_handle, self.desc.csm, RgImageState::DEPTH_ATTACHMENT_WRITE);
    }

    fn execute(&self, ctx: &RgPassContext<'_>) {
        crate::profile_scope!("ShadowPass::execute");

        let shadow_map = &self.desc.shadow_map;
        let Some(csm) = ctx.get_resource(self.desc.csm) else {
            log::error!("ShadowPass: csm handle is not valid for this frame");
            return;
        };
        // barrier 只作用于注册的 image，写入其他 image 没有同步
        if csm.image != shadow_map.image {
            log::error!("ShadowPass: resource \"{}\" is not the cascaded shadow map image, nothing recorded", csm.name);
            return;
        }
        if self.desc.cascade_view_projs.len() != shadow_map.layer_views.len() {
            log::error!(
                "ShadowPass: {} view-projections for {} cascades, nothing recorded",
                self.desc.cascade_view_projs.len(),
                shadow_map.layer_views.len()
            );
            return;
        }

        let cmd = ctx.cmd;
        let extent = vk::Extent2D {
            width: shadow_map.dim,
            height: shadow_map.dim,
        };
        let (viewport, scissor) = viewport_and_scissor(extent);

        for (&layer_view, view_proj) in shadow_map.layer_views.iter().zip(&self.desc.cascade_view_projs) {
            let depth_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(layer_view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                });
            let rendering_info = vk::RenderingInfo::default()
                .render_area(scissor)
                .layer_count(1)
                .depth_attachment(&depth_attachment);

            cmd.begin_rendering(&rendering_info);
            cmd.set_viewport(0, std::slice::from_ref(&viewport));
            cmd.set_scissor(0, std::slice::from_ref(&scissor));
            cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.desc.pipeline);

            self.desc.renderables.for_each_renderable(&mut |renderable| {
                let Some(mesh) = self.desc.meshes.get(renderable.mesh_index) else {
                    return;
                };
                let mvp = *view_proj * renderable.transform;
                cmd.push_constants(
                    self.desc.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&mvp),
                );
                mesh.draw(cmd);
            });

            cmd.end_rendering();
        }
    }
}
