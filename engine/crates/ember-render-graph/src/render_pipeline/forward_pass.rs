use std::sync::Arc;

use ash::vk;

use crate::render_graph::{RenderGraph, RgImageState, RgPass, RgPassContext, RgPassHandle, RgResourceHandle};
use crate::render_pipeline::renderable::{GpuMesh, RgRenderableSource};
use crate::render_pipeline::viewport_and_scissor;

const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

/// shader 里只声明了 `model` 和 `material_index`，对齐填充不上传
pub const FORWARD_PUSH_CONSTANT_SIZE: usize = 68;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ForwardPushConstants {
    pub model: glam::Mat4,
    pub material_index: u32,
    _padding: [u32; 3],
}

impl ForwardPushConstants {
    pub fn new(model: glam::Mat4, material_index: u32) -> Self {
        Self {
            model,
            material_index,
            _padding: [0; 3],
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::bytes_of(self)[..FORWARD_PUSH_CONSTANT_SIZE]
    }
}

pub struct ForwardPassDesc {
    pub csm: RgResourceHandle,
    pub depth: RgResourceHandle,
    pub color: RgResourceHandle,
    /// csm 的写入者
    pub shadow_pass: RgPassHandle,
    pub extent: vk::Extent2D,

    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    /// set 0
    pub bindless_set: vk::DescriptorSet,
    /// set 1，阴影贴图要通过 `CascadedShadowMap::array_view` 绑定，和 `csm` 是同一张 image
    pub frame_set: vk::DescriptorSet,

    pub renderables: Arc<dyn RgRenderableSource>,
    pub meshes: Arc<[GpuMesh]>,
    pub material_count: u32,
}

/// 带阴影的前向着色
pub struct ForwardPass {
    desc: ForwardPassDesc,
}

impl ForwardPass {
    pub fn new(desc: ForwardPassDesc) -> Self {
        Self { desc }
    }

    /// 超出范围的材质下标钳到最后一个材质
    #[inline]
    fn clamp_material_index(&self, material_index: u32) -> u32 {
        material_index.min(self.desc.material_count.saturating_sub(1))
    }
}

impl RgPass for ForwardPass {
    fn name(&self) -> &str {
        "Forward"
    }

    fn setup(&mut self, graph: &mut RenderGraph, self_handle: RgPassHandle) {
        graph.read(self_handle, self.desc.csm, RgImageState::SHADER_READ_FRAGMENT);
        graph.write(self_handle, self.desc.depth, RgImageState::DEPTH_ATTACHMENT_WRITE);
        graph.write(self_handle, self.desc.color, RgImageState::COLOR_ATTACHMENT_WRITE);
        graph.depends_on(self_handle, self.desc.csm, self.desc.shadow_pass);
    }

    fn execute(&self, ctx: &RgPassContext<'_>) {
        crate::profile_scope!("ForwardPass::execute");

        let (Some(color), Some(depth)) = (ctx.get_resource(self.desc.color), ctx.get_resource(self.desc.depth)) else {
            log::error!("ForwardPass: color or depth target is not available");
            return;
        };

        let cmd = ctx.cmd;
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(color.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: CLEAR_COLOR },
            })];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(depth.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        let (viewport, scissor) = viewport_and_scissor(self.desc.extent);
        let rendering_info = vk::RenderingInfo::default()
            .render_area(scissor)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        cmd.begin_rendering(&rendering_info);
        cmd.set_viewport(0, std::slice::from_ref(&viewport));
        cmd.set_scissor(0, std::slice::from_ref(&scissor));
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.desc.pipeline);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.desc.pipeline_layout,
            0,
            &[self.desc.bindless_set, self.desc.frame_set],
            &[],
        );

        self.desc.renderables.for_each_renderable(&mut |renderable| {
            let Some(mesh) = self.desc.meshes.get(renderable.mesh_index) else {
                return;
            };
            let push_constants =
                ForwardPushConstants::new(renderable.transform, self.clamp_material_index(renderable.material_index));
            cmd.push_constants(
                self.desc.pipeline_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                push_constants.as_bytes(),
            );
            mesh.draw(cmd);
        });

        cmd.end_rendering();
    }
}
