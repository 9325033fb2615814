use std::cell::RefCell;

use ash::vk;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::command_buffer::GfxCommandEncoder;

/// 录制下来的一条 image barrier，只保留调度相关的字段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxRecordedImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub aspect: vk::ImageAspectFlags,
    pub layer_count: u32,
}

impl From<&GfxImageBarrier> for GfxRecordedImageBarrier {
    fn from(barrier: &GfxImageBarrier) -> Self {
        let inner = barrier.inner();
        Self {
            image: inner.image,
            old_layout: inner.old_layout,
            new_layout: inner.new_layout,
            src_stage: inner.src_stage_mask,
            src_access: inner.src_access_mask,
            dst_stage: inner.dst_stage_mask,
            dst_access: inner.dst_access_mask,
            aspect: inner.subresource_range.aspect_mask,
            layer_count: inner.subresource_range.layer_count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxRecordedBufferBarrier {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl From<&GfxBufferBarrier> for GfxRecordedBufferBarrier {
    fn from(barrier: &GfxBufferBarrier) -> Self {
        let inner = barrier.inner();
        Self {
            buffer: inner.buffer,
            offset: inner.offset,
            size: inner.size,
            src_stage: inner.src_stage_mask,
            src_access: inner.src_access_mask,
            dst_stage: inner.dst_stage_mask,
            dst_access: inner.dst_access_mask,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GfxRecordedCommand {
    PipelineBarrier {
        images: Vec<GfxRecordedImageBarrier>,
        buffers: Vec<GfxRecordedBufferBarrier>,
    },
    BeginLabel(String),
    EndLabel,
    BeginRendering {
        extent: (u32, u32),
        layer_count: u32,
        color_views: Vec<vk::ImageView>,
        depth_view: Option<vk::ImageView>,
    },
    EndRendering,
    SetViewport {
        sizes: Vec<(f32, f32)>,
    },
    SetScissor {
        extents: Vec<(u32, u32)>,
    },
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        stage: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
}

/// 内存中的命令录制器
///
/// 不需要 GPU，用于在测试中检查帧图录制出的命令序列。
#[derive(Default)]
pub struct GfxCommandRecorder {
    commands: RefCell<Vec<GfxRecordedCommand>>,
}
// new & init
impl GfxCommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}
// getters
impl GfxCommandRecorder {
    pub fn commands(&self) -> Vec<GfxRecordedCommand> {
        self.commands.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.borrow().is_empty()
    }

    /// 按顺序返回每一次 pipeline barrier 中的 image barriers
    pub fn image_barrier_batches(&self) -> Vec<Vec<GfxRecordedImageBarrier>> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|cmd| match cmd {
                GfxRecordedCommand::PipelineBarrier { images, .. } => Some(images.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.commands.borrow_mut().clear();
    }
}
// tools
impl GfxCommandRecorder {
    #[inline]
    fn push(&self, cmd: GfxRecordedCommand) {
        self.commands.borrow_mut().push(cmd);
    }

    fn attachment_views(count: u32, ptr: *const vk::RenderingAttachmentInfo<'_>) -> Vec<vk::ImageView> {
        if count == 0 || ptr.is_null() {
            return Vec::new();
        }
        // RenderingInfo 借用的 attachment 数组在本次调用期间有效
        unsafe { std::slice::from_raw_parts(ptr, count as usize) }.iter().map(|a| a.image_view).collect()
    }
}
impl GfxCommandEncoder for GfxCommandRecorder {
    fn pipeline_barrier2(&self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        self.push(GfxRecordedCommand::PipelineBarrier {
            images: image_barriers.iter().map(GfxRecordedImageBarrier::from).collect(),
            buffers: buffer_barriers.iter().map(GfxRecordedBufferBarrier::from).collect(),
        });
    }

    fn begin_label(&self, label_name: &str, _label_color: glam::Vec4) {
        self.push(GfxRecordedCommand::BeginLabel(label_name.to_string()));
    }

    fn end_label(&self) {
        self.push(GfxRecordedCommand::EndLabel);
    }

    fn begin_rendering(&self, rendering_info: &vk::RenderingInfo<'_>) {
        let color_views =
            Self::attachment_views(rendering_info.color_attachment_count, rendering_info.p_color_attachments);
        let depth_view = Self::attachment_views(1, rendering_info.p_depth_attachment).first().copied();
        self.push(GfxRecordedCommand::BeginRendering {
            extent: (rendering_info.render_area.extent.width, rendering_info.render_area.extent.height),
            layer_count: rendering_info.layer_count,
            color_views,
            depth_view,
        });
    }

    fn end_rendering(&self) {
        self.push(GfxRecordedCommand::EndRendering);
    }

    fn set_viewport(&self, _first_viewport: u32, viewports: &[vk::Viewport]) {
        self.push(GfxRecordedCommand::SetViewport {
            sizes: viewports.iter().map(|v| (v.width, v.height)).collect(),
        });
    }

    fn set_scissor(&self, _first_scissor: u32, scissors: &[vk::Rect2D]) {
        self.push(GfxRecordedCommand::SetScissor {
            extents: scissors.iter().map(|s| (s.extent.width, s.extent.height)).collect(),
        });
    }

    fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.push(GfxRecordedCommand::BindPipeline { bind_point, pipeline });
    }

    fn bind_descriptor_sets(
        &self,
        _bind_point: vk::PipelineBindPoint,
        _pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        _dynamic_offsets: &[u32],
    ) {
        self.push(GfxRecordedCommand::BindDescriptorSets {
            first_set,
            sets: descriptor_sets.to_vec(),
        });
    }

    fn push_constants(&self, _pipeline_layout: vk::PipelineLayout, stage: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        self.push(GfxRecordedCommand::PushConstants {
            stage,
            offset,
            data: data.to_vec(),
        });
    }

    fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], _offsets: &[vk::DeviceSize]) {
        self.push(GfxRecordedCommand::BindVertexBuffers {
            first_binding,
            buffers: buffers.to_vec(),
        });
    }

    fn bind_index_buffer(&self, buffer: vk::Buffer, _offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.push(GfxRecordedCommand::BindIndexBuffer { buffer, index_type });
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.push(GfxRecordedCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_recorder_keeps_barrier_batches_in_order() {
        let recorder = GfxCommandRecorder::new();
        let barrier = GfxImageBarrier::new()
            .image(vk::Image::from_raw(1))
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        recorder.pipeline_barrier2(&[barrier], &[]);
        recorder.draw_indexed(3, 1, 0, 0, 0);
        recorder.pipeline_barrier2(&[barrier, barrier], &[]);

        let batches = recorder.image_barrier_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[0][0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(recorder.len(), 3);
    }

    #[test]
    fn test_recorder_reads_attachment_views() {
        let recorder = GfxCommandRecorder::new();
        let color = [vk::RenderingAttachmentInfo::default().image_view(vk::ImageView::from_raw(10))];
        let depth = vk::RenderingAttachmentInfo::default().image_view(vk::ImageView::from_raw(11));
        let info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D { width: 64, height: 32 },
            })
            .layer_count(1)
            .color_attachments(&color)
            .depth_attachment(&depth);

        recorder.begin_rendering(&info);
        recorder.end_rendering();

        assert_eq!(
            recorder.commands()[0],
            GfxRecordedCommand::BeginRendering {
                extent: (64, 32),
                layer_count: 1,
                color_views: vec![vk::ImageView::from_raw(10)],
                depth_view: Some(vk::ImageView::from_raw(11)),
            }
        );
        recorder.clear();
        assert!(recorder.is_empty());
    }
}
