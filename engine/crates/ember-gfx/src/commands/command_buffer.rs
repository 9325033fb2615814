use std::ffi::CString;

use ash::prelude::VkResult;
use ash::vk;
use itertools::Itertools;

use crate::basic::color::LabelColor;
use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};

/// 命令录制接口
///
/// 帧图以及各个 Pass 只通过这个 trait 录制命令，不直接接触 `ash::Device`。
/// 所有方法都只录制命令，不会提交到 queue。
pub trait GfxCommandEncoder {
    /// 一次 `vkCmdPipelineBarrier2`，同时携带 image 和 buffer barriers
    ///
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    fn pipeline_barrier2(&self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]);

    fn begin_label(&self, label_name: &str, label_color: glam::Vec4);
    fn end_label(&self);

    /// - command type: action, state
    /// - supported queue types: graphics
    fn begin_rendering(&self, rendering_info: &vk::RenderingInfo<'_>);
    fn end_rendering(&self);

    fn set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]);
    fn set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]);

    fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    fn push_constants(&self, pipeline_layout: vk::PipelineLayout, stage: vk::ShaderStageFlags, offset: u32, data: &[u8]);

    fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]);
    fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);

    /// - command type: action
    /// - supported queue types: graphics
    fn draw_indexed(&self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32);
}

/// 命令缓冲封装
///
/// 包装由外部（device/swapchain 引导层）分配好的 `vk::CommandBuffer`。
/// `debug_utils` 为空时 label 相关命令直接忽略。
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(
        device: ash::Device,
        debug_utils: Option<ash::ext::debug_utils::Device>,
        vk_handle: vk::CommandBuffer,
    ) -> Self {
        Self {
            vk_handle,
            device,
            debug_utils,
        }
    }
}
// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command
    ///
    /// 自动设置 debug label
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) -> VkResult<()> {
        unsafe {
            self.device
                .begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))?;
        }
        self.begin_label(debug_label_name, LabelColor::COLOR_CMD);
        Ok(())
    }

    /// 结束录制 command
    ///
    /// 结束 debug label
    pub fn end(&self) -> VkResult<()> {
        self.end_label();
        unsafe { self.device.end_command_buffer(self.vk_handle) }
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}
impl GfxCommandEncoder for GfxCommandBuffer {
    fn pipeline_barrier2(&self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        let image_barriers = image_barriers.iter().map(|b| *b.inner()).collect_vec();
        let buffer_barriers = buffer_barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(label_name) else {
            log::warn!("debug label contains an interior nul byte: {label_name:?}");
            return;
        };
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    fn end_label(&self) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.vk_handle) }
        }
    }

    #[inline]
    fn begin_rendering(&self, rendering_info: &vk::RenderingInfo<'_>) {
        unsafe { self.device.cmd_begin_rendering(self.vk_handle, rendering_info) }
    }

    #[inline]
    fn end_rendering(&self) {
        unsafe { self.device.cmd_end_rendering(self.vk_handle) }
    }

    #[inline]
    fn set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]) {
        unsafe { self.device.cmd_set_viewport(self.vk_handle, first_viewport, viewports) }
    }

    #[inline]
    fn set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]) {
        unsafe { self.device.cmd_set_scissor(self.vk_handle, first_scissor, scissors) }
    }

    #[inline]
    fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline) }
    }

    #[inline]
    fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            )
        }
    }

    #[inline]
    fn push_constants(&self, pipeline_layout: vk::PipelineLayout, stage: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        unsafe { self.device.cmd_push_constants(self.vk_handle, pipeline_layout, stage, offset, data) }
    }

    #[inline]
    fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe { self.device.cmd_bind_vertex_buffers(self.vk_handle, first_binding, buffers, offsets) }
    }

    #[inline]
    fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(self.vk_handle, buffer, offset, index_type) }
    }

    #[inline]
    fn draw_indexed(&self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.vk_handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }
}
