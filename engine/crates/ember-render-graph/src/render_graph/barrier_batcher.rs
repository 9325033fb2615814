//! Barrier 批处理
//!
//! 执行阶段按 pass 顺序追踪每个资源最近一次的 {layout, stage, access}，
//! 只在需要时生成 barrier，并在每个 pass 执行前一次性提交。

use ash::vk;
use ember_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use ember_gfx::commands::command_buffer::GfxCommandEncoder;

use crate::render_graph::resource_state::RgImageState;

/// 资源状态机 + 待提交的 barrier 列表
#[derive(Default)]
pub struct BarrierBatcher {
    /// 以资源索引为下标
    image_states: Vec<RgImageState>,

    pending_image_barriers: Vec<GfxImageBarrier>,
    pending_buffer_barriers: Vec<GfxBufferBarrier>,
}

// new & init
impl BarrierBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有资源回到 (UNDEFINED, TOP_OF_PIPE, NONE)，清空待提交列表
    pub fn reset(&mut self, resource_count: usize) {
        self.image_states.clear();
        self.image_states.resize(resource_count, RgImageState::UNDEFINED);
        self.pending_image_barriers.clear();
        self.pending_buffer_barriers.clear();
    }

    pub fn set_initial_state(&mut self, resource: usize, state: RgImageState) {
        match self.image_states.get_mut(resource) {
            Some(s) => *s = state,
            None => log::warn!("BarrierBatcher: resource index {} out of range", resource),
        }
    }
}

// 状态转换
impl BarrierBatcher {
    /// 将资源转换到 `new_state`
    ///
    /// layout 改变，或者之前/现在的访问包含写操作时，才需要 barrier；
    /// 否则只把 stage 和 access 合并进当前状态（例如连续的只读访问）。
    pub fn transition_image(
        &mut self,
        resource: usize,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        layer_count: u32,
        new_state: RgImageState,
    ) {
        let Some(current) = self.image_states.get_mut(resource) else {
            log::warn!("BarrierBatcher: resource index {} out of range", resource);
            return;
        };

        let layout_change = current.layout != new_state.layout;
        let hazard = current.is_write() || new_state.is_write();

        if !layout_change && !hazard {
            current.stage |= new_state.stage;
            current.access |= new_state.access;
            return;
        }

        self.pending_image_barriers.push(
            GfxImageBarrier::new()
                .image(image)
                .layout_transfer(current.layout, new_state.layout)
                .src_mask(current.stage, current.access)
                .dst_mask(new_state.stage, new_state.access)
                .image_aspect_flag(aspect)
                .layer_count(layer_count),
        );
        *current = new_state;
    }

    /// buffer barrier 不做状态追踪，直接加入待提交列表
    #[allow(clippy::too_many_arguments)]
    pub fn add_buffer_barrier(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) {
        self.pending_buffer_barriers.push(
            GfxBufferBarrier::new()
                .buffer(buffer, offset, size)
                .src_mask(src_stage, src_access)
                .dst_mask(dst_stage, dst_access),
        );
    }

    /// 将所有待提交的 barrier 合并为一次 `vkCmdPipelineBarrier2`
    ///
    /// 没有待提交的 barrier 时不录制任何命令，返回 false。
    pub fn flush(&mut self, cmd: &dyn GfxCommandEncoder) -> bool {
        if !self.has_pending_barriers() {
            return false;
        }

        cmd.pipeline_barrier2(&self.pending_image_barriers, &self.pending_buffer_barriers);
        self.pending_image_barriers.clear();
        self.pending_buffer_barriers.clear();
        true
    }
}

// getters
impl BarrierBatcher {
    #[inline]
    pub fn has_pending_barriers(&self) -> bool {
        !self.pending_image_barriers.is_empty() || !self.pending_buffer_barriers.is_empty()
    }

    #[inline]
    pub fn pending_image_barrier_count(&self) -> usize {
        self.pending_image_barriers.len()
    }

    #[inline]
    pub fn pending_buffer_barrier_count(&self) -> usize {
        self.pending_buffer_barriers.len()
    }

    #[inline]
    pub fn image_state(&self, resource: usize) -> Option<RgImageState> {
        self.image_states.get(resource).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use ember_gfx::commands::command_recorder::GfxCommandRecorder;

    fn image() -> vk::Image {
        vk::Image::from_raw(0x10)
    }

    #[test]
    fn test_read_after_read_same_layout_is_free() {
        let mut batcher = BarrierBatcher::new();
        batcher.reset(1);
        batcher.set_initial_state(0, RgImageState::from_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));

        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::SHADER_READ_FRAGMENT);
        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::SHADER_READ_COMPUTE);
        assert_eq!(batcher.pending_image_barrier_count(), 0);

        // stage 被合并
        let state = batcher.image_state(0).unwrap();
        assert!(state.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(state.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert_eq!(state.access, vk::AccessFlags2::SHADER_SAMPLED_READ);
    }

    #[test]
    fn test_second_read_queues_nothing() {
        let mut batcher = BarrierBatcher::new();
        batcher.reset(1);

        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::SHADER_READ_FRAGMENT);
        assert_eq!(batcher.pending_image_barrier_count(), 1, "UNDEFINED -> SHADER_READ needs a layout change");
        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::SHADER_READ_FRAGMENT);
        assert_eq!(batcher.pending_image_barrier_count(), 1);
    }

    #[test]
    fn test_access_after_write_needs_barrier() {
        let mut batcher = BarrierBatcher::new();
        batcher.reset(1);
        batcher.set_initial_state(0, RgImageState::from_layout(vk::ImageLayout::GENERAL));

        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::STORAGE_WRITE_COMPUTE);
        let recorder = GfxCommandRecorder::new();
        batcher.flush(&recorder);

        // 同一 layout 的写后写
        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::STORAGE_WRITE_COMPUTE);
        assert_eq!(batcher.pending_image_barrier_count(), 1);
        batcher.flush(&recorder);

        // 同一 layout 的写后读
        let read_general = RgImageState::new(
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_READ,
            vk::ImageLayout::GENERAL,
        );
        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, read_general);
        assert_eq!(batcher.pending_image_barrier_count(), 1);
        batcher.flush(&recorder);

        let last = recorder.image_barrier_batches().pop().unwrap();
        assert_eq!(last[0].src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(last[0].dst_access, vk::AccessFlags2::SHADER_STORAGE_READ);
        assert_eq!(last[0].old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(last[0].new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_layout_change_always_queues_barrier() {
        let mut batcher = BarrierBatcher::new();
        batcher.reset(1);
        batcher.set_initial_state(0, RgImageState::from_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));

        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::TRANSFER_SRC);
        assert_eq!(batcher.pending_image_barrier_count(), 1);
        assert_eq!(batcher.image_state(0), Some(RgImageState::TRANSFER_SRC));
    }

    #[test]
    fn test_flush_emits_one_batched_call() {
        let mut batcher = BarrierBatcher::new();
        batcher.reset(2);
        let recorder = GfxCommandRecorder::new();

        assert!(!batcher.flush(&recorder));
        assert!(recorder.is_empty());

        batcher.transition_image(0, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::COLOR_ATTACHMENT_WRITE);
        batcher.transition_image(
            1,
            vk::Image::from_raw(0x20),
            vk::ImageAspectFlags::DEPTH,
            4,
            RgImageState::DEPTH_ATTACHMENT_WRITE,
        );
        batcher.add_buffer_barrier(
            vk::Buffer::from_raw(0x30),
            0,
            vk::WHOLE_SIZE,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::VERTEX_INPUT,
            vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
        );

        assert!(batcher.flush(&recorder));
        assert!(!batcher.has_pending_barriers());

        let batches = recorder.image_barrier_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][1].layer_count, 4);
        assert_eq!(batches[0][1].aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_out_of_range_resource_is_ignored() {
        let mut batcher = BarrierBatcher::new();
        batcher.reset(1);
        batcher.transition_image(5, image(), vk::ImageAspectFlags::COLOR, 1, RgImageState::COLOR_ATTACHMENT_WRITE);
        batcher.set_initial_state(5, RgImageState::PRESENT);
        assert!(!batcher.has_pending_barriers());
        assert_eq!(batcher.image_state(5), None);
    }
}
