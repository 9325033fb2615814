//! 执行计划打印
//!
//! 复用 `BarrierBatcher` 和内存录制器模拟一次执行，打印每个 pass 之前会插入的 barrier。

use ash::vk;
use ember_gfx::commands::command_recorder::{GfxCommandRecorder, GfxRecordedImageBarrier};
use itertools::Itertools;

use crate::render_graph::barrier_batcher::BarrierBatcher;
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::resource::RgResourceSource;
use crate::render_graph::resource_state::RgImageState;

const STAGE_NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
    (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
    (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
    (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
    (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
    (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
    (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
    (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
    (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
    (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
    (vk::PipelineStageFlags2::HOST, "HOST"),
    (vk::PipelineStageFlags2::ALL_GRAPHICS, "ALL_GRAPHICS"),
    (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
];

const ACCESS_NAMES: &[(vk::AccessFlags2, &str)] = &[
    (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
    (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
    (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
    (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
    (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
    (vk::AccessFlags2::SHADER_WRITE, "SHADER_WRITE"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
    (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
    (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
    (vk::AccessFlags2::HOST_WRITE, "HOST_WRITE"),
    (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
    (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
    (vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR, "ACCEL_STRUCT_WRITE"),
];

/// 可读的 stage 名称，多个 bit 用 `|` 连接
pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    let names = STAGE_NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).join(" | ");
    if names.is_empty() { format!("{:?}", stage) } else { names }
}

/// 可读的 access 名称，多个 bit 用 `|` 连接
pub fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }
    let names = ACCESS_NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).join(" | ");
    if names.is_empty() { format!("{:?}", access) } else { names }
}

/// dry run 中一个 pass 的预测结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgPlannedPass {
    /// `pass_entries` 中的下标
    pub pass_index: usize,
    /// 声明的资源没有可用显存，execute 时会被跳过
    pub skipped: bool,
    /// (资源下标, barrier)，顺序与提交顺序一致
    pub image_barriers: Vec<(usize, GfxRecordedImageBarrier)>,
}

impl RenderGraph {
    /// 按编译顺序模拟一次 execute，返回每个 pass 之前会提交的 barrier
    ///
    /// 与 execute 一样跳过声明了未分配资源的 pass。未编译时返回空。
    pub fn plan_execution(&self) -> Vec<RgPlannedPass> {
        if !self.is_compiled() {
            return Vec::new();
        }

        let entries = self.pass_entries();
        let resources = self.resources();

        let mut batcher = BarrierBatcher::new();
        batcher.reset(resources.len());
        for (index, resource) in resources.iter().enumerate() {
            batcher.set_initial_state(index, RgImageState::from_layout(resource.initial_layout));
        }
        let recorder = GfxCommandRecorder::new();

        self.execution_order()
            .iter()
            .map(|&pass_index| {
                let entry = &entries[pass_index];
                let skipped =
                    entry.accesses().any(|a| resources.get(a.resource.index as usize).is_none_or(|r| !r.is_resolved()));
                if skipped {
                    return RgPlannedPass {
                        pass_index,
                        skipped,
                        image_barriers: Vec::new(),
                    };
                }

                // 记录哪些访问产生了 barrier，flush 后按顺序对应
                let mut barrier_resources = Vec::new();
                for access in entry.accesses() {
                    let index = access.resource.index as usize;
                    let node = &resources[index];
                    let pending = batcher.pending_image_barrier_count();
                    batcher.transition_image(index, node.image, node.aspect, node.layer_count, access.state);
                    if batcher.pending_image_barrier_count() > pending {
                        barrier_resources.push(index);
                    }
                }
                recorder.clear();
                batcher.flush(&recorder);
                let barriers = recorder.image_barrier_batches().into_iter().flatten();

                RgPlannedPass {
                    pass_index,
                    skipped,
                    image_barriers: barrier_resources.into_iter().zip(barriers).collect(),
                }
            })
            .collect()
    }

    /// 打印执行顺序、每个 pass 的读写、预计的 barrier 以及资源生命周期
    pub fn print_execution_plan(&self) {
        if !self.is_compiled() {
            log::warn!("RenderGraph::print_execution_plan called before compile");
            return;
        }

        let entries = self.pass_entries();
        let resources = self.resources();
        let order = self.execution_order();
        let resource_name = |index: u32| resources.get(index as usize).map(|r| r.name.as_str()).unwrap_or("<unknown>");

        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan (frame {})", self.frame_number());
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Execution Order: [{}]",
            order.len(),
            order.iter().map(|&i| entries[i].name.as_str()).join(" → ")
        );
        if self.cycle_detected() {
            log::info!("║ ⚠ dependency cycle detected, declaration order used");
        }
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (position, planned) in self.plan_execution().iter().enumerate() {
            let pass_index = planned.pass_index;
            let entry = &entries[pass_index];

            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ [{}/{}] Pass: \"{}\"", position + 1, order.len(), entry.name);
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for (title, accesses) in [("Reads", &entry.reads), ("Writes", &entry.writes)] {
                if accesses.is_empty() {
                    continue;
                }
                log::info!("│ {}:", title);
                for access in accesses {
                    log::info!(
                        "│   \"{}\" @ {:?} (stage: {}, access: {})",
                        resource_name(access.resource.index),
                        access.state.layout,
                        format_pipeline_stage(access.state.stage),
                        format_access_flags(access.state.access)
                    );
                }
            }
            for dependency in &entry.dependencies {
                log::info!(
                    "│ After: \"{}\" (for \"{}\")",
                    entries.get(dependency.pass.index as usize).map(|e| e.name.as_str()).unwrap_or("<unknown>"),
                    resource_name(dependency.resource.index)
                );
            }

            log::info!("├─────────────────────────────────────────────────────────────────┤");
            if planned.skipped {
                log::info!("│ Skipped: a declared resource has no backing image");
            } else if planned.image_barriers.is_empty() {
                log::info!("│ No barriers required");
            }
            for (resource_index, barrier) in &planned.image_barriers {
                log::info!(
                    "│   Image \"{}\": {:?} → {:?}",
                    resource_name(*resource_index as u32),
                    barrier.old_layout,
                    barrier.new_layout
                );
                log::info!(
                    "│       Stage:  {} → {}",
                    format_pipeline_stage(barrier.src_stage),
                    format_pipeline_stage(barrier.dst_stage)
                );
                log::info!(
                    "│       Access: {} → {}",
                    format_access_flags(barrier.src_access),
                    format_access_flags(barrier.dst_access)
                );
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("Resources:");
        for resource in resources {
            let kind = match &resource.source {
                RgResourceSource::Physical => "physical".to_string(),
                RgResourceSource::Transient { desc, cached } => format!(
                    "transient {:?} {}x{}x{}{}",
                    desc.format,
                    desc.width,
                    desc.height,
                    desc.array_layers,
                    if cached.is_some() { "" } else { " (unallocated)" }
                ),
            };
            match resource.lifetime {
                Some(lifetime) => log::info!(
                    "  \"{}\" [{}] used {}..={}",
                    resource.name,
                    kind,
                    lifetime.first_use,
                    lifetime.last_use
                ),
                None => log::info!("  \"{}\" [{}] unused", resource.name, kind),
            }
        }
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ash::vk::Handle;

    use super::*;
    use crate::image_cache::{HeadlessImageAllocator, ImageCache, ImageCacheSettings};
    use crate::render_graph::{
        RgPass, RgPassContext, RgPassHandle, RgResourceHandle, RgSettings, RgTransientImageDesc,
    };

    struct WritePass {
        name: &'static str,
        target: RgResourceHandle,
        state: RgImageState,
    }

    impl RgPass for WritePass {
        fn name(&self) -> &str {
            self.name
        }

        fn setup(&mut self, graph: &mut RenderGraph, self_handle: RgPassHandle) {
            graph.write(self_handle, self.target, self.state);
        }

        fn execute(&self, _ctx: &RgPassContext<'_>) {}
    }

    /// "offscreen"（瞬态）和 "swapchain"（物理）各被一个 pass 写入
    fn make_graph(fail_allocations: usize) -> RenderGraph {
        ember_crate_tools::init_log::init_test_log();
        let allocator = Arc::new(HeadlessImageAllocator::new());
        allocator.fail_next(fail_allocations);
        let cache = Arc::new(ImageCache::new(Box::new(allocator), ImageCacheSettings::default()));
        let mut graph = RenderGraph::new(cache, RgSettings::default());

        graph.begin_frame(0);
        let offscreen = graph.create_image(
            "offscreen",
            RgTransientImageDesc::new_2d(
                vk::Format::R8G8B8A8_UNORM,
                vk::Extent2D { width: 8, height: 8 },
                vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ),
        );
        let swapchain = graph.add_image(
            "swapchain",
            vk::Image::from_raw(0xC0),
            vk::ImageView::from_raw(0xC1),
            vk::ImageLayout::UNDEFINED,
            vk::ImageAspectFlags::COLOR,
            1,
        );
        graph.add_pass(WritePass {
            name: "offscreen",
            target: offscreen,
            state: RgImageState::COLOR_ATTACHMENT_WRITE,
        });
        graph.add_pass(WritePass {
            name: "present",
            target: swapchain,
            state: RgImageState::PRESENT,
        });
        graph.compile();
        graph
    }

    #[test]
    fn test_plan_matches_execute() {
        let mut graph = make_graph(0);
        let plan = graph.plan_execution();
        graph.print_execution_plan();

        let recorder = GfxCommandRecorder::new();
        graph.execute(&recorder);
        let planned = plan.iter().map(|p| p.image_barriers.iter().map(|(_, b)| *b).collect_vec()).collect_vec();
        assert_eq!(planned, recorder.image_barrier_batches());

        let resource_indices = plan.iter().flat_map(|p| p.image_barriers.iter().map(|(i, _)| *i)).collect_vec();
        assert_eq!(resource_indices, vec![0, 1]);
    }

    #[test]
    fn test_plan_skips_unallocated_passes() {
        let graph = make_graph(1);
        let plan = graph.plan_execution();
        graph.print_execution_plan();

        assert_eq!(plan.len(), 2);
        assert!(plan[0].skipped);
        assert!(plan[0].image_barriers.is_empty());

        assert!(!plan[1].skipped);
        assert_eq!(plan[1].image_barriers.len(), 1);
        let (resource_index, barrier) = plan[1].image_barriers[0];
        assert_eq!(resource_index, 1);
        assert_eq!(barrier.image, vk::Image::from_raw(0xC0));
        assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_plan_empty_before_compile() {
        ember_crate_tools::init_log::init_test_log();
        let cache = Arc::new(ImageCache::new(Box::new(HeadlessImageAllocator::new()), ImageCacheSettings::default()));
        let mut graph = RenderGraph::new(cache, RgSettings::default());
        graph.begin_frame(0);
        assert!(graph.plan_execution().is_empty());
    }

    #[test]
    fn test_format_flags() {
        assert_eq!(format_access_flags(vk::AccessFlags2::NONE), "NONE");
        assert_eq!(
            format_access_flags(RgImageState::DEPTH_ATTACHMENT_WRITE.access),
            "DEPTH_ATTACH_WRITE"
        );
        assert_eq!(
            format_pipeline_stage(RgImageState::DEPTH_ATTACHMENT_WRITE.stage),
            "EARLY_FRAGMENT_TESTS | LATE_FRAGMENT_TESTS"
        );
        assert_eq!(format_pipeline_stage(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT), "COLOR_ATTACHMENT_OUTPUT");
    }
}
