use std::sync::Arc;

use ash::vk;
use ember_gfx::basic::color::LabelColor;
use ember_gfx::commands::command_buffer::GfxCommandEncoder;
use itertools::Itertools;

use crate::image_cache::{CachedImageHandle, ImageCache};
use crate::render_graph::barrier_batcher::BarrierBatcher;
use crate::render_graph::dependency_graph::RgDependencyGraph;
use crate::render_graph::handle::{RgPassHandle, RgResourceHandle};
use crate::render_graph::pass::{RgImageAccess, RgPass, RgPassContext, RgPassDependency, RgPassEntry};
use crate::render_graph::resource::{RgResourceLifetime, RgResourceNode, RgResourceSource, RgTransientImageDesc};
use crate::render_graph::resource_state::RgImageState;
use crate::render_graph::settings::RgSettings;

/// 一次 `execute` 的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgExecuteStats {
    pub executed_passes: usize,
    /// 因为资源没有显存而被跳过的 pass
    pub skipped_passes: usize,
    /// `vkCmdPipelineBarrier2` 的调用次数
    pub barrier_batches: usize,
    pub image_barriers: usize,
    pub buffer_barriers: usize,
}

/// 每帧重建的渲染图
///
/// 每帧的调用顺序：`begin_frame` → `add_image` / `create_image` → `add_pass`
/// → `compile` → `execute`。所有句柄只在当帧有效。
///
/// 调用顺序错误、句柄过期、依赖成环等问题只会打印日志，不会 panic。
pub struct RenderGraph {
    image_cache: Arc<ImageCache>,
    settings: RgSettings,

    frame_number: u64,
    /// 帧代号，每次 `begin_frame` 递增
    generation: u32,
    frame_started: bool,
    /// 正在执行 `setup` 的 pass
    setup_pass: Option<usize>,

    resources: Vec<RgResourceNode>,
    pass_entries: Vec<RgPassEntry>,
    /// 与 `pass_entries` 一一对应（`setup` 期间少最后一个）
    passes: Vec<Box<dyn RgPass>>,

    execution_order: Vec<usize>,
    compiled: bool,
    cycle_detected: bool,

    /// 本帧从 ImageCache 借出的图像
    transient_claims: Vec<CachedImageHandle>,
    batcher: BarrierBatcher,
}

// new & init
impl RenderGraph {
    pub fn new(image_cache: Arc<ImageCache>, settings: RgSettings) -> Self {
        Self {
            image_cache,
            settings,

            frame_number: 0,
            generation: 0,
            frame_started: false,
            setup_pass: None,

            resources: Vec::new(),
            pass_entries: Vec::new(),
            passes: Vec::new(),

            execution_order: Vec::new(),
            compiled: false,
            cycle_detected: false,

            transient_claims: Vec::new(),
            batcher: BarrierBatcher::new(),
        }
    }

    /// 开始新的一帧
    ///
    /// 归还上一帧借出的瞬态图像，清空资源和 pass，之前的所有句柄失效。
    /// 调用前需要保证上一帧使用这些瞬态图像的 GPU 工作已经完成。
    pub fn begin_frame(&mut self, frame_number: u64) {
        if self.setup_pass.is_some() {
            log::error!("RenderGraph::begin_frame called from RgPass::setup, ignored");
            return;
        }

        self.release_transient_claims();
        self.resources.clear();
        self.pass_entries.clear();
        self.passes.clear();
        self.execution_order.clear();
        self.compiled = false;
        self.cycle_detected = false;

        self.frame_number = frame_number;
        self.generation = self.generation.wrapping_add(1);
        self.frame_started = true;
    }

    /// 归还所有借出的瞬态图像
    ///
    /// drop 时也会自动调用。
    pub fn shutdown(&mut self) {
        self.release_transient_claims();
        self.compiled = false;
    }
}

// 资源注册
impl RenderGraph {
    /// 注册外部图像（例如 swapchain image），`initial_layout` 是执行开始时图像所处的 layout
    pub fn add_image(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        view: vk::ImageView,
        initial_layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
        layer_count: u32,
    ) -> RgResourceHandle {
        let name = name.into();
        if !self.check_frame_started("add_image") {
            return RgResourceHandle::INVALID;
        }
        self.push_resource(RgResourceNode::physical(name, image, view, initial_layout, aspect, layer_count))
    }

    /// 注册瞬态图像，显存在 `compile` 时从 ImageCache 获取
    pub fn create_image(&mut self, name: impl Into<String>, desc: RgTransientImageDesc) -> RgResourceHandle {
        let name = name.into();
        if !self.check_frame_started("create_image") {
            return RgResourceHandle::INVALID;
        }
        self.push_resource(RgResourceNode::transient(name, desc))
    }

    fn push_resource(&mut self, node: RgResourceNode) -> RgResourceHandle {
        self.invalidate_compiled("resource", &node.name);
        let handle = RgResourceHandle::new(self.resources.len() as u32, self.generation);
        self.resources.push(node);
        handle
    }
}

// Pass 注册与声明
impl RenderGraph {
    /// 添加 pass，并立即调用它的 `setup`
    pub fn add_pass<P: RgPass + 'static>(&mut self, mut pass: P) -> RgPassHandle {
        if !self.check_frame_started("add_pass") {
            return RgPassHandle::INVALID;
        }
        if let Some(current) = self.setup_pass {
            log::error!(
                "RenderGraph::add_pass(\"{}\") called from setup of \"{}\", ignored",
                pass.name(),
                self.pass_entries[current].name
            );
            return RgPassHandle::INVALID;
        }
        self.invalidate_compiled("pass", pass.name());

        let index = self.pass_entries.len();
        let handle = RgPassHandle::new(index as u32, self.generation);
        self.pass_entries.push(RgPassEntry::new(pass.name()));

        self.setup_pass = Some(index);
        pass.setup(self, handle);
        self.setup_pass = None;

        self.passes.push(Box::new(pass));
        handle
    }

    /// 声明 `pass` 以 `state` 读取 `resource`
    ///
    /// 只能在该 pass 的 `setup` 中调用。
    pub fn read(&mut self, pass: RgPassHandle, resource: RgResourceHandle, state: RgImageState) {
        if let Some((pass_index, _)) = self.check_declaration("read", pass, resource) {
            self.pass_entries[pass_index].reads.push(RgImageAccess { resource, state });
        }
    }

    /// 声明 `pass` 以 `state` 写入 `resource`
    ///
    /// 只能在该 pass 的 `setup` 中调用。
    pub fn write(&mut self, pass: RgPassHandle, resource: RgResourceHandle, state: RgImageState) {
        if let Some((pass_index, _)) = self.check_declaration("write", pass, resource) {
            self.pass_entries[pass_index].writes.push(RgImageAccess { resource, state });
        }
    }

    /// 声明 `pass` 必须在 `dependency` 之后执行
    ///
    /// 这是排序的唯一依据，读写关系不会自动产生依赖。
    pub fn depends_on(&mut self, pass: RgPassHandle, resource: RgResourceHandle, dependency: RgPassHandle) {
        let Some((pass_index, _)) = self.check_declaration("depends_on", pass, resource) else {
            return;
        };
        if self.pass_index(dependency).is_none() {
            log::error!(
                "RenderGraph::depends_on: pass \"{}\" depends on unknown pass {:?}, ignored",
                self.pass_entries[pass_index].name,
                dependency
            );
            return;
        }
        self.pass_entries[pass_index].dependencies.push(RgPassDependency {
            pass: dependency,
            resource,
        });
    }
}

// 编译与执行
impl RenderGraph {
    /// 计算执行顺序、资源生命周期，并为用到的瞬态图像分配显存
    ///
    /// 依赖成环时打印错误，按声明顺序执行。
    pub fn compile(&mut self) {
        crate::profile_scope!("RenderGraph::compile");

        if !self.check_frame_started("compile") {
            return;
        }
        if self.setup_pass.is_some() {
            log::error!("RenderGraph::compile called from RgPass::setup, ignored");
            return;
        }

        // 同一帧重复 compile 时，先归还上一次借出的图像
        self.release_transient_claims();

        let pass_count = self.pass_entries.len();
        let mut dependency_graph = RgDependencyGraph::new(pass_count);
        for (consumer, entry) in self.pass_entries.iter().enumerate() {
            for dependency in &entry.dependencies {
                dependency_graph.add_edge(dependency.pass.index as usize, consumer);
            }
        }

        match dependency_graph.topological_sort() {
            Ok(order) => {
                self.execution_order = order;
                self.cycle_detected = false;
            }
            Err(cycle) => {
                log::error!(
                    "RenderGraph: dependency cycle among passes [{}], falling back to declaration order",
                    cycle.iter().map(|&i| self.pass_entries[i].name.as_str()).join(", ")
                );
                self.execution_order = (0..pass_count).collect();
                self.cycle_detected = true;
            }
        }

        self.compute_lifetimes();
        self.allocate_transient_resources();
        self.compiled = true;

        log::info!(
            "RenderGraph compiled (frame {}): {} passes, {} resources ({} transient)",
            self.frame_number,
            pass_count,
            self.resources.len(),
            self.resources.iter().filter(|r| r.is_transient()).count()
        );
        for &index in &self.execution_order {
            log::debug!("  [{}] {}", index, self.pass_entries[index].name);
        }

        if self.settings.dump_execution_plan {
            self.print_execution_plan();
        }
    }

    /// 按编译顺序录制所有 pass
    ///
    /// 每个 pass 之前先转换它声明的 reads、writes，并把产生的 barrier 合并为一次提交。
    /// 声明的资源没有可用显存的 pass 会被跳过。
    pub fn execute(&mut self, cmd: &dyn GfxCommandEncoder) -> RgExecuteStats {
        crate::profile_scope!("RenderGraph::execute");

        let mut stats = RgExecuteStats::default();
        if !self.compiled {
            log::error!("RenderGraph::execute called before compile, nothing recorded");
            return stats;
        }

        self.batcher.reset(self.resources.len());
        for (index, resource) in self.resources.iter().enumerate() {
            self.batcher.set_initial_state(index, RgImageState::from_layout(resource.initial_layout));
        }

        let ctx = RgPassContext::new(cmd, &self.resources, self.generation, self.frame_number);
        for &pass_index in &self.execution_order {
            let entry = &self.pass_entries[pass_index];
            let Some(pass) = self.passes.get(pass_index) else {
                continue;
            };

            let unresolved = entry.accesses().find(|a| !self.resources[a.resource.index as usize].is_resolved());
            if let Some(access) = unresolved {
                log::error!(
                    "RenderGraph: skip pass \"{}\", resource \"{}\" has no backing image",
                    entry.name,
                    self.resources[access.resource.index as usize].name
                );
                stats.skipped_passes += 1;
                continue;
            }

            for access in entry.accesses() {
                let index = access.resource.index as usize;
                let node = &self.resources[index];
                self.batcher.transition_image(index, node.image, node.aspect, node.layer_count, access.state);
            }

            let image_barriers = self.batcher.pending_image_barrier_count();
            let buffer_barriers = self.batcher.pending_buffer_barrier_count();
            if self.batcher.flush(cmd) {
                stats.barrier_batches += 1;
                stats.image_barriers += image_barriers;
                stats.buffer_barriers += buffer_barriers;
            }

            if self.settings.debug_labels {
                cmd.begin_label(&entry.name, LabelColor::COLOR_PASS);
            }
            pass.execute(&ctx);
            if self.settings.debug_labels {
                cmd.end_label();
            }
            stats.executed_passes += 1;
        }

        stats
    }
}

// getters
impl RenderGraph {
    /// 获取当帧资源，过期或未知的句柄返回 None
    pub fn get_resource(&self, handle: RgResourceHandle) -> Option<&RgResourceNode> {
        self.resource_index(handle).map(|index| &self.resources[index])
    }

    /// 编译后的执行顺序（pass 的声明下标）
    #[inline]
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// 编译后的执行顺序（pass 句柄）
    pub fn execution_order_handles(&self) -> Vec<RgPassHandle> {
        self.execution_order.iter().map(|&i| RgPassHandle::new(i as u32, self.generation)).collect()
    }

    #[inline]
    pub fn pass_entries(&self) -> &[RgPassEntry] {
        &self.pass_entries
    }

    pub fn pass_entry(&self, handle: RgPassHandle) -> Option<&RgPassEntry> {
        self.pass_index(handle).map(|index| &self.pass_entries[index])
    }

    #[inline]
    pub fn resources(&self) -> &[RgResourceNode] {
        &self.resources
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// 最近一次 compile 是否检测到依赖环
    #[inline]
    pub fn cycle_detected(&self) -> bool {
        self.cycle_detected
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn settings(&self) -> &RgSettings {
        &self.settings
    }

    #[inline]
    pub fn image_cache(&self) -> &Arc<ImageCache> {
        &self.image_cache
    }
}

// tools
impl RenderGraph {
    fn check_frame_started(&self, op: &str) -> bool {
        if !self.frame_started {
            log::error!("RenderGraph::{} called before begin_frame, ignored", op);
        }
        self.frame_started
    }

    fn invalidate_compiled(&mut self, kind: &str, name: &str) {
        if self.compiled {
            log::warn!("RenderGraph: {} \"{}\" added after compile, compile again before execute", kind, name);
            self.compiled = false;
        }
    }

    fn resource_index(&self, handle: RgResourceHandle) -> Option<usize> {
        let index = handle.index as usize;
        (self.frame_started && handle.generation == self.generation && index < self.resources.len()).then_some(index)
    }

    fn pass_index(&self, handle: RgPassHandle) -> Option<usize> {
        let index = handle.index as usize;
        (self.frame_started && handle.generation == self.generation && index < self.pass_entries.len())
            .then_some(index)
    }

    /// read / write / depends_on 的公共检查：pass 必须正处于 setup，resource 必须属于当帧
    fn check_declaration(
        &self,
        op: &str,
        pass: RgPassHandle,
        resource: RgResourceHandle,
    ) -> Option<(usize, usize)> {
        if !self.check_frame_started(op) {
            return None;
        }
        let Some(pass_index) = self.pass_index(pass) else {
            log::error!("RenderGraph::{}: stale or unknown pass {:?}, ignored", op, pass);
            return None;
        };
        if self.setup_pass != Some(pass_index) {
            log::error!(
                "RenderGraph::{}: pass \"{}\" is not in setup, declarations are fixed once setup returns",
                op,
                self.pass_entries[pass_index].name
            );
            return None;
        }
        let Some(resource_index) = self.resource_index(resource) else {
            log::error!(
                "RenderGraph::{}: pass \"{}\" uses stale or unknown resource {:?}, ignored",
                op,
                self.pass_entries[pass_index].name,
                resource
            );
            return None;
        };
        Some((pass_index, resource_index))
    }

    /// 按执行顺序计算每个资源的 [first_use, last_use]
    fn compute_lifetimes(&mut self) {
        for resource in &mut self.resources {
            resource.lifetime = None;
        }

        for (order, &pass_index) in self.execution_order.iter().enumerate() {
            for access in self.pass_entries[pass_index].accesses() {
                let Some(resource) = self.resources.get_mut(access.resource.index as usize) else {
                    continue;
                };
                resource.lifetime = Some(match resource.lifetime {
                    None => RgResourceLifetime {
                        first_use: order,
                        last_use: order,
                    },
                    Some(lifetime) => RgResourceLifetime {
                        first_use: lifetime.first_use.min(order),
                        last_use: lifetime.last_use.max(order),
                    },
                });
            }
        }
    }

    /// 为每个被使用的瞬态资源从 ImageCache 获取图像
    ///
    /// 获取失败时资源保持无显存状态，使用它的 pass 在 execute 时被跳过。
    fn allocate_transient_resources(&mut self) {
        for resource in &mut self.resources {
            let RgResourceSource::Transient { desc, cached } = &mut resource.source else {
                continue;
            };
            *cached = None;
            resource.image = vk::Image::null();
            resource.view = vk::ImageView::null();

            if resource.lifetime.is_none() {
                log::debug!("RenderGraph: transient \"{}\" is never used, not allocated", resource.name);
                continue;
            }

            match self.image_cache.acquire(&desc.to_image_key(), self.frame_number) {
                Ok(image_ref) => {
                    *cached = Some(image_ref.handle);
                    resource.image = image_ref.image;
                    resource.view = image_ref.view;
                    self.transient_claims.push(image_ref.handle);
                }
                Err(e) => {
                    log::error!("RenderGraph: failed to allocate transient \"{}\": {:#}", resource.name, e);
                }
            }
        }
    }

    fn release_transient_claims(&mut self) {
        for handle in self.transient_claims.drain(..) {
            self.image_cache.release(handle);
        }
        for resource in &mut self.resources {
            if let RgResourceSource::Transient { cached, .. } = &mut resource.source {
                *cached = None;
                resource.image = vk::Image::null();
                resource.view = vk::ImageView::null();
            }
        }
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.release_transient_claims();
    }
}
