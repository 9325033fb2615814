//! Pass 定义
//!
//! 提供 `RgPass` trait 用于声明式定义渲染 Pass，
//! 以及 Pass 执行时可以访问的 `RgPassContext`。

use ember_gfx::commands::command_buffer::GfxCommandEncoder;

use crate::render_graph::graph::RenderGraph;
use crate::render_graph::handle::{RgPassHandle, RgResourceHandle};
use crate::render_graph::resource::RgResourceNode;
use crate::render_graph::resource_state::RgImageState;

/// 渲染 Pass
///
/// - `setup` 在 `RenderGraph::add_pass` 内被同步调用一次，
///   在这里通过 `graph.read / graph.write / graph.depends_on` 声明所有 GPU 访问；
/// - `execute` 每帧按编译后的顺序调用一次，调用前该 pass 需要的 barrier 已经提交。
///
/// `execute` 只录制命令，不提交。
pub trait RgPass {
    fn name(&self) -> &str;

    fn setup(&mut self, graph: &mut RenderGraph, self_handle: RgPassHandle);

    fn execute(&self, ctx: &RgPassContext<'_>);
}

/// 一次声明的图像访问
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgImageAccess {
    pub resource: RgResourceHandle,
    pub state: RgImageState,
}

/// 显式依赖：`pass` 必须先执行，`resource` 说明依赖的原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgPassDependency {
    pub pass: RgPassHandle,
    pub resource: RgResourceHandle,
}

/// Pass 在 graph 中的声明记录
///
/// `setup` 返回后不再变化。
#[derive(Clone, Debug, Default)]
pub struct RgPassEntry {
    pub name: String,
    pub reads: Vec<RgImageAccess>,
    pub writes: Vec<RgImageAccess>,
    pub dependencies: Vec<RgPassDependency>,
}

impl RgPassEntry {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 先 reads 后 writes，与 barrier 的处理顺序一致
    #[inline]
    pub fn accesses(&self) -> impl Iterator<Item = &RgImageAccess> {
        self.reads.iter().chain(self.writes.iter())
    }
}

/// Pass 执行时的上下文
pub struct RgPassContext<'a> {
    /// 命令录制接口
    pub cmd: &'a dyn GfxCommandEncoder,
    pub frame_number: u64,

    resources: &'a [RgResourceNode],
    generation: u32,
}

impl<'a> RgPassContext<'a> {
    pub(crate) fn new(
        cmd: &'a dyn GfxCommandEncoder,
        resources: &'a [RgResourceNode],
        generation: u32,
        frame_number: u64,
    ) -> Self {
        Self {
            cmd,
            frame_number,
            resources,
            generation,
        }
    }

    /// 获取当帧资源的物理 image / view
    #[inline]
    pub fn get_resource(&self, handle: RgResourceHandle) -> Option<&'a RgResourceNode> {
        if handle.generation != self.generation {
            return None;
        }
        self.resources.get(handle.index as usize)
    }
}
