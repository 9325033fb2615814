use ash::vk;
use ember_gfx::commands::command_buffer::GfxCommandEncoder;

/// 上传到 GPU 的网格，顶点/索引 buffer 由外部创建和持有
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertex_buffer: vk::Buffer,
    /// 索引类型固定为 u32
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    /// 绑定顶点/索引 buffer 并绘制一次
    pub fn draw(&self, cmd: &dyn GfxCommandEncoder) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer], &[0]);
        cmd.bind_index_buffer(self.index_buffer, 0, vk::IndexType::UINT32);
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
    }
}

/// 场景中的一个可绘制对象
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgRenderable {
    /// world matrix
    pub transform: glam::Mat4,
    /// `GpuMesh` 数组中的下标
    pub mesh_index: usize,
    /// 材质数组中的下标
    pub material_index: u32,
}

/// 为 pass 提供可绘制对象的场景接口
pub trait RgRenderableSource {
    fn for_each_renderable(&self, f: &mut dyn FnMut(&RgRenderable));
}

impl RgRenderableSource for [RgRenderable] {
    fn for_each_renderable(&self, f: &mut dyn FnMut(&RgRenderable)) {
        self.iter().for_each(f);
    }
}

impl RgRenderableSource for Vec<RgRenderable> {
    fn for_each_renderable(&self, f: &mut dyn FnMut(&RgRenderable)) {
        self.as_slice().for_each_renderable(f);
    }
}
