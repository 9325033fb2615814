/// RenderGraph 的调试选项
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgSettings {
    /// 每个 pass 外包一层 debug label（RenderDoc / Nsight 中可见）
    pub debug_labels: bool,
    /// compile 之后打印执行计划
    pub dump_execution_plan: bool,
}

impl Default for RgSettings {
    fn default() -> Self {
        Self {
            debug_labels: true,
            dump_execution_plan: false,
        }
    }
}
