use crate::render_graph::{RenderGraph, RgImageState, RgPass, RgPassContext, RgPassHandle, RgResourceHandle};

/// 只负责把 color 转换到 PRESENT_SRC_KHR，不录制任何命令
pub struct PresentPass {
    color: RgResourceHandle,
    forward_pass: RgPassHandle,
}

impl PresentPass {
    pub fn new(color: RgResourceHandle, forward_pass: RgPassHandle) -> Self {
        Self { color, forward_pass }
    }
}

impl RgPass for PresentPass {
    fn name(&self) -> &str {
        "Present"
    }

    fn setup(&mut self, graph: &mut RenderGraph, self_handle: RgPassHandle) {
        graph.write(self_handle, self.color, RgImageState::PRESENT);
        graph.depends_on(self_handle, self.color, self.forward_pass);
    }

    fn execute(&self, _ctx: &RgPassContext<'_>) {}
}
