//! Ember 帧图调度核心
//!
//! - [`render_graph`]：每帧重建的渲染图，负责 pass 排序、资源生命周期和 barrier 插入
//! - [`image_cache`]：跨帧复用的瞬态图像池
//! - [`render_pipeline`]：基于渲染图实现的 shadow / forward / present pass
//!
//! 每帧的调用顺序：
//!
//! ```ignore
//! graph.begin_frame(frame_number);
//! let swapchain = graph.add_image("swapchain", image, view, vk::ImageLayout::UNDEFINED, vk::ImageAspectFlags::COLOR, 1);
//! let depth = graph.create_image(
//!     "depth",
//!     RgTransientImageDesc::new_2d(vk::Format::D32_SFLOAT, extent, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
//! );
//! let forward = graph.add_pass(ForwardPass::new(desc));
//! graph.add_pass(PresentPass::new(swapchain, forward));
//! graph.compile();
//! let stats = graph.execute(&cmd);
//! ```

pub mod image_cache;
pub mod profiling;
pub mod render_graph;
pub mod render_pipeline;
