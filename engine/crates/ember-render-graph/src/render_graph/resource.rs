//! 资源节点定义

use ash::vk;
use ember_gfx::resources::format::GfxFormatUtils;

use crate::image_cache::{CachedImageHandle, ImageKey};

/// 瞬态图像描述，同时作为 ImageCache 的查找签名
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgTransientImageDesc {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
}

impl RgTransientImageDesc {
    /// 单层、单 mip 的 2D 图像，aspect 根据 format 推断
    pub fn new_2d(format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            width: extent.width,
            height: extent.height,
            usage,
            aspect: GfxFormatUtils::infer_aspect(format),
            array_layers: 1,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    /// builder
    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    pub fn to_image_key(&self) -> ImageKey {
        ImageKey {
            format: self.format,
            width: self.width,
            height: self.height,
            usage: self.usage,
            aspect: self.aspect,
            array_layers: self.array_layers,
            mip_levels: self.mip_levels,
            samples: self.samples,
            tiling: vk::ImageTiling::OPTIMAL,
        }
    }
}

/// 资源来源
#[derive(Clone, Debug)]
pub enum RgResourceSource {
    /// 外部传入（例如 swapchain image），生命周期由调用者负责
    Physical,
    /// 由 ImageCache 提供显存，`cached` 在 compile 成功后才有值
    Transient {
        desc: RgTransientImageDesc,
        cached: Option<CachedImageHandle>,
    },
}

/// 资源在执行顺序中的使用区间（闭区间，下标为执行顺序中的位置）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// RenderGraph 中的一个图像资源
#[derive(Clone, Debug)]
pub struct RgResourceNode {
    pub name: String,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub aspect: vk::ImageAspectFlags,
    pub layer_count: u32,
    /// 执行开始时 BarrierBatcher 的种子 layout
    pub initial_layout: vk::ImageLayout,
    pub source: RgResourceSource,
    /// 没有被任何 pass 使用时为 None
    pub lifetime: Option<RgResourceLifetime>,
}

impl RgResourceNode {
    pub(crate) fn physical(
        name: String,
        image: vk::Image,
        view: vk::ImageView,
        initial_layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
        layer_count: u32,
    ) -> Self {
        Self {
            name,
            image,
            view,
            aspect,
            layer_count,
            initial_layout,
            source: RgResourceSource::Physical,
            lifetime: None,
        }
    }

    pub(crate) fn transient(name: String, desc: RgTransientImageDesc) -> Self {
        Self {
            name,
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            aspect: desc.aspect,
            layer_count: desc.array_layers,
            initial_layout: vk::ImageLayout::UNDEFINED,
            source: RgResourceSource::Transient { desc, cached: None },
            lifetime: None,
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self.source, RgResourceSource::Transient { .. })
    }

    /// 是否已经有可用的 image（物理资源总是可用）
    #[inline]
    pub fn is_resolved(&self) -> bool {
        match &self.source {
            RgResourceSource::Physical => true,
            RgResourceSource::Transient { cached, .. } => cached.is_some(),
        }
    }
}
