use ash::vk;

/// 瞬态图像的复用签名
///
/// 签名完全相同的图像可以跨帧复用同一块显存。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
}

impl Default for ImageKey {
    fn default() -> Self {
        Self {
            format: vk::Format::UNDEFINED,
            width: 0,
            height: 0,
            usage: vk::ImageUsageFlags::empty(),
            aspect: vk::ImageAspectFlags::COLOR,
            array_layers: 1,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
        }
    }
}
