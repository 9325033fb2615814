use ash::vk;

/// 与 format 相关的推断工具
pub struct GfxFormatUtils;

impl GfxFormatUtils {
    /// 根据 format 推断 image aspect
    pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    /// 2D image 的默认 view 类型：多于一层时为 2D array
    #[inline]
    pub fn infer_view_type_2d(array_layers: u32) -> vk::ImageViewType {
        if array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_aspect() {
        assert_eq!(GfxFormatUtils::infer_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            GfxFormatUtils::infer_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(GfxFormatUtils::infer_aspect(vk::Format::S8_UINT), vk::ImageAspectFlags::STENCIL);
        assert_eq!(GfxFormatUtils::infer_aspect(vk::Format::B8G8R8A8_SRGB), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_infer_view_type() {
        assert_eq!(GfxFormatUtils::infer_view_type_2d(1), vk::ImageViewType::TYPE_2D);
        assert_eq!(GfxFormatUtils::infer_view_type_2d(4), vk::ImageViewType::TYPE_2D_ARRAY);
    }
}
