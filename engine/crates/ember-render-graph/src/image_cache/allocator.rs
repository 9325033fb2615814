//! 瞬态图像的显存分配
//!
//! `ImageCache` 只通过 [`TransientImageAllocator`] 创建和销毁图像，
//! 真实设备上使用 VMA，测试中使用不需要 GPU 的 [`HeadlessImageAllocator`]。

use std::ffi::CString;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anyhow::Context;
use ash::vk;
use ash::vk::Handle;
use ember_gfx::resources::format::GfxFormatUtils;
use vk_mem::Alloc;

use crate::image_cache::image_key::ImageKey;

/// 一张瞬态图像及其默认 view
pub struct GfxTransientImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// headless 分配器没有真实的 allocation
    pub allocation: Option<vk_mem::Allocation>,
}

pub trait TransientImageAllocator: Send + Sync {
    /// 按照 key 创建 image + view，失败时不残留任何对象
    fn allocate(&self, key: &ImageKey, name: &str) -> anyhow::Result<GfxTransientImage>;

    /// 先销毁 view 再销毁 image
    fn free(&self, image: GfxTransientImage);
}

/// 允许在外部保留分配器的引用（例如读取统计）
impl<T: TransientImageAllocator + ?Sized> TransientImageAllocator for Arc<T> {
    fn allocate(&self, key: &ImageKey, name: &str) -> anyhow::Result<GfxTransientImage> {
        (**self).allocate(key, name)
    }

    fn free(&self, image: GfxTransientImage) {
        (**self).free(image)
    }
}

/// 基于 VMA 的分配器
pub struct VmaImageAllocator {
    device: ash::Device,
    vma: Arc<vk_mem::Allocator>,
    debug_utils: Option<ash::ext::debug_utils::Device>,
}

// new & init
impl VmaImageAllocator {
    pub fn new(
        device: ash::Device,
        vma: Arc<vk_mem::Allocator>,
        debug_utils: Option<ash::ext::debug_utils::Device>,
    ) -> Self {
        Self {
            device,
            vma,
            debug_utils,
        }
    }
}

// tools
impl VmaImageAllocator {
    fn try_set_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }
}

impl TransientImageAllocator for VmaImageAllocator {
    fn allocate(&self, key: &ImageKey, name: &str) -> anyhow::Result<GfxTransientImage> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(key.format)
            .extent(vk::Extent3D {
                width: key.width,
                height: key.height,
                depth: 1,
            })
            .mip_levels(key.mip_levels)
            .array_layers(key.array_layers)
            .samples(key.samples)
            .tiling(key.tiling)
            .usage(key.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, mut allocation) = unsafe { self.vma.create_image(&image_info, &alloc_info) }
            .with_context(|| format!("failed to create transient image \"{name}\" ({key:?})"))?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(GfxFormatUtils::infer_view_type_2d(key.array_layers))
            .format(key.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: key.aspect,
                base_mip_level: 0,
                level_count: key.mip_levels,
                base_array_layer: 0,
                layer_count: key.array_layers,
            });
        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.vma.destroy_image(image, &mut allocation) };
                return Err(e).with_context(|| format!("failed to create view for transient image \"{name}\""));
            }
        };

        self.try_set_debug_name(image, name);
        self.try_set_debug_name(view, &format!("{name}::view"));

        Ok(GfxTransientImage {
            image,
            view,
            allocation: Some(allocation),
        })
    }

    fn free(&self, image: GfxTransientImage) {
        let GfxTransientImage {
            image,
            view,
            allocation,
        } = image;
        unsafe {
            self.device.destroy_image_view(view, None);
            match allocation {
                Some(mut allocation) => self.vma.destroy_image(image, &mut allocation),
                None => self.device.destroy_image(image, None),
            }
        }
    }
}

/// 不需要 GPU 的分配器，只分发递增的句柄
///
/// 统计分配/释放次数，并可以让接下来的若干次分配失败。
#[derive(Default)]
pub struct HeadlessImageAllocator {
    next_handle: AtomicU64,
    allocated: AtomicUsize,
    freed: AtomicUsize,
    fail_next: AtomicUsize,
}

impl HeadlessImageAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来的 `count` 次分配返回错误
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn freed_count(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    /// 当前仍然存活的图像数量
    #[inline]
    pub fn live_count(&self) -> usize {
        self.allocated_count() - self.freed_count()
    }
}

impl TransientImageAllocator for HeadlessImageAllocator {
    fn allocate(&self, key: &ImageKey, name: &str) -> anyhow::Result<GfxTransientImage> {
        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!("headless allocation of \"{name}\" ({}x{} {:?}) failed", key.width, key.height, key.format);
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(GfxTransientImage {
            image: vk::Image::from_raw(id << 1),
            view: vk::ImageView::from_raw((id << 1) | 1),
            allocation: None,
        })
    }

    fn free(&self, _image: GfxTransientImage) {
        self.freed.fetch_add(1, Ordering::SeqCst);
    }
}
