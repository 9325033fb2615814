use std::collections::HashMap;

use ash::vk;
use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::image_cache::allocator::{GfxTransientImage, TransientImageAllocator};
use crate::image_cache::image_key::ImageKey;

new_key_type! {
    /// 缓存中一张图像的句柄
    pub struct CachedImageHandle;
}

/// 默认的空闲帧数上限，与 frames in flight 数量一致
pub const DEFAULT_MAX_IDLE_FRAMES: u64 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageCacheSettings {
    /// 空闲超过这么多帧的图像会在 `evict_idle` 时被销毁
    pub max_idle_frames: u64,
}

impl Default for ImageCacheSettings {
    fn default() -> Self {
        Self {
            max_idle_frames: DEFAULT_MAX_IDLE_FRAMES,
        }
    }
}

/// `acquire` 的结果，在 `release` 之前图像归调用者使用
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedImageRef {
    pub handle: CachedImageHandle,
    pub image: vk::Image,
    pub view: vk::ImageView,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageCacheStats {
    /// 缓存持有的图像总数
    pub pooled: usize,
    /// 当前被借出的图像数
    pub in_use: usize,
    /// 不同 `ImageKey` 的数量
    pub buckets: usize,
}

struct CachedImage {
    key: ImageKey,
    image: GfxTransientImage,
    in_use: bool,
    last_used_frame: u64,
}

#[derive(Default)]
struct ImageCacheInner {
    images: SlotMap<CachedImageHandle, CachedImage>,
    pool: HashMap<ImageKey, Vec<CachedImageHandle>>,
}

/// 瞬态图像池
///
/// 按 `ImageKey` 分桶复用图像。所有对池的修改都在同一把锁内完成，
/// 因此可以通过 `Arc<ImageCache>` 被多个 RenderGraph 共享。
pub struct ImageCache {
    allocator: Box<dyn TransientImageAllocator>,
    settings: ImageCacheSettings,
    inner: Mutex<ImageCacheInner>,
}

// new & init
impl ImageCache {
    pub fn new(allocator: Box<dyn TransientImageAllocator>, settings: ImageCacheSettings) -> Self {
        Self {
            allocator,
            settings,
            inner: Mutex::new(ImageCacheInner::default()),
        }
    }
}

// 借出与归还
impl ImageCache {
    /// 取出一张与 `key` 匹配的空闲图像，没有则新建
    ///
    /// 返回的图像被标记为使用中，并记录 `current_frame`。
    pub fn acquire(&self, key: &ImageKey, current_frame: u64) -> anyhow::Result<CachedImageRef> {
        let mut inner = self.inner.lock();
        let ImageCacheInner { images, pool } = &mut *inner;

        let free_handle = pool
            .get(key)
            .and_then(|bucket| bucket.iter().copied().find(|&h| images.get(h).is_some_and(|c| !c.in_use)));
        if let Some((handle, cached)) = free_handle.and_then(|h| images.get_mut(h).map(|c| (h, c))) {
            cached.in_use = true;
            cached.last_used_frame = current_frame;
            return Ok(CachedImageRef {
                handle,
                image: cached.image.image,
                view: cached.image.view,
            });
        }

        let name = format!("transient-{:?}-{}x{}x{}", key.format, key.width, key.height, key.array_layers);
        let image = self.allocator.allocate(key, &name)?;
        let image_ref_parts = (image.image, image.view);
        let handle = images.insert(CachedImage {
            key: *key,
            image,
            in_use: true,
            last_used_frame: current_frame,
        });
        pool.entry(*key).or_default().push(handle);
        log::debug!("ImageCache: created {} (frame {})", name, current_frame);

        Ok(CachedImageRef {
            handle,
            image: image_ref_parts.0,
            view: image_ref_parts.1,
        })
    }

    /// 归还图像，不释放显存
    pub fn release(&self, handle: CachedImageHandle) {
        let mut inner = self.inner.lock();
        match inner.images.get_mut(handle) {
            Some(cached) => cached.in_use = false,
            None => log::warn!("ImageCache: release of unknown image {:?}", handle),
        }
    }
}

// 回收
impl ImageCache {
    /// 销毁所有空闲超过 `max_idle_frames` 帧的图像，返回销毁数量
    ///
    /// 由应用在帧循环中调用，RenderGraph 不会调用。
    pub fn evict_unused(&self, current_frame: u64, max_idle_frames: u64) -> usize {
        crate::profile_scope!("ImageCache::evict_unused");

        let mut inner = self.inner.lock();
        let ImageCacheInner { images, pool } = &mut *inner;

        let mut evicted = 0;
        pool.retain(|_, bucket| {
            bucket.retain(|&handle| {
                let Some(cached) = images.get(handle) else {
                    return false;
                };
                let idle_frames = current_frame.saturating_sub(cached.last_used_frame);
                if cached.in_use || idle_frames <= max_idle_frames {
                    return true;
                }
                if let Some(cached) = images.remove(handle) {
                    log::debug!(
                        "ImageCache: evict {:?} {}x{}x{}, idle {} frames",
                        cached.key.format,
                        cached.key.width,
                        cached.key.height,
                        cached.key.array_layers,
                        idle_frames
                    );
                    self.allocator.free(cached.image);
                    evicted += 1;
                }
                false
            });
            !bucket.is_empty()
        });

        if evicted > 0 {
            log::info!("ImageCache: evicted {} idle images at frame {}", evicted, current_frame);
        }
        evicted
    }

    /// 使用 settings 中的 `max_idle_frames` 调用 [`Self::evict_unused`]
    #[inline]
    pub fn evict_idle(&self, current_frame: u64) -> usize {
        self.evict_unused(current_frame, self.settings.max_idle_frames)
    }

    /// 销毁所有图像，不论是否在使用中
    ///
    /// 调用前需要保证 GPU 不再使用这些图像。
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let count = inner.images.len();
        for (_, cached) in inner.images.drain() {
            self.allocator.free(cached.image);
        }
        inner.pool.clear();
        if count > 0 {
            log::info!("ImageCache: destroyed {} images on shutdown", count);
        }
    }
}

// getters
impl ImageCache {
    #[inline]
    pub fn settings(&self) -> &ImageCacheSettings {
        &self.settings
    }

    pub fn stats(&self) -> ImageCacheStats {
        let inner = self.inner.lock();
        ImageCacheStats {
            pooled: inner.images.len(),
            in_use: inner.images.values().filter(|c| c.in_use).count(),
            buckets: inner.pool.len(),
        }
    }
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        let remaining = self.inner.get_mut().images.len();
        if remaining > 0 {
            log::warn!("ImageCache dropped with {} images still alive, call shutdown() first", remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::image_cache::allocator::HeadlessImageAllocator;

    /// 分配器计数通过 Arc 共享给测试
    fn make_cache() -> (ImageCache, Arc<HeadlessImageAllocator>) {
        let allocator = Arc::new(HeadlessImageAllocator::new());
        let cache = ImageCache::new(Box::new(allocator.clone()), ImageCacheSettings::default());
        (cache, allocator)
    }

    fn depth_key() -> ImageKey {
        ImageKey {
            format: vk::Format::D32_SFLOAT,
            width: 1280,
            height: 720,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            ..Default::default()
        }
    }

    #[test]
    fn test_acquire_release_reuses_entry() {
        let (cache, allocator) = make_cache();

        let first = cache.acquire(&depth_key(), 0).unwrap();
        cache.release(first.handle);
        let second = cache.acquire(&depth_key(), 1).unwrap();

        assert_eq!(first, second);
        assert_eq!(allocator.allocated_count(), 1);
        cache.shutdown();
    }

    #[test]
    fn test_in_use_entry_is_not_shared() {
        let (cache, allocator) = make_cache();

        let a = cache.acquire(&depth_key(), 0).unwrap();
        let b = cache.acquire(&depth_key(), 0).unwrap();
        assert_ne!(a.handle, b.handle);
        assert_ne!(a.image, b.image);

        // 签名不同的 key 进入不同的桶
        let other = ImageKey {
            array_layers: 4,
            ..depth_key()
        };
        cache.acquire(&other, 0).unwrap();

        assert_eq!(
            cache.stats(),
            ImageCacheStats {
                pooled: 3,
                in_use: 3,
                buckets: 2
            }
        );
        assert_eq!(allocator.allocated_count(), 3);
        cache.shutdown();
    }

    #[test]
    fn test_idle_eviction_window() {
        let (cache, allocator) = make_cache();

        let old = cache.acquire(&depth_key(), 10).unwrap();
        let recent = cache.acquire(&depth_key(), 12).unwrap();
        let busy = cache.acquire(&depth_key(), 0).unwrap();
        cache.release(old.handle);
        cache.release(recent.handle);

        // frame 14：old 空闲 4 帧 > 3，recent 空闲 2 帧，busy 仍在使用
        assert_eq!(cache.evict_unused(14, 3), 1);
        assert_eq!(allocator.freed_count(), 1);
        assert_eq!(
            cache.stats(),
            ImageCacheStats {
                pooled: 2,
                in_use: 1,
                buckets: 1
            }
        );

        // 恰好等于上限的不会被回收
        assert_eq!(cache.evict_unused(15, 3), 0);
        assert_eq!(cache.evict_idle(16), 1);

        cache.release(busy.handle);
        assert_eq!(cache.evict_unused(100, 3), 1);
        assert_eq!(cache.stats(), ImageCacheStats::default());
    }

    #[test]
    fn test_release_unknown_handle_is_harmless() {
        let (cache, _allocator) = make_cache();
        let image = cache.acquire(&depth_key(), 0).unwrap();
        cache.release(image.handle);
        cache.shutdown();
        cache.release(image.handle);
        assert_eq!(cache.stats().pooled, 0);
    }

    #[test]
    fn test_shutdown_frees_everything() {
        let (cache, allocator) = make_cache();
        cache.acquire(&depth_key(), 0).unwrap();
        let released = cache.acquire(&depth_key(), 0).unwrap();
        cache.release(released.handle);

        cache.shutdown();
        assert_eq!(allocator.live_count(), 0);
        assert_eq!(cache.stats().buckets, 0);
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        let (cache, allocator) = make_cache();
        allocator.fail_next(1);
        assert!(cache.acquire(&depth_key(), 0).is_err());
        assert_eq!(cache.stats().pooled, 0);
        assert!(cache.acquire(&depth_key(), 0).is_ok());
        cache.shutdown();
    }

    #[test]
    fn test_cache_is_shared_across_threads() {
        let (cache, allocator) = make_cache();
        let cache = Arc::new(cache);

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for frame in 0..16 {
                        let image = cache.acquire(&depth_key(), frame).unwrap();
                        cache.release(image.handle);
                    }
                    i
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(allocator.allocated_count() <= 4);
        assert_eq!(cache.stats().in_use, 0);
        cache.shutdown();
    }
}
