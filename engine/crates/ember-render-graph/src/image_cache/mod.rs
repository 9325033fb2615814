//! 瞬态图像缓存
//!
//! - `image_key`: 图像复用签名
//! - `allocator`: 显存分配接口（VMA / headless）
//! - `cache`: 按签名分桶的图像池，支持空闲回收

mod allocator;
mod cache;
mod image_key;

pub use allocator::{GfxTransientImage, HeadlessImageAllocator, TransientImageAllocator, VmaImageAllocator};
pub use cache::{
    CachedImageHandle, CachedImageRef, DEFAULT_MAX_IDLE_FRAMES, ImageCache, ImageCacheSettings, ImageCacheStats,
};
pub use image_key::ImageKey;
