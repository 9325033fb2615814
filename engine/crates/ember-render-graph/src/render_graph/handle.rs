//! RenderGraph 句柄定义
//!
//! 句柄只在创建它的那一帧有效：`index` 指向当帧的资源表或 pass 表，
//! `generation` 是帧代号，每次 `begin_frame` 递增，旧句柄因此自动失效。

use std::fmt;

/// Graph 内部的资源句柄
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgResourceHandle {
    /// 资源在当帧资源表中的索引
    pub(crate) index: u32,
    /// 创建时的帧代号
    pub(crate) generation: u32,
}

impl RgResourceHandle {
    /// 无效句柄，调用顺序错误时返回
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for RgResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for RgResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "RgResource({}.g{})", self.index, self.generation)
        } else {
            write!(f, "RgResource(INVALID)")
        }
    }
}

/// Graph 内部的 Pass 句柄
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgPassHandle {
    /// Pass 在当帧 pass 表中的索引（声明顺序）
    pub(crate) index: u32,
    /// 创建时的帧代号
    pub(crate) generation: u32,
}

impl RgPassHandle {
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for RgPassHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for RgPassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "RgPass({}.g{})", self.index, self.generation)
        } else {
            write!(f, "RgPass(INVALID)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handles() {
        assert!(!RgResourceHandle::INVALID.is_valid());
        assert!(!RgPassHandle::default().is_valid());
        assert!(RgResourceHandle::new(0, 1).is_valid());
        assert_ne!(RgResourceHandle::new(0, 1), RgResourceHandle::new(0, 2));
        assert_eq!(format!("{:?}", RgPassHandle::new(3, 7)), "RgPass(3.g7)");
    }
}
