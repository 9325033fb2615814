//! tracy 性能分析宏
//!
//! 未打开 `profiling` feature 时宏展开为空。打开后需要由应用启动 `tracy_client::Client`。

#[cfg(feature = "profiling")]
pub use tracy_client::span;

#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}
