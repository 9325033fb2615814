//! Vulkan GFX 抽象层
//!
//! 只覆盖帧图调度需要的部分：barrier 构建、命令录制接口、格式工具。
//! 命令录制通过 [`commands::command_buffer::GfxCommandEncoder`] trait 抽象，
//! 既可以落到真实的 `vk::CommandBuffer`，也可以落到内存中的
//! [`commands::command_recorder::GfxCommandRecorder`]（无 GPU 环境下使用）。

pub mod basic;
pub mod commands;
pub mod resources;
