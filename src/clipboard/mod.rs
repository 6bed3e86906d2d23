//! 剪贴板写入模块
//!
//! # 设计思路
//!
//! 不同平台、不同运行环境下可用的剪贴板能力差异很大（无图形会话、
//! Wayland/X11、沙箱……）。这里把每种写法封装为一个 `ClipboardStrategy`，
//! 由 `ClipboardChain` 按顺序尝试：
//!
//! 1. `SystemClipboard`：`arboard` 原生剪贴板（文本 / RGBA 图片），带退避重试
//! 2. `CommandClipboard`：平台命令行工具（`wl-copy` / `xclip` / `pbcopy` / `clip`）
//! 3. `DataUrlClipboard`：图片退化为 Data URL 文本写入
//!
//! 第一个成功的策略生效；全部失败时返回一个汇总错误，由调用方记录日志，
//! 不会向上抛出异常。
//!
//! # 实现思路
//!
//! - 策略接口是同步的，调用方在 `spawn_blocking` 中执行整条链。
//! - `supports` 先做能力判断，跳过的策略不计入失败。

mod command;
mod data_url;
mod system;

pub use command::CommandClipboard;
pub use data_url::{DataUrlClipboard, build_data_url};
pub use system::SystemClipboard;

use crate::error::AppError;
use crate::image_handler::{ImageConfig, NormalizedImage};

/// 写入剪贴板的内容。
#[derive(Debug, Clone)]
pub enum ClipboardContent {
    Text(String),
    Image(NormalizedImage),
}

impl ClipboardContent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }
}

/// 一种剪贴板写入方式。
pub trait ClipboardStrategy: Send + Sync {
    /// 用于日志的策略名。
    fn name(&self) -> &'static str;

    /// 当前环境下能否写入该内容。
    fn supports(&self, content: &ClipboardContent) -> bool;

    fn write(&self, content: &ClipboardContent) -> Result<(), AppError>;
}

/// 按顺序尝试的剪贴板策略链。
pub struct ClipboardChain {
    strategies: Vec<Box<dyn ClipboardStrategy>>,
}

impl ClipboardChain {
    pub fn new(strategies: Vec<Box<dyn ClipboardStrategy>>) -> Self {
        Self { strategies }
    }

    /// 当前系统的默认策略链。
    pub fn system(config: &ImageConfig) -> Self {
        let mut strategies: Vec<Box<dyn ClipboardStrategy>> =
            vec![Box::new(SystemClipboard::new(config.retry))];

        if let Some(command) = CommandClipboard::detect() {
            log::info!("📋 检测到剪贴板命令：{}", command.program());
            strategies.push(Box::new(command));
        }

        strategies.push(Box::new(DataUrlClipboard::new(Box::new(
            SystemClipboard::new(config.retry),
        ))));

        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// 写入剪贴板，返回成功的策略名。
    pub fn write(&self, content: &ClipboardContent) -> Result<&'static str, AppError> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            if !strategy.supports(content) {
                log::debug!("⏭️ 剪贴板策略 {} 不支持 {}", strategy.name(), content.kind());
                continue;
            }

            match strategy.write(content) {
                Ok(()) => {
                    log::info!("📋 已复制到剪贴板 ({}, {})", strategy.name(), content.kind());
                    return Ok(strategy.name());
                }
                Err(err) => {
                    log::warn!("⚠️ 剪贴板策略 {} 写入失败：{}", strategy.name(), err);
                    failures.push(format!("{}: {}", strategy.name(), err));
                }
            }
        }

        if failures.is_empty() {
            return Err(AppError::Clipboard(format!(
                "当前环境不支持{}剪贴板写入",
                if matches!(content, ClipboardContent::Image(_)) { "图片" } else { "文本" }
            )));
        }

        Err(AppError::Clipboard(failures.join("; ")))
    }
}
