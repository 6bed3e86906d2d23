//! # 图片规范化模块（image_handler）
//!
//! ## 设计思路
//!
//! 推送端发来的图片可能是任意格式（JPEG / WebP / GIF / PNG ...），也可能是
//! 旧版消息里内嵌的 Base64 / Data URL。剪贴板对 PNG 的兼容性最好，因此本模块
//! 负责把“任意图片字节”统一转换为 PNG，再交给投递流水线写入剪贴板。
//!
//! 按职责拆分为多个子模块：
//!
//! - `handler`：`ImageNormalizer`，编排整条处理链并持有可切换配置
//! - `loader`：Base64 / Data URL / 原始字节加载与体积校验
//! - `pipeline`：签名识别、解码、像素限制、降采样、PNG 编码
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 实现思路
//!
//! ```text
//! ImageSource (Bytes | Base64)
//!    ↓
//! loader.rs（加载 + 体积校验）
//!    ↓
//! pipeline.rs（签名 → 解码 → 降采样 → PNG）
//!    ↓                      ↘ 失败
//! NormalizedImage(PNG)      NormalizedImage(原始字节直通)
//! ```
//!
//! 解码或编码失败时不丢弃数据：退化为原始字节直通，由剪贴板策略链继续尝试。

mod config;
mod error;
mod handler;
mod loader;
mod pipeline;
mod source;

pub use config::{ClipboardRetry, ImageConfig, ImageLimits, ImagePerformanceProfile, ResizePolicy};
pub use error::ImageError;
pub use handler::ImageNormalizer;
pub use source::{ImageSource, NormalizedImage, RgbaRaster};

/// 剪贴板统一使用的规范格式。
pub const CANONICAL_IMAGE_MIME: &str = "image/png";
