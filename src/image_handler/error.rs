//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载图片链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配：
//! `Decode` / `InvalidFormat` 会触发“原始字节直通”退化，`ResourceLimit` 同理，
//! 只有加载阶段（Base64 本身无法解析）的错误才会让整次投递失败。

/// 图片处理统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// 稳定的错误码，便于日志检索。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::InvalidFormat(_) => "invalid_format",
            Self::ResourceLimit(_) => "resource_limit",
        }
    }
}
