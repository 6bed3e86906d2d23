//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! 推送链路中的每一步（配置、连接、协议、投递）都只在本步骤内处理错误：
//! 记录日志后丢弃，绝不向上冒泡成连接状态变化（传输层错误除外）。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError`、`std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于写入状态日志或外部 UI。

use serde::Serialize;

use crate::image_handler::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 缺少 URL / token，或 URL 无法构造为推送地址
    #[error("配置错误: {0}")]
    Config(String),

    /// WebSocket 建连、读写或关闭失败
    #[error("连接错误: {0}")]
    Connection(String),

    /// 推送帧无法解析
    #[error("协议错误: {0}")]
    Protocol(#[from] ProtocolError),

    /// 剪贴板读写操作失败
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),

    /// 编辑器草稿写入失败
    #[error("编辑器写入失败: {0}")]
    Editor(String),

    /// 图片处理流水线错误（加载 / 解码 / 编码）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件读取或解析失败
    #[error("设置错误: {0}")]
    Settings(String),
}

/// 推送帧协议错误。
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 文本帧不是合法的 JSON 对象
    #[error("消息解析失败: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
