//! # 推送帧解码
//!
//! ## 设计思路
//!
//! 推送通道上有两种帧：
//! - 文本帧：JSON 对象，携带文本消息或二进制传输的起止控制消息
//! - 二进制帧：原始图片分块，只有在传输打开期间才有意义
//!
//! `decode_frame` 按固定优先级把一帧归类为一个 `Payload`，
//! 无法归类的帧返回 `Decoded::Ignored`，JSON 解析失败返回 `ProtocolError`。
//! 解码本身不修改任何状态，传输槽由调用方持有。
//!
//! ## 实现思路
//!
//! - 字段一律按 `serde_json::Value` 宽松接收：推送端的 `size`、`transfer_id`
//!   既可能是数字也可能是字符串，类型不符不应导致整帧丢弃。
//! - 旧版内嵌 Base64 图片用预编译正则识别。

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// `binary_start` 未声明 `content_type` 时使用的类型。
pub const DEFAULT_TRANSFER_CONTENT_TYPE: &str = "image/jpeg";

/// 旧版纯 Base64 图片的最小长度。
const LEGACY_BASE64_MIN_LEN: usize = 100;

static BASE64_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("base64 pattern is valid"));

/// 传输层交付的一帧。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Bytes),
}

/// 解码后的推送内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    TextMessage {
        text: String,
    },
    LegacyImageMessage {
        base64: String,
    },
    BinaryStart {
        transfer_id: String,
        filename: String,
        content_type: String,
        size: u64,
    },
    BinaryChunk {
        bytes: Bytes,
    },
    BinaryEnd {
        transfer_id: String,
    },
}

/// 被丢弃的帧的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 没有打开的传输时收到二进制帧
    UnexpectedBinary,
    /// `binary_end` 的 id 与当前传输不一致（或没有打开的传输）
    StaleTransferEnd,
    /// 没有可识别内容的文本帧
    Unparsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Payload(Payload),
    Ignored(IgnoreReason),
}

/// 文本帧的 JSON 结构，所有字段可选。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PushRecord {
    #[allow(dead_code)]
    id: Option<Value>,
    #[allow(dead_code)]
    title: Option<Value>,
    message: Option<Value>,
    #[allow(dead_code)]
    priority: Option<Value>,
    #[allow(dead_code)]
    date: Option<Value>,
    #[serde(rename = "type")]
    kind: Option<Value>,
    data_type: Option<Value>,
    filename: Option<Value>,
    size: Option<Value>,
    content_type: Option<Value>,
    transfer_id: Option<Value>,
}

fn value_as_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_as_size(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn value_is(value: Option<&Value>, expected: &str) -> bool {
    matches!(value, Some(Value::String(s)) if s == expected)
}

/// 判断文本是否为旧版内嵌图片：Data URL，或足够长的纯 Base64。
pub fn is_base64_image_string(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.starts_with("data:image/") && trimmed.contains(";base64,") {
        return true;
    }
    if trimmed.chars().count() < LEGACY_BASE64_MIN_LEN {
        return false;
    }

    let cleaned: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_BODY.is_match(&cleaned)
}

/// 解码一帧。
///
/// `open_transfer_id` 为当前打开的传输 id，决定二进制帧与 `binary_end` 的归属。
pub fn decode_frame(
    frame: InboundFrame,
    open_transfer_id: Option<&str>,
) -> Result<Decoded, ProtocolError> {
    let text = match frame {
        InboundFrame::Binary(bytes) => {
            return Ok(if open_transfer_id.is_some() {
                Decoded::Payload(Payload::BinaryChunk { bytes })
            } else {
                Decoded::Ignored(IgnoreReason::UnexpectedBinary)
            });
        }
        InboundFrame::Text(text) => text,
    };

    let record: PushRecord = serde_json::from_str(&text)?;
    let transfer_id = value_as_text(record.transfer_id.as_ref()).unwrap_or_default();

    if value_is(record.kind.as_ref(), "binary_start") && value_is(record.data_type.as_ref(), "image")
    {
        let content_type = value_as_text(record.content_type.as_ref())
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TRANSFER_CONTENT_TYPE.to_string());

        return Ok(Decoded::Payload(Payload::BinaryStart {
            transfer_id,
            filename: value_as_text(record.filename.as_ref()).unwrap_or_default(),
            content_type,
            size: value_as_size(record.size.as_ref()),
        }));
    }

    if value_is(record.kind.as_ref(), "binary_end") {
        return Ok(if open_transfer_id == Some(transfer_id.as_str()) {
            Decoded::Payload(Payload::BinaryEnd { transfer_id })
        } else {
            Decoded::Ignored(IgnoreReason::StaleTransferEnd)
        });
    }

    match value_as_text(record.message.as_ref()) {
        Some(message) if is_base64_image_string(&message) => {
            Ok(Decoded::Payload(Payload::LegacyImageMessage { base64: message }))
        }
        Some(message) if !message.is_empty() => {
            Ok(Decoded::Payload(Payload::TextMessage { text: message }))
        }
        _ => Ok(Decoded::Ignored(IgnoreReason::Unparsed)),
    }
}
