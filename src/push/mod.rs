//! # 推送客户端（push）
//!
//! 与推送服务保持一条长连接，解码推送帧并把内容交给投递流水线。
//!
//! - `config`：连接目标与重连策略
//! - `codec`：文本 / 二进制帧解码
//! - `transfer`：分块图片拼装
//! - `transport`：传输层抽象与 WebSocket 实现
//! - `connection`：连接状态机与 `PushClient` 句柄

mod codec;
mod config;
mod connection;
mod transfer;
mod transport;

pub use codec::{
    DEFAULT_TRANSFER_CONTENT_TYPE, Decoded, IgnoreReason, InboundFrame, Payload, decode_frame,
    is_base64_image_string,
};
pub use config::{
    ConnectionConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL, ReconnectPolicy,
};
pub use connection::{ClientSnapshot, ConnectionState, PushClient};
pub use transfer::{BinaryTransfer, ChunkOutcome, CompletedTransfer, TransferAssembler};
pub use transport::{
    CONNECT_TIMEOUT, SocketEvent, SocketEvents, SocketHandle, Transport, WsTransport,
};
