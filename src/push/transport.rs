//! # 传输层
//!
//! ## 设计思路
//!
//! 连接管理器不直接依赖 WebSocket 库，而是通过 `Transport` 打开一条连接：
//! - 传输层把握手结果、入站帧、关闭与错误通过 `SocketEvents` 回报
//! - 管理器持有 `SocketHandle`，需要主动关闭时通过它发出关闭请求
//!
//! 每条连接的事件都带有连接编号，管理器据此丢弃已被替换的旧连接的迟到事件。
//! 测试中可以用脚本化的传输替代真实网络。
//!
//! ## 实现思路
//!
//! `WsTransport` 基于 `tokio-tungstenite`：每条连接一个任务，
//! 握手带超时，读写拆分后用 `tokio::select!` 同时等待入站消息与关闭请求，
//! 主动关闭时发送 1000（Normal）关闭帧。

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use super::codec::InboundFrame;

/// 握手超时。
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 连接回报给管理器的事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Frame(InboundFrame),
    Closed { code: Option<u16>, reason: String },
    Failed(String),
}

/// 某一条连接的事件发送端。
#[derive(Debug, Clone)]
pub struct SocketEvents {
    conn_id: u64,
    tx: mpsc::Sender<(u64, SocketEvent)>,
}

impl SocketEvents {
    pub(crate) fn new(conn_id: u64, tx: mpsc::Sender<(u64, SocketEvent)>) -> Self {
        Self { conn_id, tx }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// 发送事件；返回 `false` 表示管理器已退出。
    pub async fn send(&self, event: SocketEvent) -> bool {
        self.tx.send((self.conn_id, event)).await.is_ok()
    }

    pub async fn opened(&self) -> bool {
        self.send(SocketEvent::Opened).await
    }

    pub async fn frame(&self, frame: InboundFrame) -> bool {
        self.send(SocketEvent::Frame(frame)).await
    }

    pub async fn closed(&self, code: Option<u16>, reason: impl Into<String>) -> bool {
        self.send(SocketEvent::Closed {
            code,
            reason: reason.into(),
        })
        .await
    }

    pub async fn failed(&self, error: impl Into<String>) -> bool {
        self.send(SocketEvent::Failed(error.into())).await
    }
}

/// 管理器持有的连接句柄。
#[derive(Debug)]
pub struct SocketHandle {
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SocketHandle {
    pub fn new(close_tx: oneshot::Sender<()>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            close_tx: Some(close_tx),
            task,
        }
    }

    /// 请求以正常关闭码关闭连接，不等待对端确认。
    pub fn close(mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        // 连接任务自行发送关闭帧后退出
        self.task.take();
    }
}

/// 打开一条推送连接。
pub trait Transport: Send + Sync + 'static {
    fn open(&self, target: Url, events: SocketEvents) -> SocketHandle;
}

/// `tokio-tungstenite` WebSocket 传输。
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Transport for WsTransport {
    fn open(&self, target: Url, events: SocketEvents) -> SocketHandle {
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run_socket(target, events, close_rx, self.connect_timeout));
        SocketHandle::new(close_tx, Some(task))
    }
}

async fn run_socket(
    target: Url,
    events: SocketEvents,
    mut close_rx: oneshot::Receiver<()>,
    connect_timeout: Duration,
) {
    log::info!("🔌 [push#{}] 尝试连接: {}", events.conn_id(), redact_token(&target));

    let connected = tokio::select! {
        _ = &mut close_rx => {
            log::debug!("[push#{}] 握手完成前已取消", events.conn_id());
            return;
        }
        result = timeout(connect_timeout, connect_async(target.as_str())) => result,
    };

    let stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            events.failed(format!("连接失败: {}", e)).await;
            return;
        }
        Err(_) => {
            events
                .failed(format!("连接超时（{}s）", connect_timeout.as_secs()))
                .await;
            return;
        }
    };

    if !events.opened().await {
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: String::from("手动关闭").into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    log::debug!("[push#{}] 发送关闭帧失败: {}", events.conn_id(), e);
                }
                log::info!("🔌 [push#{}] 连接已主动关闭", events.conn_id());
                return;
            }
            message = read.next() => {
                let delivered = match message {
                    Some(Ok(Message::Text(text))) => {
                        events.frame(InboundFrame::Text(text.to_string())).await
                    }
                    Some(Ok(Message::Binary(data))) => {
                        events.frame(InboundFrame::Binary(data)).await
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        events.closed(code, reason).await;
                        return;
                    }
                    // ping/pong 由 tungstenite 自动处理
                    Some(Ok(_)) => true,
                    Some(Err(e)) => {
                        events.failed(format!("连接错误: {}", e)).await;
                        return;
                    }
                    None => {
                        events.closed(None, "").await;
                        return;
                    }
                };

                if !delivered {
                    return;
                }
            }
        }
    }
}

/// 日志中隐藏 token。
fn redact_token(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(Some("token=***"));
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_hidden_in_logs() {
        let url = Url::parse("wss://host/stream?token=secret").expect("url");
        assert_eq!(redact_token(&url), "wss://host/stream?token=***");
    }

    #[tokio::test]
    async fn events_carry_connection_id() {
        let (tx, mut rx) = mpsc::channel(4);
        let events = SocketEvents::new(7, tx);

        assert!(events.opened().await);
        assert!(events.closed(Some(1000), "bye").await);

        assert_eq!(rx.recv().await, Some((7, SocketEvent::Opened)));
        assert_eq!(
            rx.recv().await,
            Some((
                7,
                SocketEvent::Closed {
                    code: Some(1000),
                    reason: "bye".to_string()
                }
            ))
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let (tx, mut rx) = mpsc::channel(4);
        let transport = WsTransport::default();
        let url = Url::parse(&format!("ws://{}/stream?token=t", addr)).expect("url");
        let _handle = transport.open(url, SocketEvents::new(1, tx));

        match rx.recv().await {
            Some((1, SocketEvent::Failed(message))) => assert!(message.contains("连接")),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
