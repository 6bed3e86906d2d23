//! # 连接管理器
//!
//! ## 设计思路
//!
//! 推送连接的全部可变状态（配置、启用标志、连接句柄、重连计时器、
//! 重连计数、传输槽）只属于一个后台任务（actor），外部通过 `PushClient`
//! 发送命令。actor 在一个 `tokio::select!` 循环里依次处理：
//!
//! - 外部命令：启用 / 停用 / 调整重连策略 / 退出
//! - 连接事件：握手成功、入站帧、关闭、错误
//! - 重连计时器到期
//!
//! 所有事件串行处理，不存在两个事件同时修改状态的情况。
//!
//! ## 状态机
//!
//! ```text
//! Disabled ──enable──▶ Connecting ──握手成功──▶ Open
//!     ▲                    │                      │
//!     │ disable            └──────错误 / 关闭─────┤
//!     │                                           ▼
//!     └──────────── (任意状态)       Reconnecting(n/max) ──计时器──▶ Connecting
//!                                                 │
//!                                     次数用尽 ───▶ Failed
//! ```
//!
//! ## 实现思路
//!
//! - 每条连接分配递增编号，已替换连接的迟到事件直接丢弃。
//! - 计时器只是一个截止时间，到期时用“当前”配置重连；替换配置会清掉它。
//! - 解码后的内容只入队给投递任务，actor 从不等待投递完成，
//!   传输槽因此只在 actor 内同步修改。

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use super::codec::{Decoded, IgnoreReason, InboundFrame, Payload, decode_frame};
use super::config::{ConnectionConfig, ReconnectPolicy};
use super::transfer::{ChunkOutcome, TransferAssembler};
use super::transport::{SocketEvent, SocketEvents, SocketHandle, Transport};
use crate::delivery::{DeliveryJob, DeliveryQueue};
use crate::error::AppError;
use crate::settings::PushSettings;
use crate::status::StatusLog;

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// 连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disabled,
    Connecting,
    Open,
    Reconnecting { attempt: u32, max: u32 },
    Failed,
}

/// 对外可见的连接快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub state: ConnectionState,
    pub has_socket: bool,
    pub has_pending_timer: bool,
    pub attempts: u32,
    pub transfer_open: bool,
}

impl Default for ClientSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disabled,
            has_socket: false,
            has_pending_timer: false,
            attempts: 0,
            transfer_open: false,
        }
    }
}

enum Command {
    Enable {
        config: ConnectionConfig,
        ack: oneshot::Sender<()>,
    },
    Disable {
        ack: oneshot::Sender<()>,
    },
    SetPolicy(ReconnectPolicy),
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

struct ActiveSocket {
    conn_id: u64,
    handle: SocketHandle,
}

struct ConnectionManager {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    config: Option<ConnectionConfig>,
    enabled: bool,
    state: ConnectionState,
    attempts: u32,
    socket: Option<ActiveSocket>,
    reconnect_at: Option<Instant>,
    next_conn_id: u64,
    assembler: TransferAssembler,
    delivery: DeliveryQueue,
    status: StatusLog,
    snapshot: watch::Sender<ClientSnapshot>,
    events_tx: mpsc::Sender<(u64, SocketEvent)>,
}

impl ConnectionManager {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<(u64, SocketEvent)>,
    ) {
        loop {
            let timer = self.reconnect_at;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Enable { config, ack }) => {
                        self.enable(config);
                        let _ = ack.send(());
                    }
                    Some(Command::Disable { ack }) => {
                        self.disable();
                        let _ = ack.send(());
                    }
                    Some(Command::SetPolicy(policy)) => {
                        self.policy = policy;
                    }
                    Some(Command::Shutdown { ack }) => {
                        self.disable();
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.disable();
                        break;
                    }
                },
                Some((conn_id, event)) = events.recv() => {
                    self.on_socket_event(conn_id, event);
                }
                _ = async move {
                    match timer {
                        Some(deadline) => sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.on_reconnect_timer();
                }
            }
        }
        log::info!("🛑 推送连接管理器已退出");
    }

    fn enable(&mut self, config: ConnectionConfig) {
        if !config.is_complete() {
            self.teardown();
            self.enabled = false;
            self.config = None;
            self.attempts = 0;
            self.state = ConnectionState::Disabled;
            self.status
                .warning("未配置 webhook webhookUrl 或 webhookToken，未启动推送监听");
            self.publish();
            return;
        }

        let same_target = self.config.as_ref().map(|c| c.key()) == Some(config.key());
        let live = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) && self.socket.is_some();
        if self.enabled && same_target && live {
            log::debug!("⏭️ 配置未变化且连接存活，忽略重复启用");
            return;
        }

        self.enabled = true;
        self.config = Some(config);
        self.attempts = 0;
        self.connect();
    }

    fn disable(&mut self) {
        self.teardown();
        self.enabled = false;
        self.config = None;
        self.attempts = 0;
        self.state = ConnectionState::Disabled;
        self.publish();
    }

    /// 取消计时器、关闭连接、丢弃未完成的传输。
    fn teardown(&mut self) {
        self.reconnect_at = None;
        if let Some(socket) = self.socket.take() {
            log::debug!("[push#{}] 关闭连接", socket.conn_id);
            socket.handle.close();
        }
        if let Some(abandoned) = self.assembler.clear() {
            log::info!(
                "🗑️ 丢弃未完成的传输 {}（{}，已接收 {} bytes）",
                abandoned.transfer_id,
                abandoned.filename,
                abandoned.received_size
            );
        }
    }

    /// 使用当前配置建立新连接。
    fn connect(&mut self) {
        self.teardown();

        let Some(config) = self.config.clone() else {
            self.state = ConnectionState::Disabled;
            self.publish();
            return;
        };

        let target = match config.stream_url() {
            Ok(url) => url,
            Err(err) => {
                self.enabled = false;
                self.config = None;
                self.state = ConnectionState::Disabled;
                self.status.warning(err.to_string());
                self.publish();
                return;
            }
        };

        self.next_conn_id += 1;
        let conn_id = self.next_conn_id;
        let events = SocketEvents::new(conn_id, self.events_tx.clone());
        let handle = self.transport.open(target, events);

        self.socket = Some(ActiveSocket { conn_id, handle });
        self.state = ConnectionState::Connecting;
        self.publish();
    }

    fn on_socket_event(&mut self, conn_id: u64, event: SocketEvent) {
        let current = self.socket.as_ref().map(|s| s.conn_id);
        if current != Some(conn_id) {
            log::debug!("[push#{}] 忽略过期连接事件: {:?}", conn_id, event);
            return;
        }

        match event {
            SocketEvent::Opened => {
                // 重连计数只在启用 / 停用时清零，握手成功不算恢复
                self.state = ConnectionState::Open;
                log::info!("✅ [push#{}] WebSocket 连接成功", conn_id);
                self.status.success("webhook 推送监听已启动");
                self.publish();
            }
            SocketEvent::Frame(frame) => self.on_frame(frame),
            SocketEvent::Closed { code, reason } => {
                log::info!(
                    "[push#{}] 连接关闭 code={:?} reason={}",
                    conn_id,
                    code,
                    reason
                );
                self.on_connection_lost("webhook WebSocket 连接关闭");
            }
            SocketEvent::Failed(error) => {
                log::error!("[push#{}] WebSocket 错误: {}", conn_id, error);
                self.on_connection_lost("webhook WebSocket 发生错误，将尝试重连");
            }
        }
    }

    fn on_connection_lost(&mut self, message: &str) {
        self.teardown();
        self.status.warning(message);

        if !self.enabled {
            self.state = ConnectionState::Disabled;
            self.publish();
            return;
        }

        let max = self.policy.max_attempts;
        if self.attempts < max {
            let attempt = self.attempts + 1;
            self.state = ConnectionState::Reconnecting { attempt, max };
            self.reconnect_at = Some(Instant::now() + self.policy.interval);
            self.status
                .warning(format!("WebSocket 重连尝试 {}/{}", attempt, max));
        } else {
            self.state = ConnectionState::Failed;
            self.status.error("WebSocket 重连次数已达上限，请手动重新连接");
        }
        self.publish();
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_at = None;
        if !self.enabled {
            return;
        }
        self.attempts += 1;
        log::info!(
            "🔄 第 {}/{} 次重连",
            self.attempts,
            self.policy.max_attempts
        );
        self.connect();
    }

    fn on_frame(&mut self, frame: InboundFrame) {
        let decoded = match decode_frame(frame, self.assembler.open_id()) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("⚠️ 消息解析失败: {}", err);
                return;
            }
        };

        let payload = match decoded {
            Decoded::Payload(payload) => payload,
            Decoded::Ignored(IgnoreReason::UnexpectedBinary) => {
                log::warn!("⚠️ 收到意外的二进制数据，没有活跃的传输任务");
                return;
            }
            Decoded::Ignored(IgnoreReason::StaleTransferEnd) => {
                log::debug!("⏭️ 忽略与当前传输不匹配的 binary_end");
                return;
            }
            Decoded::Ignored(IgnoreReason::Unparsed) => {
                log::debug!("⏭️ 忽略无法识别的消息");
                return;
            }
        };

        match payload {
            Payload::TextMessage { text } => self.submit(DeliveryJob::Text(text)),
            Payload::LegacyImageMessage { base64 } => {
                self.submit(DeliveryJob::LegacyImage(base64))
            }
            Payload::BinaryStart {
                transfer_id,
                filename,
                content_type,
                size,
            } => {
                if let Some(abandoned) =
                    self.assembler
                        .on_start(transfer_id, filename, content_type, size)
                {
                    self.status.warning(format!(
                        "webhook消息：图片传输被新的传输替换，已丢弃 - {}（已接收 {}/{} bytes）",
                        abandoned.filename, abandoned.received_size, abandoned.declared_size
                    ));
                }
                self.publish();
            }
            Payload::BinaryChunk { bytes } => match self.assembler.on_chunk(bytes) {
                ChunkOutcome::Appended => {}
                ChunkOutcome::NoTransfer => {
                    log::warn!("⚠️ 收到意外的二进制数据，没有活跃的传输任务");
                }
                ChunkOutcome::Overflow(dropped) => {
                    self.status.warning(format!(
                        "webhook消息：图片超过大小上限，已丢弃 - {}（已接收 {} bytes）",
                        dropped.filename, dropped.received_size
                    ));
                    self.publish();
                }
            },
            Payload::BinaryEnd { transfer_id } => {
                if let Some(completed) = self.assembler.on_end(&transfer_id) {
                    self.submit(DeliveryJob::Transfer(completed));
                }
                self.publish();
            }
        }
    }

    fn submit(&self, job: DeliveryJob) {
        if !self.delivery.submit(job) {
            log::error!("❌ 投递任务已退出，消息被丢弃");
        }
    }

    fn publish(&self) {
        let snapshot = ClientSnapshot {
            state: self.state,
            has_socket: self.socket.is_some(),
            has_pending_timer: self.reconnect_at.is_some(),
            attempts: self.attempts,
            transfer_open: self.assembler.open_id().is_some(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// 推送客户端句柄，可克隆并在任务间共享。
#[derive(Clone)]
pub struct PushClient {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ClientSnapshot>,
    status: StatusLog,
}

impl PushClient {
    /// 启动连接管理器任务。客户端初始为 `Disabled`，需调用 `enable`。
    pub fn spawn(
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        status: StatusLog,
        delivery: DeliveryQueue,
    ) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(ClientSnapshot::default());

        let manager = ConnectionManager {
            transport,
            policy,
            config: None,
            enabled: false,
            state: ConnectionState::Disabled,
            attempts: 0,
            socket: None,
            reconnect_at: None,
            next_conn_id: 0,
            assembler: TransferAssembler::new(),
            delivery,
            status: status.clone(),
            snapshot: snapshot_tx,
            events_tx,
        };
        let task = tokio::spawn(manager.run(command_rx, events_rx));

        (
            Self {
                commands: command_tx,
                snapshot: snapshot_rx,
                status,
            },
            task,
        )
    }

    async fn request(&self, build: impl FnOnce(oneshot::Sender<()>) -> Command) -> Result<(), AppError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(build(ack_tx))
            .await
            .map_err(|_| AppError::Connection("推送连接管理器已退出".to_string()))?;
        ack_rx
            .await
            .map_err(|_| AppError::Connection("推送连接管理器已退出".to_string()))
    }

    /// 启用推送监听；与当前连接相同的配置不会重复建连。
    pub async fn enable(
        &self,
        url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<(), AppError> {
        let config = ConnectionConfig::new(url, token);
        self.request(|ack| Command::Enable { config, ack }).await
    }

    /// 停用：取消计时器，正常关闭连接，丢弃未完成的传输。
    pub async fn disable(&self) -> Result<(), AppError> {
        self.request(|ack| Command::Disable { ack }).await
    }

    /// 应用一份设置：更新重连策略，并按 `enabled` 启用或停用。
    pub async fn apply_settings(&self, settings: &PushSettings) -> Result<(), AppError> {
        self.commands
            .send(Command::SetPolicy(settings.reconnect_policy()))
            .await
            .map_err(|_| AppError::Connection("推送连接管理器已退出".to_string()))?;

        if settings.enabled {
            let config = settings.connection_config();
            self.enable(config.endpoint_url, config.token).await
        } else {
            self.disable().await
        }
    }

    /// 停用并结束管理器任务。
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.request(|ack| Command::Shutdown { ack }).await
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> &StatusLog {
        &self.status
    }
}
