//! 状态日志模块
//!
//! # 设计思路
//!
//! 推送客户端的所有“给用户看”的事件（连接成功、重连次数、投递结果……）
//! 都写入同一个 `StatusLog`：
//! - 每条记录带本地时间戳（`HH:MM:SS`）与严重级别
//! - 与上一条消息文本完全相同的记录直接丢弃（防止刷屏）
//! - 只保留最新的 `capacity` 条，最新的在最前
//! - 同步镜像到 `log` 门面，订阅者通过 `broadcast` 实时收到新记录
//!
//! # 实现思路
//!
//! - 内部状态使用 `Arc<Mutex<..>>`，`StatusLog` 可廉价克隆并在任务间共享。
//! - 锁中毒时降级为仅输出 `log`，不影响推送主流程。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;

/// 默认保留的日志条数。
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10;

const SUBSCRIBER_BUFFER: usize = 64;

/// 日志严重级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Success,
    Error,
}

/// 一条状态日志。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// 本地时间 `HH:MM:SS`
    pub timestamp: String,
    pub message: String,
    pub severity: Severity,
}

struct Inner {
    entries: VecDeque<LogEntry>,
    last_message: Option<String>,
    capacity: usize,
}

/// 去重、限长、可订阅的状态日志。
#[derive(Clone)]
pub struct StatusLog {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<LogEntry>,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_ENTRIES)
    }
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity.max(1)),
                last_message: None,
                capacity: capacity.max(1),
            })),
            events,
        }
    }

    /// 追加一条记录。
    ///
    /// 返回 `false` 表示与上一条重复而被忽略。
    pub fn add(&self, message: impl Into<String>, severity: Severity) -> bool {
        let message = message.into();

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => {
                log::error!("状态日志锁已中毒，仅输出到日志：{}", message);
                return false;
            }
        };

        if inner.last_message.as_deref() == Some(message.as_str()) {
            log::debug!("🔁 重复日志，已忽略: {}", message);
            return false;
        }
        inner.last_message = Some(message.clone());

        match severity {
            Severity::Info | Severity::Success => log::info!("[push] {}", message),
            Severity::Warning => log::warn!("[push] {}", message),
            Severity::Error => log::error!("[push] {}", message),
        }

        let entry = LogEntry {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            message,
            severity,
        };

        inner.entries.push_front(entry.clone());
        while inner.entries.len() > inner.capacity {
            inner.entries.pop_back();
        }
        drop(inner);

        // 没有订阅者时发送失败是正常情况
        let _ = self.events.send(entry);
        true
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.add(message, Severity::Info)
    }

    pub fn success(&self, message: impl Into<String>) -> bool {
        self.add(message, Severity::Success)
    }

    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.add(message, Severity::Warning)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.add(message, Severity::Error)
    }

    /// 当前保留的记录，最新的在最前。
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner
            .lock()
            .map(|inner| inner.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 订阅新记录。
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.events.subscribe()
    }

    /// 调整容量，超出部分立即丢弃最旧记录。
    pub fn set_capacity(&self, capacity: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.capacity = capacity.max(1);
            while inner.entries.len() > inner.capacity {
                inner.entries.pop_back();
            }
        }
    }
}
