//! # 推送剪贴板客户端 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                推送服务 (WebSocket /stream)               │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↓ 文本帧 (JSON) / 二进制帧 (图片分块)
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↓            客户端 (Rust)                          │
//! │                                                          │
//! │  ┌─ push ─────── PushClient → 连接状态机 (actor)          │
//! │  │   ├─ transport     WsTransport (tokio-tungstenite)     │
//! │  │   ├─ codec         帧解码 → Payload                    │
//! │  │   └─ transfer      分块图片拼装                        │
//! │  │          ↓ DeliveryJob                                 │
//! │  ├─ delivery ─── 串行投递任务                             │
//! │  │   ├─ image_handler 任意图片 → PNG                      │
//! │  │   ├─ clipboard     策略链 (arboard → 命令 → Data URL)  │
//! │  │   └─ editor        草稿文件追加                        │
//! │  │                                                       │
//! │  ├─ status ───── 去重 / 限长的状态日志                    │
//! │  ├─ settings ─── JSON 设置文件                            │
//! │  └─ error ────── AppError (统一错误类型)                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`settings`] | 推送设置的加载、保存与派生（推送链接、重连策略） |
//! | [`status`] | 面向用户的状态日志：时间戳、严重级别、去重、订阅 |
//! | [`push`] | 长连接、断线重连、帧解码与分块拼装 |
//! | [`image_handler`] | 从字节 / Base64 加载图片并规范化为 PNG |
//! | [`clipboard`] | 按顺序尝试的剪贴板写入策略 |
//! | [`editor`] | 编辑器写入目标（草稿文件） |
//! | [`delivery`] | 把解码后的内容投递到剪贴板与编辑器 |

pub mod clipboard;
pub mod delivery;
pub mod editor;
pub mod error;
pub mod image_handler;
pub mod push;
pub mod settings;
pub mod status;
