//! 推送设置模块
//!
//! # 设计思路
//!
//! 设置以 JSON 文件持久化，所有字段都带默认值：旧版本文件缺字段时仍能加载。
//! 文件不存在视为“全部默认”，解析失败则返回 `AppError::Settings`，
//! 由调用方决定是否继续使用上一份有效设置。
//!
//! # 实现思路
//!
//! - `#[serde(default)]` + `Default` 提供字段级默认值。
//! - `PartialEq` 用于热加载时判断设置是否真的发生变化。
//! - `post_token` / `push_page_url` 派生推送端使用的分享链接。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use crate::editor::EditorFormat;
use crate::error::AppError;
use crate::image_handler::ImagePerformanceProfile;
use crate::push::{ConnectionConfig, ReconnectPolicy};
use crate::status::DEFAULT_MAX_LOG_ENTRIES;

/// 推送客户端设置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    pub webhook_url: String,
    pub webhook_token: String,
    pub enabled: bool,
    pub editor_draft_path: Option<PathBuf>,
    pub editor_format: EditorFormat,
    pub image_profile: String,
    pub max_log_entries: usize,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for PushSettings {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            webhook_url: String::new(),
            webhook_token: String::new(),
            enabled: true,
            editor_draft_path: None,
            editor_format: EditorFormat::default(),
            image_profile: ImagePerformanceProfile::default().as_str().to_string(),
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            reconnect_interval_ms: policy.interval.as_millis() as u64,
            max_reconnect_attempts: policy.max_attempts,
        }
    }
}

impl PushSettings {
    /// 从文件加载设置；文件不存在时返回默认值。
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Settings(format!("解析设置文件 '{}' 失败: {}", path.display(), e))
        })
    }

    /// 写回设置文件（自动创建父目录）。
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.webhook_url.trim(), self.webhook_token.trim())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: Duration::from_millis(self.reconnect_interval_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// 解析图片档位，未知值回退到默认档位（不降采样）。
    pub fn image_profile(&self) -> ImagePerformanceProfile {
        self.image_profile.parse().unwrap_or_else(|err| {
            log::warn!("⚠️ {}，使用 quality", err);
            ImagePerformanceProfile::default()
        })
    }

    /// 推送端使用的 token：客户端 token 的标准 Base64。
    pub fn post_token(&self) -> String {
        general_purpose::STANDARD.encode(self.webhook_token.trim())
    }

    /// 推送页面地址：`<webhook_url>/message?token=<post_token>`。
    pub fn push_page_url(&self) -> Result<String, AppError> {
        let base = self.webhook_url.trim().trim_end_matches('/');
        if base.is_empty() || self.webhook_token.trim().is_empty() {
            return Err(AppError::Config("未配置 webhookUrl 或 webhookToken".to_string()));
        }

        let mut url = url::Url::parse(&format!("{}/message", base))
            .map_err(|e| AppError::Config(format!("webhookUrl 格式错误: {}", e)))?;
        url.query_pairs_mut().append_pair("token", &self.post_token());
        Ok(url.to_string())
    }
}
