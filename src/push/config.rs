//! 连接配置与重连策略。

use std::time::Duration;

use url::Url;

use crate::error::AppError;

/// 默认重连间隔（固定，不做指数退避）。
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);
/// 默认最大重连次数。
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// 一次连接的目标：推送服务地址 + 客户端 token。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectionConfig {
    pub endpoint_url: String,
    pub token: String,
}

impl ConnectionConfig {
    pub fn new(endpoint_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            token: token.into(),
        }
    }

    /// 配置键 `url|token`，用于判断两次启用是否指向同一目标。
    pub fn key(&self) -> String {
        format!("{}|{}", self.endpoint_url, self.token)
    }

    pub fn is_complete(&self) -> bool {
        !self.endpoint_url.trim().is_empty() && !self.token.trim().is_empty()
    }

    /// 推送流地址：`/stream` 替换原路径，`https`/`wss` 升级为 `wss`，其余为 `ws`。
    ///
    /// ```rust
    /// use push_clipboard::push::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::new("https://push.example.com/api/", "abc");
    /// let url = config.stream_url()?;
    /// assert_eq!(url.as_str(), "wss://push.example.com/stream?token=abc");
    /// # Ok::<(), push_clipboard::error::AppError>(())
    /// ```
    pub fn stream_url(&self) -> Result<Url, AppError> {
        let base = Url::parse(self.endpoint_url.trim().trim_end_matches('/'))
            .map_err(|e| AppError::Config(format!("webhook 地址格式错误: {}", e)))?;

        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(AppError::Config(format!(
                    "webhook 地址协议不受支持: {}",
                    other
                )));
            }
        };

        let mut url = base
            .join("/stream")
            .map_err(|e| AppError::Config(format!("webhook 地址格式错误: {}", e)))?;
        url.set_scheme(scheme)
            .map_err(|_| AppError::Config(format!("无法切换到 {} 协议", scheme)))?;

        // 绝对路径 join 会丢弃原查询串，这里只剩 token
        url.query_pairs_mut()
            .clear()
            .append_pair("token", self.token.trim());

        Ok(url)
    }
}

/// 固定间隔、有限次数的重连策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_url_and_token() {
        assert_eq!(ConnectionConfig::new("http://a", "t").key(), "http://a|t");
    }

    #[test]
    fn http_base_maps_to_ws_stream() {
        let url = ConnectionConfig::new("http://localhost:8000", "tok")
            .stream_url()
            .expect("stream url");
        assert_eq!(url.as_str(), "ws://localhost:8000/stream?token=tok");
    }

    #[test]
    fn stream_replaces_base_path() {
        let url = ConnectionConfig::new("https://host/deep/path/", "t")
            .stream_url()
            .expect("stream url");
        assert_eq!(url.as_str(), "wss://host/stream?token=t");
    }

    #[test]
    fn token_is_percent_encoded() {
        let url = ConnectionConfig::new("http://host", "a b&c")
            .stream_url()
            .expect("stream url");
        assert_eq!(url.query(), Some("token=a+b%26c"));
    }

    #[test]
    fn unsupported_scheme_is_config_error() {
        assert!(matches!(
            ConnectionConfig::new("ftp://host", "t").stream_url(),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("not a url", "t").stream_url(),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn completeness_requires_both_fields() {
        assert!(ConnectionConfig::new("http://a", "t").is_complete());
        assert!(!ConnectionConfig::new("http://a", " ").is_complete());
        assert!(!ConnectionConfig::new("", "t").is_complete());
    }
}
