//! # 系统剪贴板策略
//!
//! ## 设计思路
//!
//! 通过 `arboard` 直接写入操作系统剪贴板，是策略链的首选。
//! 其他程序同时监听剪贴板时，打开剪贴板可能短暂失败，因此写入带有限重试：
//! 指数退避 + 抖动，并受总预算约束。
//!
//! ## 实现思路
//!
//! - 图片必须带解码后的 RGBA 像素（`NormalizedImage::raster`），否则交给下一个策略。
//! - `arboard::Clipboard` 实例长期持有：Linux 上实例析构后剪贴板内容会随之消失。
//! - `Backoff` 负责给出每次重试前的等待时间，预算不足时返回 `None` 终止重试。

use std::borrow::Cow;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::{ClipboardContent, ClipboardStrategy};
use crate::error::AppError;
use crate::image_handler::ClipboardRetry;

/// 单次写入失败。
#[derive(Debug)]
enum WriteFailure {
    /// 剪贴板被占用或暂时不可用，值得重试。
    Retryable(String),
    /// 平台不支持或数据无法转换，重试无意义。
    Permanent(String),
}

impl WriteFailure {
    fn from_arboard(operation: &str, err: arboard::Error) -> Self {
        let message = format!("{}失败：{}", operation, err);
        match err {
            arboard::Error::ClipboardNotSupported | arboard::Error::ConversionFailure => {
                Self::Permanent(message)
            }
            _ => Self::Retryable(message),
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Retryable(message) | Self::Permanent(message) => message,
        }
    }
}

static JITTER_STATE: AtomicU64 = AtomicU64::new(0);

/// xorshift 抖动源，首次使用时用时间与进程号播种。
fn next_jitter() -> u64 {
    let mut current = JITTER_STATE.load(Ordering::Relaxed);
    loop {
        let mut next = if current == 0 {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            (nanos ^ (u64::from(std::process::id()) << 32) ^ 0x9E37_79B9_7F4A_7C15).max(1)
        } else {
            current
        };
        next ^= next << 13;
        next ^= next >> 7;
        next ^= next << 17;

        match JITTER_STATE.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => current = observed,
        }
    }
}

/// 退避计划：第 n 次重试等待 `base * 2^(n-1)`，封顶 `max_delay`，再加至多三分之一的抖动。
struct Backoff {
    retry: ClipboardRetry,
    started: Instant,
    attempt: u32,
}

impl Backoff {
    fn new(retry: ClipboardRetry) -> Self {
        Self {
            retry,
            started: Instant::now(),
            attempt: 0,
        }
    }

    fn delay_for(retry: &ClipboardRetry, attempt: u32, jitter: u64) -> Duration {
        let base = retry.base_delay.max(Duration::from_millis(1));
        let exp = base.saturating_mul(1 << attempt.saturating_sub(1).min(8));
        let capped = exp.min(retry.max_delay.max(base));
        let bound = (capped.as_millis() as u64 / 3).max(1);
        capped + Duration::from_millis(jitter % (bound + 1))
    }

    /// 下一次重试前的等待时间；次数或预算用尽时返回 `None`。
    fn next_wait(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt > self.retry.retries {
            return None;
        }

        let wait = Self::delay_for(&self.retry, self.attempt, next_jitter());
        let elapsed = self.started.elapsed();
        if elapsed + wait > self.retry.max_total {
            log::warn!(
                "⏱️ 放弃第 {} 次重试：已用 {}ms，再等 {}ms 会超过预算 {}ms",
                self.attempt,
                elapsed.as_millis(),
                wait.as_millis(),
                self.retry.max_total.as_millis()
            );
            return None;
        }
        Some(wait)
    }
}

/// `arboard` 原生剪贴板。
pub struct SystemClipboard {
    retry: ClipboardRetry,
    clipboard: Mutex<Option<arboard::Clipboard>>,
}

impl SystemClipboard {
    pub fn new(retry: ClipboardRetry) -> Self {
        Self {
            retry,
            clipboard: Mutex::new(None),
        }
    }

    /// 单次写入；剪贴板实例按需创建并复用。
    fn try_write(&self, content: &ClipboardContent) -> Result<(), WriteFailure> {
        let mut slot = self
            .clipboard
            .lock()
            .map_err(|_| WriteFailure::Permanent("剪贴板锁已中毒".to_string()))?;

        if slot.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|e| WriteFailure::from_arboard("打开剪贴板", e))?;
            *slot = Some(clipboard);
        }
        let Some(clipboard) = slot.as_mut() else {
            return Err(WriteFailure::Permanent("剪贴板实例不可用".to_string()));
        };

        let result = match content {
            ClipboardContent::Text(text) => clipboard.set_text(text.as_str()),
            ClipboardContent::Image(image) => {
                let Some(raster) = image.raster.as_ref() else {
                    return Err(WriteFailure::Permanent("图片缺少像素数据".to_string()));
                };
                clipboard.set_image(arboard::ImageData {
                    width: raster.width,
                    height: raster.height,
                    bytes: Cow::Borrowed(&raster.bytes),
                })
            }
        };

        result.map_err(|e| {
            // 实例可能已失效，下次重新创建
            *slot = None;
            WriteFailure::from_arboard("写入剪贴板", e)
        })
    }
}

impl ClipboardStrategy for SystemClipboard {
    fn name(&self) -> &'static str {
        "system"
    }

    fn supports(&self, content: &ClipboardContent) -> bool {
        match content {
            ClipboardContent::Text(_) => true,
            ClipboardContent::Image(image) => image.raster.is_some(),
        }
    }

    /// 在当前线程同步写入，失败时按 `Backoff` 睡眠重试。
    fn write(&self, content: &ClipboardContent) -> Result<(), AppError> {
        let mut backoff = Backoff::new(self.retry);
        let mut attempt = 1;

        loop {
            let failure = match self.try_write(content) {
                Ok(()) => {
                    log::debug!("✅ 系统剪贴板写入成功 (尝试 {})", attempt);
                    return Ok(());
                }
                Err(failure) => failure,
            };
            log::warn!("❌ 系统剪贴板第 {} 次写入失败：{}", attempt, failure.message());

            let wait = match failure {
                WriteFailure::Permanent(message) => return Err(AppError::Clipboard(message)),
                WriteFailure::Retryable(message) => match backoff.next_wait() {
                    Some(wait) => wait,
                    None => return Err(AppError::Clipboard(message)),
                },
            };

            log::debug!("🔄 {}ms 后重试", wait.as_millis());
            std::thread::sleep(wait);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_handler::{NormalizedImage, RgbaRaster};

    fn retry(base_ms: u64, max_ms: u64, total_ms: u64, retries: u32) -> ClipboardRetry {
        ClipboardRetry {
            retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            max_total: Duration::from_millis(total_ms),
        }
    }

    #[test]
    fn delay_grows_exponentially_with_bounded_jitter() {
        let policy = retry(100, 900, 10_000, 5);

        let first = Backoff::delay_for(&policy, 1, 0);
        assert_eq!(first, Duration::from_millis(100));

        let fourth = Backoff::delay_for(&policy, 4, u64::MAX);
        assert!(fourth >= Duration::from_millis(800));
        assert!(fourth <= Duration::from_millis(1_066));
    }

    #[test]
    fn delay_is_capped_by_max_delay() {
        let policy = retry(300, 500, 10_000, 5);
        let delay = Backoff::delay_for(&policy, 8, 7);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(666));
    }

    #[test]
    fn backoff_stops_after_configured_retries() {
        let mut backoff = Backoff::new(retry(1, 1, 10_000, 2));
        assert!(backoff.next_wait().is_some());
        assert!(backoff.next_wait().is_some());
        assert!(backoff.next_wait().is_none());
    }

    #[test]
    fn backoff_stops_when_budget_would_be_exceeded() {
        let mut backoff = Backoff::new(retry(500, 900, 300, 3));
        assert!(backoff.next_wait().is_none());
    }

    #[test]
    fn arboard_errors_are_classified() {
        assert!(matches!(
            WriteFailure::from_arboard("x", arboard::Error::ClipboardOccupied),
            WriteFailure::Retryable(_)
        ));
        assert!(matches!(
            WriteFailure::from_arboard("x", arboard::Error::ClipboardNotSupported),
            WriteFailure::Permanent(_)
        ));
        assert!(matches!(
            WriteFailure::from_arboard("x", arboard::Error::ContentNotAvailable),
            WriteFailure::Retryable(_)
        ));
    }

    #[test]
    fn images_without_pixels_are_not_supported() {
        let clipboard = SystemClipboard::new(ClipboardRetry::default());
        let encoded_only = ClipboardContent::Image(NormalizedImage {
            bytes: vec![0xFF, 0xD8],
            mime: "image/jpeg".to_string(),
            raster: None,
            converted: false,
        });
        let decoded = ClipboardContent::Image(NormalizedImage {
            bytes: Vec::new(),
            mime: "image/png".to_string(),
            raster: Some(RgbaRaster {
                width: 1,
                height: 1,
                bytes: vec![0, 0, 0, 255],
            }),
            converted: true,
        });

        assert!(!clipboard.supports(&encoded_only));
        assert!(clipboard.supports(&decoded));
        assert!(clipboard.supports(&ClipboardContent::Text("x".into())));
    }

    #[test]
    #[ignore = "requires system clipboard access"]
    fn text_round_trips_through_system_clipboard() {
        let clipboard = SystemClipboard::new(ClipboardRetry::default());
        clipboard
            .write(&ClipboardContent::Text("push-clipboard test".into()))
            .expect("write text");

        let mut reader = arboard::Clipboard::new().expect("open clipboard");
        assert_eq!(reader.get_text().expect("read text"), "push-clipboard test");
    }
}
