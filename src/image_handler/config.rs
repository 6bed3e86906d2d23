//! # 图片配置
//!
//! 配置按阶段分成三组：
//!
//! - `ImageLimits`：加载 / 解码阶段的资源上限，超限时退化为原始字节直通
//! - `ResizePolicy`：写入剪贴板前的降采样策略，由性能档位整体决定
//! - `ClipboardRetry`：原生剪贴板写入的重试预算
//!
//! 设置文件里只出现档位名（quality / balanced / speed），其余参数都由档位派生。

use std::str::FromStr;
use std::time::Duration;

use image::imageops::FilterType;

use super::ImageError;

/// 资源上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    /// 编码字节上限（Base64 按预计解码体积计）。
    pub max_encoded_bytes: u64,
    /// 解码后像素上限（`width * height`）。
    pub max_pixels: u64,
    /// 按 RGBA 估算的解码内存上限。
    pub max_rgba_bytes: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_encoded_bytes: 50 * 1024 * 1024,
            max_pixels: 40_000_000,
            max_rgba_bytes: 160 * 1024 * 1024,
        }
    }
}

impl ImageLimits {
    /// 校验尺寸是否在像素与内存上限之内。
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{}x{}（限制：{} 像素）",
                width, height, self.max_pixels
            )));
        }

        let rgba = pixels.saturating_mul(4);
        if rgba > self.max_rgba_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                rgba as f64 / 1024.0 / 1024.0,
                self.max_rgba_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 校验编码字节体积。
    pub fn check_encoded_len(&self, len: u64) -> Result<(), ImageError> {
        if len > self.max_encoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片过大：{:.2} MB（限制：{:.2} MB）",
                len as f64 / 1024.0 / 1024.0,
                self.max_encoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }
        Ok(())
    }
}

/// 降采样策略。`None` 表示保持原尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePolicy {
    pub max_pixels: Option<u64>,
    pub max_dimension: Option<u32>,
    pub filter: FilterType,
}

impl ResizePolicy {
    pub fn for_profile(profile: ImagePerformanceProfile) -> Self {
        match profile {
            ImagePerformanceProfile::Quality => Self {
                max_pixels: None,
                max_dimension: None,
                filter: FilterType::CatmullRom,
            },
            ImagePerformanceProfile::Balanced => Self {
                max_pixels: Some(5_000_000),
                max_dimension: Some(2560),
                filter: FilterType::Triangle,
            },
            ImagePerformanceProfile::Speed => Self {
                max_pixels: Some(2_000_000),
                max_dimension: Some(1920),
                filter: FilterType::Nearest,
            },
        }
    }

    /// 计算降采样后的目标尺寸；无需缩放时返回 `None`。
    ///
    /// 保持宽高比，取像素上限与单边上限中更严格的一方。
    pub fn target_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }

        let mut scale: f64 = 1.0;
        if let Some(max_dim) = self.max_dimension {
            let longest = width.max(height);
            if longest > max_dim {
                scale = scale.min(f64::from(max_dim) / f64::from(longest));
            }
        }
        if let Some(max_pixels) = self.max_pixels {
            let pixels = u64::from(width) * u64::from(height);
            if pixels > max_pixels {
                scale = scale.min((max_pixels as f64 / pixels as f64).sqrt());
            }
        }

        if scale >= 1.0 {
            return None;
        }

        let target_width = ((f64::from(width) * scale).floor() as u32).max(1);
        let target_height = ((f64::from(height) * scale).floor() as u32).max(1);
        Some((target_width, target_height))
    }
}

/// 原生剪贴板写入重试预算。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipboardRetry {
    /// 首次失败后的最大重试次数。
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 单次写入允许的累计等待上限。
    pub max_total: Duration,
}

impl Default for ClipboardRetry {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(900),
            max_total: Duration::from_millis(1_800),
        }
    }
}

/// 图片性能档位。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImagePerformanceProfile {
    /// 不降采样，保持推送端原始分辨率。
    #[default]
    Quality,
    Balanced,
    /// 更激进的降采样，优先写入速度。
    Speed,
}

impl FromStr for ImagePerformanceProfile {
    type Err = ImageError;

    /// ```rust
    /// use push_clipboard::image_handler::ImagePerformanceProfile;
    ///
    /// let p: ImagePerformanceProfile = " Speed ".parse()?;
    /// assert_eq!(p.as_str(), "speed");
    /// # Ok::<(), push_clipboard::image_handler::ImageError>(())
    /// ```
    fn from_str(profile: &str) -> Result<Self, Self::Err> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidFormat(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }
}

impl ImagePerformanceProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

/// 图片处理配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    pub profile: ImagePerformanceProfile,
    pub limits: ImageLimits,
    pub resize: ResizePolicy,
    pub retry: ClipboardRetry,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self::with_profile(ImagePerformanceProfile::default())
    }
}

impl ImageConfig {
    pub fn with_profile(profile: ImagePerformanceProfile) -> Self {
        Self {
            profile,
            limits: ImageLimits::default(),
            resize: ResizePolicy::for_profile(profile),
            retry: ClipboardRetry::default(),
        }
    }

    /// 切换档位，只影响降采样策略。
    pub(crate) fn set_profile(&mut self, profile: ImagePerformanceProfile) {
        self.profile = profile;
        self.resize = ResizePolicy::for_profile(profile);
    }
}
