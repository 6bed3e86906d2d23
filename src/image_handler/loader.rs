//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（Base64 / Data URL / 原始字节）的原始字节加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - Base64：剥离 Data URL 前缀与空白 → 预估解码体积 → 解码。
//!   纯 Base64 默认视为 PNG。
//! - 原始字节：直接接管，体积上限留给流水线判断（超限时退化直通而不是丢弃）。
//! - 文件签名（magic bytes）通过 `infer` 识别，返回真实 MIME。

use base64::{Engine as _, engine::general_purpose};

use super::source::{ImageSource, RawImageData};
use super::{ImageConfig, ImageError, ImageNormalizer};

const DATA_URL_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";
const DEFAULT_BASE64_MIME: &str = "image/png";

impl ImageNormalizer {
    /// 按来源加载原始字节。
    pub(super) fn load(
        &self,
        source: ImageSource,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        match source {
            ImageSource::Bytes { bytes, mime } => Ok(RawImageData {
                bytes,
                claimed_mime: mime,
                source_hint: "binary",
            }),
            ImageSource::Base64(data) => self.load_from_base64(&data, config),
        }
    }

    /// 从 Base64 字符串加载图片原始字节。
    pub(super) fn load_from_base64(
        &self,
        data: &str,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📝 开始处理 base64 图片");

        let (bytes, claimed_mime) = Self::parse_base64_with_limit(data, config.limits.max_encoded_bytes)?;

        if bytes.is_empty() {
            return Err(ImageError::InvalidFormat("Base64 内容为空".to_string()));
        }

        Ok(RawImageData {
            bytes,
            claimed_mime,
            source_hint: "base64",
        })
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
        let len = base64_data.len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 Base64 输入（支持 Data URL / 纯 Base64），返回字节与声明的 MIME。
    pub(crate) fn parse_base64_with_limit(
        data: &str,
        max_file_size: u64,
    ) -> Result<(Vec<u8>, String), ImageError> {
        let normalized = data.trim();

        let (payload, mime) = if normalized.starts_with(DATA_URL_PREFIX) {
            let base64_start = normalized
                .find(BASE64_MARKER)
                .ok_or_else(|| ImageError::InvalidFormat("缺少 base64 标记".to_string()))?;
            let mime = normalized["data:".len()..base64_start].to_string();
            (&normalized[base64_start + BASE64_MARKER.len()..], mime)
        } else {
            (normalized, DEFAULT_BASE64_MIME.to_string())
        };

        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(&compact)?;
        if estimated_len > max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))?;

        Ok((bytes, mime))
    }

    /// 通过文件签名（magic bytes）识别图片类型，返回真实 MIME。
    pub(super) fn sniff_image_mime(bytes: &[u8]) -> Result<&'static str, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(kind.mime_type())
    }
}
