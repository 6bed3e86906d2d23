//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImageNormalizer` 只负责流程编排与配置管理，不直接接触剪贴板。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源加载原始字节
//! 3. 解码并准备 RGBA 数据
//! 4. 编码为 PNG
//!
//! 第 3、4 步失败时退化为原始字节直通（“降级而不丢弃”）。
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ImageConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `load/decode/encode/total` 阶段耗时，便于性能诊断。
//! - 整个处理是同步 CPU 任务，调用方负责放到 `spawn_blocking` 中执行。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::source::RawImageData;
use super::{
    CANONICAL_IMAGE_MIME, ImageConfig, ImageError, ImagePerformanceProfile, ImageSource,
    NormalizedImage,
};

/// 图片规范化处理器。
#[derive(Clone)]
pub struct ImageNormalizer {
    pub(super) config: Arc<RwLock<ImageConfig>>,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(ImageConfig::default())
    }
}

impl ImageNormalizer {
    /// 根据初始配置创建处理器。
    pub fn new(config: ImageConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<ImageConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 切换性能档位，下一次处理生效。
    pub fn set_performance_profile(&self, profile: ImagePerformanceProfile) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.set_profile(profile);

        log::info!(
            "⚙️ 已切换图片性能档位：{}（max_pixels={:?}, max_dim={:?}, filter={:?}）",
            profile.as_str(),
            config.resize.max_pixels,
            config.resize.max_dimension,
            config.resize.filter
        );

        Ok(())
    }

    pub fn performance_profile(&self) -> Result<ImagePerformanceProfile, ImageError> {
        Ok(self.config_snapshot()?.profile)
    }

    /// 处理主入口：加载并规范化为 PNG。
    ///
    /// 只有加载失败（例如 Base64 本身不合法）才返回错误；
    /// 解码 / 编码失败会退化为原始字节直通，`converted = false`。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use push_clipboard::image_handler::{ImageNormalizer, ImageSource};
    ///
    /// let normalizer = ImageNormalizer::default();
    /// let image = normalizer.normalize(ImageSource::Base64("iVBORw0KGgo=".into()))?;
    /// println!("{} bytes as {}", image.bytes.len(), image.mime);
    /// # Ok::<(), push_clipboard::image_handler::ImageError>(())
    /// ```
    pub fn normalize(&self, source: ImageSource) -> Result<NormalizedImage, ImageError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let load_start = Instant::now();
        let raw = self.load(source, &config)?;
        let load_elapsed = load_start.elapsed();

        let decode_start = Instant::now();
        let raster = match self.decode_to_raster(&raw, &config) {
            Ok(raster) => raster,
            Err(err) => return Ok(Self::pass_through(raw, &err)),
        };
        let decode_elapsed = decode_start.elapsed();

        let encode_start = Instant::now();
        let png = match Self::encode_png(&raster) {
            Ok(png) => png,
            Err(err) => return Ok(Self::pass_through(raw, &err)),
        };
        let encode_elapsed = encode_start.elapsed();

        log::info!(
            "✅ 图片规范化完成 - {} -> {} load={}ms decode={}ms encode={}ms total={}ms",
            raw.claimed_mime,
            CANONICAL_IMAGE_MIME,
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(NormalizedImage {
            bytes: png,
            mime: CANONICAL_IMAGE_MIME.to_string(),
            raster: Some(raster),
            converted: true,
        })
    }

    fn pass_through(raw: RawImageData, err: &ImageError) -> NormalizedImage {
        log::warn!(
            "⚠️ 图片转换为 PNG 失败，按原始字节直通（{}，code={}）：{}",
            raw.claimed_mime,
            err.code(),
            err
        );
        NormalizedImage {
            bytes: raw.bytes,
            mime: raw.claimed_mime,
            raster: None,
            converted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn encode_test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = DynamicImage::ImageRgba8(img);
        let dyn_img = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(dyn_img.to_rgb8())
        } else {
            dyn_img
        };
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, format)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn jpeg_bytes_are_converted_to_png() {
        let normalizer = ImageNormalizer::default();
        let jpeg = encode_test_image(64, 48, ImageFormat::Jpeg);

        let image = normalizer
            .normalize(ImageSource::Bytes {
                bytes: jpeg,
                mime: "image/jpeg".to_string(),
            })
            .expect("normalize should succeed");

        assert!(image.converted);
        assert_eq!(image.mime, "image/png");
        assert_eq!(image::guess_format(&image.bytes).expect("format"), ImageFormat::Png);
        let raster = image.raster.expect("raster present");
        assert_eq!((raster.width, raster.height), (64, 48));
        assert_eq!(raster.bytes.len(), 64 * 48 * 4);
    }

    #[test]
    fn undecodable_bytes_pass_through_unchanged() {
        let normalizer = ImageNormalizer::default();
        let garbage = b"definitely not an image payload".to_vec();

        let image = normalizer
            .normalize(ImageSource::Bytes {
                bytes: garbage.clone(),
                mime: "image/jpeg".to_string(),
            })
            .expect("pass-through should not fail");

        assert!(!image.converted);
        assert!(image.raster.is_none());
        assert_eq!(image.bytes, garbage);
        assert_eq!(image.mime, "image/jpeg");
    }

    #[test]
    fn oversized_image_degrades_instead_of_failing() {
        let mut config = ImageConfig::default();
        config.limits.max_pixels = 100;
        let normalizer = ImageNormalizer::new(config);
        let png = encode_test_image(20, 20, ImageFormat::Png);

        let image = normalizer
            .normalize(ImageSource::Bytes {
                bytes: png.clone(),
                mime: "image/png".to_string(),
            })
            .expect("resource limit should degrade");

        assert!(!image.converted);
        assert_eq!(image.bytes, png);
    }

    #[test]
    fn legacy_data_url_is_normalized() {
        let normalizer = ImageNormalizer::default();
        let png = encode_test_image(16, 16, ImageFormat::Png);
        let data_url = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&png)
        );

        let image = normalizer
            .normalize(ImageSource::Base64(data_url))
            .expect("data url should normalize");

        assert!(image.converted);
        assert_eq!(image.raster.map(|r| (r.width, r.height)), Some((16, 16)));
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let normalizer = ImageNormalizer::default();
        let result = normalizer.normalize(ImageSource::Base64("@@@not-base64@@@".to_string()));
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn adaptive_resize_downscales_large_image() {
        let normalizer =
            ImageNormalizer::new(ImageConfig::with_profile(ImagePerformanceProfile::Speed));
        let png = encode_test_image(2400, 1200, ImageFormat::Png);

        let image = normalizer
            .normalize(ImageSource::Bytes {
                bytes: png,
                mime: "image/png".to_string(),
            })
            .expect("normalize should succeed");

        let raster = image.raster.expect("raster present");
        assert!(raster.width <= 1920);
        assert!(raster.width < 2400 && raster.height < 1200);
        assert_eq!(raster.bytes.len(), raster.width * raster.height * 4);
    }

    #[test]
    fn profile_switch_is_observable() {
        let normalizer = ImageNormalizer::default();
        assert_eq!(
            normalizer.performance_profile().expect("profile"),
            ImagePerformanceProfile::Quality
        );

        normalizer
            .set_performance_profile(ImagePerformanceProfile::Speed)
            .expect("switch profile");

        assert_eq!(
            normalizer.performance_profile().expect("profile"),
            ImagePerformanceProfile::Speed
        );
    }
}
