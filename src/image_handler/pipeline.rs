//! # 解码与编码
//!
//! 字节 → 尺寸检查 → 完整解码 → 降采样 → RGBA → PNG。
//! 尺寸检查只读图片头，在完整解码前拒绝超限输入。

use std::io::Cursor;

use fast_image_resize as fr;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageEncoder, ImageReader, Rgba};

use super::source::{RawImageData, RgbaRaster};
use super::{ImageConfig, ImageError, ImageNormalizer};

impl ImageNormalizer {
    /// 将原始字节解码为（可能已降采样的）RGBA 像素。
    pub(super) fn decode_to_raster(
        &self,
        raw: &RawImageData,
        config: &ImageConfig,
    ) -> Result<RgbaRaster, ImageError> {
        config.limits.check_encoded_len(raw.bytes.len() as u64)?;

        let sniffed = Self::sniff_image_mime(&raw.bytes)?;
        if sniffed != raw.claimed_mime {
            log::debug!(
                "🔎 声明类型与文件签名不一致 - 声明: {} 实际: {}",
                raw.claimed_mime,
                sniffed
            );
        }

        let (header_width, header_height) = ImageReader::new(Cursor::new(raw.bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?
            .into_dimensions()
            .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))?;
        config.limits.check_dimensions(header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;
        let (source_width, source_height) = decoded.dimensions();
        config.limits.check_dimensions(source_width, source_height)?;

        let image = match config.resize.target_size(source_width, source_height) {
            Some((width, height)) => {
                log::info!(
                    "🧩 自适应降采样：{}x{} -> {}x{}（filter={:?}）",
                    source_width,
                    source_height,
                    width,
                    height,
                    config.resize.filter
                );
                resize(decoded, width, height, config.resize.filter)
            }
            None => decoded,
        };

        let (width, height) = image.dimensions();
        let bytes = image.to_rgba8().into_raw();
        if bytes.len() != width as usize * height as usize * 4 {
            return Err(ImageError::Decode("解码后像素数据长度异常".to_string()));
        }

        log::info!(
            "✅ 图片解码成功 - 来源: {} 类型: {} 尺寸: {}x{} -> {}x{}",
            raw.source_hint,
            sniffed,
            source_width,
            source_height,
            width,
            height
        );

        Ok(RgbaRaster {
            width: width as usize,
            height: height as usize,
            bytes,
        })
    }

    /// 将 RGBA 像素编码为 PNG。
    pub(super) fn encode_png(raster: &RgbaRaster) -> Result<Vec<u8>, ImageError> {
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(
                &raster.bytes,
                raster.width as u32,
                raster.height as u32,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| ImageError::Decode(format!("PNG 编码失败：{}", e)))?;
        Ok(buf)
    }
}

/// 优先走 `fast_image_resize`，失败时退回 `image` 自带的缩放。
fn resize(image: DynamicImage, width: u32, height: u32, filter: FilterType) -> DynamicImage {
    match fast_resize(&image, width, height, filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 降采样失败，回退 image::resize_exact：{}", err);
            image.resize_exact(width, height, filter)
        }
    }
}

fn fast_resize(
    image: &DynamicImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<DynamicImage, ImageError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();
    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(width, height, fr::PixelType::U8x4);
    let algorithm = match filter {
        FilterType::Nearest => fr::ResizeAlg::Nearest,
        FilterType::Triangle => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
        FilterType::CatmullRom => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        FilterType::Gaussian => fr::ResizeAlg::Convolution(fr::FilterType::Mitchell),
        FilterType::Lanczos3 => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
    };

    fr::Resizer::new()
        .resize(
            &src_image,
            &mut dst_image,
            Some(&fr::ResizeOptions::new().resize_alg(algorithm)),
        )
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, dst_image.into_vec())
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}
