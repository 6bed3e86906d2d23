//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示外部来源语义
//! - `RawImageData` 表示已加载但未解码的字节
//! - `RgbaRaster` 表示解码后的像素
//! - `NormalizedImage` 表示可直接交给剪贴板策略链的结果

/// 图片输入来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 分块传输拼接完成的原始字节，附带推送端声明的 MIME。
    Bytes { bytes: Vec<u8>, mime: String },
    /// 旧版消息中的 Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源声明的 MIME（Data URL 前缀或 `binary_start.content_type`）。
    pub(crate) claimed_mime: String,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码后的 RGBA 像素数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaRaster {
    /// 图像宽度（像素）。
    pub width: usize,
    /// 图像高度（像素）。
    pub height: usize,
    /// RGBA 字节数组（`width * height * 4`）。
    pub bytes: Vec<u8>,
}

/// 规范化输出。
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// 写入剪贴板的编码字节：转换成功时为 PNG，否则为原始字节。
    pub bytes: Vec<u8>,
    /// `bytes` 对应的 MIME。
    pub mime: String,
    /// 解码成功时附带像素，供原生剪贴板直接写入。
    pub raster: Option<RgbaRaster>,
    /// 是否已转换为规范格式；`false` 表示退化直通。
    pub converted: bool,
}
