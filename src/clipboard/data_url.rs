//! Data URL 退化策略：图片无法以图片格式写入时，写入 `data:<mime>;base64,...` 文本。

use base64::{Engine as _, engine::general_purpose};

use super::{ClipboardContent, ClipboardStrategy};
use crate::error::AppError;

/// 把编码后的图片字节拼成 Data URL。
pub fn build_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// 图片 -> Data URL 文本，通过内部文本策略写入。
pub struct DataUrlClipboard {
    text: Box<dyn ClipboardStrategy>,
}

impl DataUrlClipboard {
    pub fn new(text: Box<dyn ClipboardStrategy>) -> Self {
        Self { text }
    }
}

impl ClipboardStrategy for DataUrlClipboard {
    fn name(&self) -> &'static str {
        "data-url"
    }

    fn supports(&self, content: &ClipboardContent) -> bool {
        matches!(content, ClipboardContent::Image(_))
    }

    fn write(&self, content: &ClipboardContent) -> Result<(), AppError> {
        let ClipboardContent::Image(image) = content else {
            return Err(AppError::Clipboard("Data URL 策略只处理图片".to_string()));
        };

        let text = ClipboardContent::Text(build_data_url(&image.mime, &image.bytes));
        log::debug!("🔗 图片退化为 Data URL 文本写入（{}）", image.mime);
        self.text.write(&text)
    }
}
