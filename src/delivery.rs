//! 投递流水线模块
//!
//! # 设计思路
//!
//! 连接管理器解码出的内容（文本、旧版内嵌图片、拼装完成的二进制图片）
//! 都以 `DeliveryJob` 的形式交给本模块，由单独的工作任务串行执行副作用：
//!
//! - 文本：写剪贴板 + 追加到编辑器，两者互不影响，始终记录一条成功日志
//! - 图片：规范化为 PNG 后只写剪贴板，按写入结果记录成功或告警
//!
//! 投递中的任何失败只记录日志，不会影响连接状态。
//!
//! # 实现思路
//!
//! - 连接管理器只负责入队，从不等待投递完成；传输槽因此只在管理器内同步修改。
//! - 剪贴板、编辑器与图片解码都是阻塞操作，统一放到 `spawn_blocking` 中执行。
//! - 编辑器可在运行时替换（设置热加载），使用 `Arc<RwLock<..>>` 持有。

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clipboard::{ClipboardChain, ClipboardContent};
use crate::editor::EditorSink;
use crate::error::AppError;
use crate::image_handler::{ImageNormalizer, ImageSource};
use crate::push::CompletedTransfer;
use crate::status::StatusLog;

/// 待投递的内容。
#[derive(Debug, Clone)]
pub enum DeliveryJob {
    Text(String),
    LegacyImage(String),
    Transfer(CompletedTransfer),
}

type SharedEditor = Arc<RwLock<Option<Arc<dyn EditorSink>>>>;

/// 投递流水线：剪贴板 + 编辑器 + 图片规范化 + 状态日志。
#[derive(Clone)]
pub struct DeliveryPipeline {
    clipboard: Arc<ClipboardChain>,
    editor: SharedEditor,
    normalizer: ImageNormalizer,
    status: StatusLog,
}

impl DeliveryPipeline {
    pub fn new(clipboard: ClipboardChain, normalizer: ImageNormalizer, status: StatusLog) -> Self {
        Self {
            clipboard: Arc::new(clipboard),
            editor: Arc::new(RwLock::new(None)),
            normalizer,
            status,
        }
    }

    pub fn with_editor(self, editor: Arc<dyn EditorSink>) -> Self {
        self.set_editor(Some(editor));
        self
    }

    /// 替换编辑器；`None` 表示不再写入编辑器。
    pub fn set_editor(&self, editor: Option<Arc<dyn EditorSink>>) {
        match self.editor.write() {
            Ok(mut slot) => *slot = editor,
            Err(_) => log::error!("编辑器锁已中毒，无法更新编辑器"),
        }
    }

    pub fn normalizer(&self) -> &ImageNormalizer {
        &self.normalizer
    }

    fn current_editor(&self) -> Option<Arc<dyn EditorSink>> {
        self.editor.read().ok().and_then(|slot| slot.clone())
    }

    pub async fn deliver(&self, job: DeliveryJob) {
        match job {
            DeliveryJob::Text(text) => self.deliver_text(&text).await,
            DeliveryJob::LegacyImage(text) => self.deliver_legacy_image(&text).await,
            DeliveryJob::Transfer(transfer) => self.deliver_transfer(transfer).await,
        }
    }

    /// 文本：剪贴板与编辑器各自尝试，始终记录成功日志。
    pub async fn deliver_text(&self, text: &str) {
        let clipboard = self.clipboard.clone();
        let editor = self.current_editor();
        let owned = text.to_string();

        let outcome = tokio::task::spawn_blocking(move || {
            let copied = clipboard.write(&ClipboardContent::Text(owned.clone()));
            let inserted = editor.map(|editor| editor.insert(&owned));
            (copied, inserted)
        })
        .await;

        match outcome {
            Ok((copied, inserted)) => {
                if let Err(err) = copied {
                    log::warn!("⚠️ 文本写入剪贴板失败：{}", err);
                }
                if let Some(Err(err)) = inserted {
                    log::warn!("⚠️ 文本写入编辑器失败：{}", err);
                }
            }
            Err(err) => log::error!("❌ 文本投递线程执行失败：{}", err),
        }

        self.status.success(format!("webhook消息：{}", text));
    }

    /// 图片：规范化后写入剪贴板，返回成功的剪贴板策略名。
    pub async fn deliver_image(&self, source: ImageSource) -> Result<&'static str, AppError> {
        let normalizer = self.normalizer.clone();
        let clipboard = self.clipboard.clone();

        tokio::task::spawn_blocking(move || {
            let image = normalizer.normalize(source)?;
            clipboard.write(&ClipboardContent::Image(image))
        })
        .await
        .map_err(|e| AppError::Clipboard(format!("线程执行失败：{}", e)))?
    }

    /// 旧版内嵌 Base64 图片；失败时在告警里保留原文。
    pub async fn deliver_legacy_image(&self, text: &str) {
        match self.deliver_image(ImageSource::Base64(text.trim().to_string())).await {
            Ok(_) => {
                self.status.success("webhook消息：图片已复制到剪贴板");
            }
            Err(err) => {
                log::error!("❌ 复制图片到剪贴板失败: {}", err);
                self.status
                    .warning(format!("webhook消息：图片复制失败，已保留原文：{}", text));
            }
        }
    }

    /// 拼装完成的二进制图片。
    pub async fn deliver_transfer(&self, transfer: CompletedTransfer) {
        if transfer.is_empty() {
            self.status.warning(format!(
                "webhook消息：未收到任何图片数据 - {}",
                transfer.filename
            ));
            return;
        }

        if transfer.size_mismatch() {
            self.status.warning(format!(
                "webhook消息：图片大小不一致 - {}（声明 {} bytes，实际 {} bytes）",
                transfer.filename, transfer.declared_size, transfer.received_size
            ));
        }

        let source = ImageSource::Bytes {
            bytes: transfer.blob.to_vec(),
            mime: transfer.content_type.clone(),
        };

        match self.deliver_image(source).await {
            Ok(_) => {
                self.status.success(format!(
                    "webhook消息：图片已复制到剪贴板 - {} ({:.2}KB)",
                    transfer.filename,
                    transfer.declared_size as f64 / 1024.0
                ));
            }
            Err(err) => {
                log::error!("❌ 复制图片到剪贴板失败: {}", err);
                self.status
                    .warning(format!("webhook消息：图片复制失败 - {}", transfer.filename));
            }
        }
    }

    /// 启动串行投递任务。
    pub fn spawn(&self) -> (DeliveryQueue, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = self.clone();
        let task = tokio::spawn(pipeline.run(rx));
        (DeliveryQueue { tx }, task)
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<DeliveryJob>) {
        while let Some(job) = rx.recv().await {
            self.deliver(job).await;
        }
        log::debug!("投递任务已退出");
    }
}

/// 投递队列的发送端。
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryJob>,
}

impl DeliveryQueue {
    /// 入队；投递任务已退出时返回 `false`。
    pub fn submit(&self, job: DeliveryJob) -> bool {
        self.tx.send(job).is_ok()
    }

    /// 不执行任何投递的队列，内容直接交给返回的接收端。
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<DeliveryJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::ClipboardStrategy;
    use crate::status::Severity;
    use bytes::Bytes;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingClipboard {
        writes: Arc<Mutex<Vec<ClipboardContent>>>,
        fail: bool,
    }

    impl ClipboardStrategy for RecordingClipboard {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn supports(&self, _content: &ClipboardContent) -> bool {
            true
        }

        fn write(&self, content: &ClipboardContent) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Clipboard("denied".to_string()));
            }
            self.writes.lock().expect("writes").push(content.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEditor {
        inserts: Mutex<Vec<String>>,
    }

    impl EditorSink for RecordingEditor {
        fn insert(&self, text: &str) -> Result<(), AppError> {
            self.inserts.lock().expect("inserts").push(text.to_string());
            Ok(())
        }
    }

    fn pipeline(clipboard: &RecordingClipboard) -> (DeliveryPipeline, StatusLog) {
        let status = StatusLog::default();
        let chain = ClipboardChain::new(vec![Box::new(clipboard.clone())]);
        (
            DeliveryPipeline::new(chain, ImageNormalizer::default(), status.clone()),
            status,
        )
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("encode png");
        cursor.into_inner()
    }

    fn transfer(blob: Vec<u8>, declared: u64, chunks: usize) -> CompletedTransfer {
        CompletedTransfer {
            transfer_id: "t".to_string(),
            received_size: blob.len() as u64,
            blob: Bytes::from(blob),
            content_type: "image/png".to_string(),
            filename: "shot.png".to_string(),
            declared_size: declared,
            chunk_count: chunks,
            elapsed: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn text_goes_to_clipboard_and_editor() {
        let clipboard = RecordingClipboard::default();
        let editor = Arc::new(RecordingEditor::default());
        let (pipeline, status) = pipeline(&clipboard);
        let pipeline = pipeline.with_editor(editor.clone());

        pipeline.deliver_text("hello").await;

        assert!(matches!(
            clipboard.writes.lock().expect("writes").as_slice(),
            [ClipboardContent::Text(text)] if text == "hello"
        ));
        assert_eq!(*editor.inserts.lock().expect("inserts"), vec!["hello"]);
        let entry = &status.entries()[0];
        assert_eq!(entry.message, "webhook消息：hello");
        assert_eq!(entry.severity, Severity::Success);
    }

    #[tokio::test]
    async fn clipboard_failure_does_not_block_editor() {
        let clipboard = RecordingClipboard {
            fail: true,
            ..RecordingClipboard::default()
        };
        let editor = Arc::new(RecordingEditor::default());
        let (pipeline, status) = pipeline(&clipboard);
        let pipeline = pipeline.with_editor(editor.clone());

        pipeline.deliver_text("still here").await;

        assert_eq!(*editor.inserts.lock().expect("inserts"), vec!["still here"]);
        assert_eq!(status.entries()[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn transfer_is_normalized_and_copied() {
        let clipboard = RecordingClipboard::default();
        let (pipeline, status) = pipeline(&clipboard);
        let png = png_bytes(8, 8);
        let declared = png.len() as u64;

        pipeline.deliver_transfer(transfer(png, declared, 2)).await;

        let writes = clipboard.writes.lock().expect("writes");
        match writes.as_slice() {
            [ClipboardContent::Image(image)] => {
                assert!(image.converted);
                assert_eq!(image.mime, "image/png");
            }
            other => panic!("unexpected writes: {:?}", other),
        }
        let entries = status.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.starts_with("webhook消息：图片已复制到剪贴板 - shot.png ("));
        assert!(entries[0].message.ends_with("KB)"));
    }

    #[tokio::test]
    async fn default_settings_keep_full_resolution() {
        use crate::image_handler::ImageConfig;
        use crate::settings::PushSettings;

        let clipboard = RecordingClipboard::default();
        let profile = PushSettings::default().image_profile();
        let pipeline = DeliveryPipeline::new(
            ClipboardChain::new(vec![Box::new(clipboard.clone())]),
            ImageNormalizer::new(ImageConfig::with_profile(profile)),
            StatusLog::default(),
        );
        let png = png_bytes(3000, 2000);
        let declared = png.len() as u64;

        pipeline.deliver_transfer(transfer(png, declared, 1)).await;

        let writes = clipboard.writes.lock().expect("writes");
        match writes.as_slice() {
            [ClipboardContent::Image(image)] => {
                let raster = image.raster.as_ref().expect("raster");
                assert_eq!((raster.width, raster.height), (3000, 2000));
            }
            other => panic!("unexpected writes: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_transfer_is_warned_and_not_copied() {
        let clipboard = RecordingClipboard::default();
        let (pipeline, status) = pipeline(&clipboard);

        pipeline.deliver_transfer(transfer(Vec::new(), 10, 0)).await;

        assert!(clipboard.writes.lock().expect("writes").is_empty());
        let entry = &status.entries()[0];
        assert_eq!(entry.message, "webhook消息：未收到任何图片数据 - shot.png");
        assert_eq!(entry.severity, Severity::Warning);
    }

    #[tokio::test]
    async fn size_mismatch_warns_but_still_delivers() {
        let clipboard = RecordingClipboard::default();
        let (pipeline, status) = pipeline(&clipboard);
        let png = png_bytes(4, 4);
        let declared = png.len() as u64 + 100;

        pipeline.deliver_transfer(transfer(png, declared, 1)).await;

        assert_eq!(clipboard.writes.lock().expect("writes").len(), 1);
        let severities: Vec<_> = status.entries().into_iter().map(|e| e.severity).collect();
        assert_eq!(severities, vec![Severity::Success, Severity::Warning]);
    }

    #[tokio::test]
    async fn failed_legacy_image_keeps_original_text() {
        let clipboard = RecordingClipboard::default();
        let (pipeline, status) = pipeline(&clipboard);
        let text = "data:image/png;base64,@@@@";

        pipeline.deliver_legacy_image(text).await;

        assert!(clipboard.writes.lock().expect("writes").is_empty());
        let entry = &status.entries()[0];
        assert_eq!(
            entry.message,
            format!("webhook消息：图片复制失败，已保留原文：{}", text)
        );
        assert_eq!(entry.severity, Severity::Warning);
    }

    #[tokio::test]
    async fn queue_delivers_jobs_in_order() {
        let clipboard = RecordingClipboard::default();
        let (pipeline, status) = pipeline(&clipboard);
        let (queue, task) = pipeline.spawn();

        assert!(queue.submit(DeliveryJob::Text("first".to_string())));
        assert!(queue.submit(DeliveryJob::Text("second".to_string())));
        drop(queue);
        drop(pipeline);
        task.await.expect("delivery task");

        let messages: Vec<_> = status.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["webhook消息：second", "webhook消息：first"]);
    }
}
