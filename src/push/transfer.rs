//! # 二进制传输拼装
//!
//! ## 设计思路
//!
//! 一次图片推送由 `binary_start` → 若干二进制帧 → `binary_end` 组成。
//! 同一时刻只存在一个传输：新的 `binary_start` 会顶替未完成的旧传输，
//! 旧传输作为返回值交给调用方，由调用方记录告警。
//!
//! ## 实现思路
//!
//! - 分块按到达顺序保存为 `Bytes`（零拷贝引用传输层缓冲），结束时一次性拼接。
//! - 声明大小与实际大小不一致不算错误，完整交付并由调用方告警。
//! - 累计接收超过上限时整个传输被丢弃，之后的分块与 `binary_end` 都会被忽略。

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::image_handler::ImageLimits;

/// 正在接收的传输。
#[derive(Debug)]
pub struct BinaryTransfer {
    pub transfer_id: String,
    pub filename: String,
    pub content_type: String,
    pub declared_size: u64,
    pub received_size: u64,
    pub chunks: Vec<Bytes>,
    pub started_at: Instant,
}

/// 拼装完成的传输。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    pub transfer_id: String,
    pub blob: Bytes,
    pub content_type: String,
    pub filename: String,
    pub declared_size: u64,
    pub received_size: u64,
    pub chunk_count: usize,
    pub elapsed: Duration,
}

impl CompletedTransfer {
    pub fn size_mismatch(&self) -> bool {
        self.declared_size != self.received_size
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

/// `on_chunk` 的结果。
#[derive(Debug)]
pub enum ChunkOutcome {
    Appended,
    /// 没有打开的传输。
    NoTransfer,
    /// 超过累计上限，传输已被丢弃。
    Overflow(BinaryTransfer),
}

/// 单槽传输拼装器。
#[derive(Debug)]
pub struct TransferAssembler {
    current: Option<BinaryTransfer>,
    max_bytes: u64,
}

impl Default for TransferAssembler {
    fn default() -> Self {
        Self::with_limit(ImageLimits::default().max_encoded_bytes)
    }
}

impl TransferAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单个传输允许累计接收的最大字节数。
    pub fn with_limit(max_bytes: u64) -> Self {
        Self {
            current: None,
            max_bytes,
        }
    }

    /// 打开新传输，返回被顶替的旧传输（如有）。
    pub fn on_start(
        &mut self,
        transfer_id: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
    ) -> Option<BinaryTransfer> {
        let transfer = BinaryTransfer {
            transfer_id: transfer_id.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            declared_size: size,
            received_size: 0,
            chunks: Vec::new(),
            started_at: Instant::now(),
        };

        log::info!(
            "📥 开始接收二进制图片: {}, 大小: {} bytes",
            transfer.filename,
            transfer.declared_size
        );
        self.current.replace(transfer)
    }

    /// 追加一个分块。
    pub fn on_chunk(&mut self, bytes: Bytes) -> ChunkOutcome {
        let Some(transfer) = self.current.as_mut() else {
            return ChunkOutcome::NoTransfer;
        };

        let received = transfer.received_size + bytes.len() as u64;
        if received > self.max_bytes {
            log::warn!(
                "⚠️ 传输 {} 超过上限 {} bytes，已丢弃",
                transfer.transfer_id,
                self.max_bytes
            );
            return match self.current.take() {
                Some(abandoned) => ChunkOutcome::Overflow(abandoned),
                None => ChunkOutcome::NoTransfer,
            };
        }

        transfer.received_size = received;
        transfer.chunks.push(bytes);
        log::debug!(
            "📦 收到二进制数据块 {}, 已接收 {}/{} bytes",
            transfer.chunks.len(),
            transfer.received_size,
            transfer.declared_size
        );
        ChunkOutcome::Appended
    }

    /// 结束传输；id 不匹配时不做任何改动并返回 `None`。
    pub fn on_end(&mut self, transfer_id: &str) -> Option<CompletedTransfer> {
        if self.open_id() != Some(transfer_id) {
            log::debug!("⏭️ 忽略不匹配的传输结束: {}", transfer_id);
            return None;
        }
        let transfer = self.current.take()?;

        let mut blob = BytesMut::with_capacity(transfer.received_size as usize);
        for chunk in &transfer.chunks {
            blob.extend_from_slice(chunk);
        }

        let completed = CompletedTransfer {
            transfer_id: transfer.transfer_id,
            blob: blob.freeze(),
            content_type: transfer.content_type,
            filename: transfer.filename,
            declared_size: transfer.declared_size,
            received_size: transfer.received_size,
            chunk_count: transfer.chunks.len(),
            elapsed: transfer.started_at.elapsed(),
        };

        log::info!(
            "✅ 二进制图片接收完成, 耗时: {}ms, 共 {} 个数据块, 实际接收 {}/{} bytes",
            completed.elapsed.as_millis(),
            completed.chunk_count,
            completed.received_size,
            completed.declared_size
        );
        Some(completed)
    }

    /// 丢弃当前传输（断线或停用时）。
    pub fn clear(&mut self) -> Option<BinaryTransfer> {
        self.current.take()
    }

    pub fn open_id(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.transfer_id.as_str())
    }

    pub fn current(&self) -> Option<&BinaryTransfer> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ten_byte_round_trip() {
        let bytes: Vec<u8> = (0u8..10).collect();
        let mut assembler = TransferAssembler::new();

        assert!(assembler.on_start("id-1", "a.png", "image/png", 10).is_none());
        for range in [0..5, 5..10] {
            assert!(matches!(
                assembler.on_chunk(Bytes::copy_from_slice(&bytes[range])),
                ChunkOutcome::Appended
            ));
        }

        let done = assembler.on_end("id-1").expect("completed");
        assert_eq!(done.blob.as_ref(), bytes.as_slice());
        assert_eq!(done.declared_size, 10);
        assert_eq!(done.received_size, 10);
        assert_eq!(done.chunk_count, 2);
        assert!(!done.size_mismatch());
        assert!(assembler.open_id().is_none());
    }

    #[test]
    fn non_matching_end_leaves_transfer_open() {
        let mut assembler = TransferAssembler::new();
        assembler.on_start("id-1", "a.png", "image/png", 4);
        assembler.on_chunk(Bytes::from_static(b"ab"));

        assert!(assembler.on_end("id-2").is_none());

        let open = assembler.current().expect("still open");
        assert_eq!(open.transfer_id, "id-1");
        assert_eq!(open.received_size, 2);
        assert_eq!(open.chunks.len(), 1);
    }

    #[test]
    fn end_without_open_transfer_is_noop() {
        let mut assembler = TransferAssembler::new();
        assert!(assembler.on_end("").is_none());
    }

    #[test]
    fn chunk_without_transfer_is_rejected() {
        let mut assembler = TransferAssembler::new();
        assert!(matches!(
            assembler.on_chunk(Bytes::from_static(b"x")),
            ChunkOutcome::NoTransfer
        ));
    }

    #[test]
    fn transfer_over_limit_is_dropped() {
        let mut assembler = TransferAssembler::with_limit(8);
        assembler.on_start("big", "big.png", "image/png", 100);
        assert!(matches!(
            assembler.on_chunk(Bytes::from_static(b"12345")),
            ChunkOutcome::Appended
        ));

        match assembler.on_chunk(Bytes::from_static(b"6789")) {
            ChunkOutcome::Overflow(dropped) => {
                assert_eq!(dropped.transfer_id, "big");
                assert_eq!(dropped.received_size, 5);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(assembler.open_id().is_none());
        assert!(assembler.on_end("big").is_none());
        assert!(matches!(
            assembler.on_chunk(Bytes::from_static(b"x")),
            ChunkOutcome::NoTransfer
        ));
    }

    #[test]
    fn transfer_exactly_at_limit_completes() {
        let mut assembler = TransferAssembler::with_limit(4);
        assembler.on_start("t", "t.png", "image/png", 4);
        assembler.on_chunk(Bytes::from_static(b"12"));
        assembler.on_chunk(Bytes::from_static(b"34"));
        assert_eq!(assembler.on_end("t").expect("completed").received_size, 4);
    }

    #[test]
    fn new_start_replaces_open_transfer() {
        let mut assembler = TransferAssembler::new();
        assembler.on_start("old", "old.png", "image/png", 100);
        assembler.on_chunk(Bytes::from_static(b"partial"));

        let abandoned = assembler
            .on_start("new", "new.png", "image/png", 3)
            .expect("old transfer returned");
        assert_eq!(abandoned.transfer_id, "old");
        assert_eq!(abandoned.received_size, 7);

        assembler.on_chunk(Bytes::from_static(b"new"));
        let done = assembler.on_end("new").expect("completed");
        assert_eq!(done.blob.as_ref(), b"new");
    }

    #[test]
    fn size_mismatch_is_still_delivered() {
        let mut assembler = TransferAssembler::new();
        assembler.on_start("t", "b.jpg", "image/jpeg", 10);
        assembler.on_chunk(Bytes::from_static(b"1234"));

        let done = assembler.on_end("t").expect("completed");
        assert!(done.size_mismatch());
        assert_eq!(done.blob.len(), 4);
    }

    #[test]
    fn empty_transfer_completes_with_no_chunks() {
        let mut assembler = TransferAssembler::new();
        assembler.on_start("t", "c.png", "image/png", 0);

        let done = assembler.on_end("t").expect("completed");
        assert!(done.is_empty());
        assert!(done.blob.is_empty());
    }

    proptest! {
        #[test]
        fn blob_is_concatenation_in_arrival_order(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16)
        ) {
            let mut assembler = TransferAssembler::new();
            let expected: Vec<u8> = chunks.iter().flatten().copied().collect();
            assembler.on_start("p", "p.bin", "image/png", expected.len() as u64);
            for chunk in &chunks {
                assembler.on_chunk(Bytes::copy_from_slice(chunk));
            }

            let done = assembler.on_end("p").expect("completed");
            prop_assert_eq!(done.blob.as_ref(), expected.as_slice());
            prop_assert_eq!(done.received_size, expected.len() as u64);
            prop_assert!(!done.size_mismatch());
        }
    }
}
