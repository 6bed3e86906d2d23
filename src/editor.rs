//! 编辑器投递模块
//!
//! # 设计思路
//!
//! 文本推送除了写入剪贴板，还要追加到“编辑器”里，方便直接发送。
//! 编辑器被抽象为 `EditorSink`：空内容时直接替换，非空时加分隔符后追加。
//!
//! 默认实现 `DraftFile` 把一个本地文件当作编辑器缓冲区：
//! - `plain`：换行分隔
//! - `html`：转义 HTML，换行转为 `<br>`，以 `<br>` 分隔
//!
//! # 实现思路
//!
//! - 拼接规则集中在纯函数 `compose_insertion`，便于测试。
//! - 判空时忽略空白与 `<br>` 之类的空标签，避免空段落被当作已有内容。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 编辑器写入目标。
pub trait EditorSink: Send + Sync {
    /// 插入文本：目标为空时替换，否则追加。
    fn insert(&self, text: &str) -> Result<(), AppError>;
}

/// 草稿内容格式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorFormat {
    #[default]
    Plain,
    Html,
}

impl EditorFormat {
    fn separator(self) -> &'static str {
        match self {
            Self::Plain => "\n",
            Self::Html => "<br>",
        }
    }

    fn render(self, text: &str) -> String {
        match self {
            Self::Plain => text.to_string(),
            Self::Html => escape_html(text).replace("\r\n", "\n").replace('\n', "<br>"),
        }
    }

    fn is_blank(self, existing: &str) -> bool {
        match self {
            Self::Plain => existing.trim().is_empty(),
            Self::Html => existing
                .replace("<br>", "")
                .replace("<br/>", "")
                .replace("<br />", "")
                .replace("&nbsp;", "")
                .trim()
                .is_empty(),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// 计算插入后的完整内容。
pub fn compose_insertion(existing: &str, text: &str, format: EditorFormat) -> String {
    let rendered = format.render(text);
    if format.is_blank(existing) {
        return rendered;
    }

    let mut out = String::with_capacity(existing.len() + rendered.len() + 4);
    out.push_str(existing.trim_end_matches(['\n', '\r']));
    out.push_str(format.separator());
    out.push_str(&rendered);
    out
}

/// 以本地文件作为编辑器缓冲区。
pub struct DraftFile {
    path: PathBuf,
    format: EditorFormat,
}

impl DraftFile {
    pub fn new(path: impl Into<PathBuf>, format: EditorFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EditorSink for DraftFile {
    fn insert(&self, text: &str) -> Result<(), AppError> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(AppError::Editor(format!(
                    "读取草稿 '{}' 失败: {}",
                    self.path.display(),
                    err
                )));
            }
        };

        let updated = compose_insertion(&existing, text, self.format);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, updated).map_err(|e| {
            AppError::Editor(format!("写入草稿 '{}' 失败: {}", self.path.display(), e))
        })?;

        log::debug!("📝 已写入草稿 {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn empty_target_is_replaced() {
        assert_eq!(compose_insertion("", "hello", EditorFormat::Plain), "hello");
        assert_eq!(compose_insertion("  \n", "hello", EditorFormat::Plain), "hello");
    }

    #[test]
    fn non_empty_target_gets_separator() {
        assert_eq!(
            compose_insertion("first\n", "second", EditorFormat::Plain),
            "first\nsecond"
        );
    }

    #[test]
    fn html_mode_escapes_and_breaks_lines() {
        assert_eq!(
            compose_insertion("", "a < b\nc & d", EditorFormat::Html),
            "a &lt; b<br>c &amp; d"
        );
        assert_eq!(
            compose_insertion("<p>hi</p>", "x", EditorFormat::Html),
            "<p>hi</p><br>x"
        );
    }

    #[test]
    fn html_mode_treats_empty_paragraph_breaks_as_blank() {
        assert_eq!(compose_insertion("<br> &nbsp; ", "x", EditorFormat::Html), "x");
    }

    #[test]
    fn draft_file_appends_across_inserts() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("push-clipboard-draft-{}", nanos));
        let draft = DraftFile::new(dir.join("draft.txt"), EditorFormat::Plain);

        draft.insert("one").expect("first insert");
        draft.insert("two").expect("second insert");

        let content = fs::read_to_string(draft.path()).expect("read draft");
        assert_eq!(content, "one\ntwo");

        let _ = fs::remove_dir_all(dir);
    }
}
