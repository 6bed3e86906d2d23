//! 命令行剪贴板策略：通过平台工具的标准输入写入剪贴板。

use std::io::Write;
use std::process::{Command, Stdio};

use super::{ClipboardContent, ClipboardStrategy};
use crate::error::AppError;

/// 可用的剪贴板命令。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    WlCopy,
    Xclip,
    Pbcopy,
    Clip,
}

impl Tool {
    fn program(self) -> &'static str {
        match self {
            Self::WlCopy => "wl-copy",
            Self::Xclip => "xclip",
            Self::Pbcopy => "pbcopy",
            Self::Clip => "clip",
        }
    }

    fn supports_images(self) -> bool {
        matches!(self, Self::WlCopy | Self::Xclip)
    }

    fn args(self, mime: Option<&str>) -> Vec<String> {
        match (self, mime) {
            (Self::WlCopy, Some(mime)) => vec!["--type".into(), mime.into()],
            (Self::Xclip, None) => vec!["-selection".into(), "clipboard".into()],
            (Self::Xclip, Some(mime)) => vec![
                "-selection".into(),
                "clipboard".into(),
                "-t".into(),
                mime.into(),
                "-i".into(),
            ],
            _ => Vec::new(),
        }
    }
}

/// 平台命令行剪贴板工具。
pub struct CommandClipboard {
    tool: Tool,
}

impl CommandClipboard {
    /// 根据当前平台与图形会话选择工具；不存在可用工具时返回 `None`。
    pub fn detect() -> Option<Self> {
        let candidates: Vec<Tool> = if cfg!(target_os = "macos") {
            vec![Tool::Pbcopy]
        } else if cfg!(target_os = "windows") {
            vec![Tool::Clip]
        } else {
            let mut tools = Vec::new();
            if std::env::var_os("WAYLAND_DISPLAY").is_some() {
                tools.push(Tool::WlCopy);
            }
            if std::env::var_os("DISPLAY").is_some() {
                tools.push(Tool::Xclip);
            }
            tools
        };

        candidates
            .into_iter()
            .find(|tool| program_exists(tool.program()))
            .map(|tool| Self { tool })
    }

    pub fn program(&self) -> &'static str {
        self.tool.program()
    }

    fn run(&self, mime: Option<&str>, payload: &[u8]) -> Result<(), AppError> {
        pipe_to(self.tool.program(), &self.tool.args(mime), payload)
    }
}

/// 把 `payload` 写入子进程标准输入并等待其退出。
///
/// wl-copy / xclip 会 fork 出常驻进程继续持有剪贴板，它继承的输出管道不会关闭，
/// 所以 stdout / stderr 都不接管道，只等待直接子进程。
fn pipe_to(program: &str, args: &[String], payload: &[u8]) -> Result<(), AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AppError::Clipboard(format!("启动 {} 失败: {}", program, e)))?;

    let written = match child.stdin.take() {
        // 离开作用域即关闭 stdin，工具读到 EOF 后开始工作
        Some(mut stdin) => stdin.write_all(payload),
        None => Ok(()),
    };

    if let Err(e) = written {
        if let Err(kill_err) = child.kill() {
            log::debug!("结束 {} 失败: {}", program, kill_err);
        }
        let _ = child.wait();
        return Err(AppError::Clipboard(format!("写入 {} 失败: {}", program, e)));
    }

    let status = child
        .wait()
        .map_err(|e| AppError::Clipboard(format!("等待 {} 退出失败: {}", program, e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(AppError::Clipboard(format!(
            "{} 退出码 {:?}",
            program,
            status.code()
        )))
    }
}

fn program_exists(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };

    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || candidate.with_extension("exe").is_file()
    })
}

impl ClipboardStrategy for CommandClipboard {
    fn name(&self) -> &'static str {
        "command"
    }

    fn supports(&self, content: &ClipboardContent) -> bool {
        match content {
            ClipboardContent::Text(_) => true,
            ClipboardContent::Image(_) => self.tool.supports_images(),
        }
    }

    fn write(&self, content: &ClipboardContent) -> Result<(), AppError> {
        match content {
            ClipboardContent::Text(text) => self.run(None, text.as_bytes()),
            ClipboardContent::Image(image) => self.run(Some(&image.mime), &image.bytes),
        }
    }
}
