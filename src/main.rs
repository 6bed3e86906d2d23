//! # 推送剪贴板客户端 — 程序入口
//!
//! 本文件仅负责命令行解析、日志初始化、组件装配与设置热加载。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use push_clipboard::clipboard::ClipboardChain;
use push_clipboard::delivery::DeliveryPipeline;
use push_clipboard::editor::{DraftFile, EditorSink};
use push_clipboard::error::AppError;
use push_clipboard::image_handler::{ImageConfig, ImageNormalizer};
use push_clipboard::push::{PushClient, WsTransport};
use push_clipboard::settings::PushSettings;
use push_clipboard::status::StatusLog;

#[derive(Parser, Debug, Clone)]
#[command(name = "push-clipboard", version, about = "接收推送消息并写入剪贴板与草稿")]
struct Cli {
    /// 设置文件路径
    #[arg(long, env = "PUSH_CLIPBOARD_SETTINGS", default_value = "push-settings.json")]
    settings: PathBuf,

    /// 覆盖设置中的 webhook_url
    #[arg(long, env = "PUSH_CLIPBOARD_URL")]
    url: Option<String>,

    /// 覆盖设置中的 webhook_token
    #[arg(long, env = "PUSH_CLIPBOARD_TOKEN")]
    token: Option<String>,

    /// 覆盖设置中的草稿文件路径
    #[arg(long)]
    draft: Option<PathBuf>,

    /// 设置文件检查间隔（秒）
    #[arg(long, default_value_t = 2)]
    reload_secs: u64,

    /// 打印推送页面地址后退出
    #[arg(long, default_value_t = false)]
    print_push_url: bool,
}

impl Cli {
    /// 读取设置文件并叠加命令行覆盖项。
    fn load_settings(&self) -> Result<PushSettings, AppError> {
        let mut settings = PushSettings::load(&self.settings)?;
        if let Some(url) = &self.url {
            settings.webhook_url = url.clone();
        }
        if let Some(token) = &self.token {
            settings.webhook_token = token.clone();
        }
        if let Some(draft) = &self.draft {
            settings.editor_draft_path = Some(draft.clone());
        }
        Ok(settings)
    }
}

fn editor_for(settings: &PushSettings) -> Option<Arc<dyn EditorSink>> {
    settings.editor_draft_path.as_ref().map(|path| {
        log::info!("📝 草稿文件：{}（{:?}）", path.display(), settings.editor_format);
        Arc::new(DraftFile::new(path.clone(), settings.editor_format)) as Arc<dyn EditorSink>
    })
}

/// 应用新设置中发生变化的部分。
async fn apply_changes(
    previous: &PushSettings,
    next: &PushSettings,
    client: &PushClient,
    pipeline: &DeliveryPipeline,
    status: &StatusLog,
) -> Result<(), AppError> {
    log::info!("⚙️ 检测到设置变化，重新应用");

    if previous.max_log_entries != next.max_log_entries {
        status.set_capacity(next.max_log_entries);
    }
    if previous.image_profile != next.image_profile {
        if let Err(err) = pipeline
            .normalizer()
            .set_performance_profile(next.image_profile())
        {
            log::warn!("⚠️ 切换图片档位失败：{}", err);
        }
    }
    if previous.editor_draft_path != next.editor_draft_path
        || previous.editor_format != next.editor_format
    {
        pipeline.set_editor(editor_for(next));
    }

    client.apply_settings(next).await
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        log::debug!("TLS 加密后端已安装");
    }

    let mut settings = cli.load_settings()?;

    if cli.print_push_url {
        println!("{}", settings.push_page_url()?);
        return Ok(());
    }

    let status = StatusLog::new(settings.max_log_entries);
    let normalizer = ImageNormalizer::new(ImageConfig::with_profile(settings.image_profile()));
    let clipboard = ClipboardChain::system(&normalizer.config_snapshot()?);
    log::info!("📋 剪贴板策略：{}", clipboard.strategy_names().join(" → "));

    let pipeline = DeliveryPipeline::new(clipboard, normalizer, status.clone());
    pipeline.set_editor(editor_for(&settings));
    let (queue, delivery_task) = pipeline.spawn();

    let (client, manager_task) = PushClient::spawn(
        Arc::new(WsTransport::default()),
        settings.reconnect_policy(),
        status.clone(),
        queue,
    );
    client.apply_settings(&settings).await?;

    let mut reload = tokio::time::interval(Duration::from_secs(cli.reload_secs.max(1)));
    // 第一次 tick 立即返回
    reload.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("🛑 收到退出信号，正在关闭推送连接");
                break;
            }
            _ = reload.tick() => {
                match cli.load_settings() {
                    Ok(next) if next != settings => {
                        apply_changes(&settings, &next, &client, &pipeline, &status).await?;
                        settings = next;
                    }
                    Ok(_) => {}
                    Err(err) => log::warn!("⚠️ 设置重新加载失败，继续使用上一份设置：{}", err),
                }
            }
        }
    }

    client.shutdown().await?;
    if let Err(err) = manager_task.await {
        log::warn!("连接管理器任务异常退出：{}", err);
    }
    // 管理器退出后投递队列关闭，等待剩余投递完成
    drop(pipeline);
    if let Err(err) = delivery_task.await {
        log::warn!("投递任务异常退出：{}", err);
    }

    log::info!("👋 已退出");
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()).await {
        log::error!("❌ {}", err);
        std::process::exit(1);
    }
}
