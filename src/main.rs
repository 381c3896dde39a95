use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{Instant, sleep_until};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use camsight::config::DEFAULT_STILL_FRAME_INTERVAL_MS;
use camsight::{
    CameraSession, ImageDirDevices, OnnxModelProvider, RaqoteSurface, SessionState, Settings,
    SharedSurface, shared_surface,
};

/// 在图片目录模拟的摄像头上运行实时目标检测
#[derive(Debug, Parser)]
#[command(name = "camsight", version)]
struct Args {
    /// TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 帧目录，`environment/` 子目录作为后置摄像头
    #[arg(long, default_value = "frames")]
    frames: PathBuf,

    /// ONNX 模型路径，覆盖配置文件
    #[arg(long)]
    model: Option<String>,

    /// 运行时长（秒）
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// 开启自适应阈值
    #[arg(long)]
    dynamic: bool,

    /// 不绘制检测框
    #[arg(long)]
    hide_overlays: bool,

    /// 手动阈值
    #[arg(long)]
    threshold: Option<f32>,

    /// 结束前把最后一帧和叠加层合成保存到此路径
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(model) = &args.model {
        settings.model.path = model.clone();
    }
    if args.dynamic {
        settings.display.dynamic_threshold = true;
    }
    if args.hide_overlays {
        settings.display.show_overlays = false;
    }
    settings.validate()?;

    let devices = Arc::new(ImageDirDevices::new(
        &args.frames,
        Duration::from_millis(DEFAULT_STILL_FRAME_INTERVAL_MS),
    ));
    let models = Arc::new(OnnxModelProvider::new(settings.model.clone()));
    let surface = shared_surface(RaqoteSurface::new(1, 1));
    let shared: SharedSurface = surface.clone();

    let mut session = CameraSession::new(devices, models, shared, &settings);
    if let Some(value) = args.threshold {
        if !session.set_manual_threshold(value) {
            warn!("自适应阈值已开启，忽略手动阈值 {value}");
        }
    }

    if let Err(err) = session.start().await {
        error!("{err}");
        return Err(err.into());
    }

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = sleep_until(deadline) => break,
            _ = &mut ctrl_c => {
                info!("收到中断信号");
                break;
            }
            _ = report.tick() => {
                if let SessionState::Error(err) = session.check_health().await {
                    error!("{err}");
                    return Err(err.into());
                }
                let detections = session.latest_detections();
                info!(
                    threshold = session.threshold(),
                    detections = detections.len(),
                    "检测中"
                );
            }
        }
    }

    if let Some(path) = &args.snapshot {
        match session.sink().current_frame() {
            Some(frame) => {
                let surface = surface.lock().unwrap_or_else(PoisonError::into_inner);
                surface
                    .save_composite(&frame, path)
                    .with_context(|| format!("saving snapshot {}", path.display()))?;
                info!(path = %path.display(), "已保存检测结果");
            }
            None => warn!("没有可用的帧，跳过保存"),
        }
    }

    session.stop().await;
    info!(threshold = session.threshold(), "会话已结束");
    Ok(())
}
