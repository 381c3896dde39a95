//! 检测循环
//!
//! 每个帧周期执行一次：读取当前帧、推理、发布快照、重绘叠加层。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::media::{FrameInfo, Readiness, VideoSink};
use crate::overlay::{OverlaySurface, render_detections};
use crate::threshold::ThresholdState;
use crate::utils::muloop::{StopSignal, ticker};
use crate::utils::stream::StreamWriter;
use crate::vision::{Detection, DetectionModel};

/// 检测循环与会话共享的绘图表面
pub type SharedSurface = Arc<Mutex<dyn OverlaySurface>>;

/// 用户可控的显示开关
#[derive(Debug)]
pub struct DisplayControls {
    show_overlays: AtomicBool,
    dynamic_threshold: AtomicBool,
}

impl DisplayControls {
    pub fn new(show_overlays: bool, dynamic_threshold: bool) -> Self {
        Self {
            show_overlays: AtomicBool::new(show_overlays),
            dynamic_threshold: AtomicBool::new(dynamic_threshold),
        }
    }

    pub fn show_overlays(&self) -> bool {
        self.show_overlays.load(Ordering::Acquire)
    }

    pub fn set_show_overlays(&self, show: bool) {
        self.show_overlays.store(show, Ordering::Release);
    }

    pub fn dynamic_threshold(&self) -> bool {
        self.dynamic_threshold.load(Ordering::Acquire)
    }

    pub fn set_dynamic_threshold(&self, enabled: bool) {
        self.dynamic_threshold.store(enabled, Ordering::Release);
    }
}

/// 检测循环的退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// 收到停止信号
    Stopped,
    /// 绑定的视频流已经结束
    DeviceLost,
}

/// 单次迭代的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 帧尚未就绪，跳过本次迭代
    Skipped,
    /// 推理失败，丢弃本帧，下一帧重试
    Failed,
    /// 完成推理与渲染，附带绘制的标注数量
    Rendered(usize),
    DeviceLost,
}

/// 检测循环
///
/// 独占模型句柄；是叠加层和检测快照唯一的写者。
pub struct DetectionLoop {
    model: Box<dyn DetectionModel>,
    sink: Arc<VideoSink>,
    surface: SharedSurface,
    snapshot: StreamWriter<Detection>,
    threshold: Arc<ThresholdState>,
    display: Arc<DisplayControls>,
}

impl DetectionLoop {
    pub fn new(
        model: Box<dyn DetectionModel>,
        sink: Arc<VideoSink>,
        surface: SharedSurface,
        snapshot: StreamWriter<Detection>,
        threshold: Arc<ThresholdState>,
        display: Arc<DisplayControls>,
    ) -> Self {
        Self {
            model,
            sink,
            surface,
            snapshot,
            threshold,
            display,
        }
    }

    /// 执行一次迭代
    pub async fn step(&mut self) -> StepOutcome {
        match self.sink.readiness() {
            Readiness::Unavailable => return StepOutcome::Skipped,
            Readiness::Ended => return StepOutcome::DeviceLost,
            Readiness::Ready => {}
        }
        let Some(frame) = self.sink.current_frame() else {
            return StepOutcome::Skipped;
        };

        let detections: Arc<[Detection]> = match self.model.detect(&frame).await {
            Ok(detections) => detections.into(),
            Err(e) => {
                warn!("推理过程中发生错误，跳过本帧: {e}");
                return StepOutcome::Failed;
            }
        };
        self.snapshot.publish(Arc::clone(&detections));

        let info = FrameInfo {
            width: frame.width(),
            height: frame.height(),
        };
        // 阈值在渲染开始时读取一次，本帧内不再变化
        let threshold = self.threshold.get();
        let show = self.display.show_overlays();
        let drawn = {
            let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
            render_detections(&mut *surface, info, &detections, show, threshold)
        };
        StepOutcome::Rendered(drawn)
    }

    /// 按固定帧周期运行，直到收到停止信号或视频流结束
    pub async fn run(mut self, mut stop: StopSignal, frame_interval: Duration) -> LoopExit {
        let mut clock = ticker(frame_interval);
        while stop.tick(&mut clock).await {
            if self.step().await == StepOutcome::DeviceLost {
                warn!("视频流已结束，检测循环退出");
                return LoopExit::DeviceLost;
            }
        }
        debug!("检测循环已停止");
        LoopExit::Stopped
    }
}
