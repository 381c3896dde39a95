//! 摄像头会话控制器
//!
//! 负责获取视频流和检测模型，并保证在任何退出路径上都释放它们。
//! 状态机：Idle → Loading → Running → Idle，Loading/Running → Error → Idle。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::detect_loop::{DetectionLoop, DisplayControls, LoopExit, SharedSurface};
use crate::error::SessionError;
use crate::media::{FrameInfo, MediaDevices, MediaStream, StreamConstraints, VideoSink};
use crate::overlay::OverlaySurface;
use crate::threshold::{AdaptiveController, ThresholdPolicy, ThresholdState};
use crate::utils::muloop::MultiLoop;
use crate::utils::stream::{StreamReader, latest};
use crate::vision::{Detection, ModelProvider};

const EVENT_CAPACITY: usize = 16;

/// 会话对外可见的状态
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Loading,
    Running,
    Error(SessionError),
}

/// 运行中的会话持有的资源
struct Running {
    stream: Arc<dyn MediaStream>,
    /// 检测循环任务，模型句柄归它所有
    detection: MultiLoop<LoopExit>,
    controller: Option<MultiLoop<()>>,
    snapshot: StreamReader<Detection>,
    frame: FrameInfo,
}

impl Running {
    /// 停止所有循环并关闭视频流，返回检测循环自行结束时的退出原因
    async fn shutdown(self) -> Option<LoopExit> {
        let exit = self.detection.stop().await;
        if let Some(controller) = self.controller {
            controller.stop().await;
        }
        self.stream.stop();
        exit
    }
}

enum Phase {
    Idle,
    /// 已拿到视频流但模型尚未就绪
    Loading(Option<Arc<dyn MediaStream>>),
    Running(Running),
    Error(SessionError),
}

/// 摄像头会话
pub struct CameraSession {
    devices: Arc<dyn MediaDevices>,
    models: Arc<dyn ModelProvider>,
    sink: Arc<VideoSink>,
    surface: SharedSurface,
    threshold: Arc<ThresholdState>,
    display: Arc<DisplayControls>,
    policy: ThresholdPolicy,
    frame_interval: Duration,
    /// 用户手动设置的阈值，关闭自适应时每次启动恢复
    manual_threshold: f32,
    phase: Phase,
    events: broadcast::Sender<SessionState>,
}

impl CameraSession {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        models: Arc<dyn ModelProvider>,
        surface: SharedSurface,
        settings: &Settings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            devices,
            models,
            sink: Arc::new(VideoSink::new()),
            surface,
            threshold: Arc::new(ThresholdState::new(&settings.threshold)),
            display: Arc::new(DisplayControls::new(
                settings.display.show_overlays,
                settings.display.dynamic_threshold,
            )),
            policy: settings.threshold,
            frame_interval: settings.frame_interval,
            manual_threshold: settings.threshold.initial,
            phase: Phase::Idle,
            events,
        }
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        match &self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Loading(_) => SessionState::Loading,
            Phase::Running(_) => SessionState::Running,
            Phase::Error(err) => SessionState::Error(err.clone()),
        }
    }

    /// 当前错误的用户提示
    pub fn error_message(&self) -> Option<String> {
        match &self.phase {
            Phase::Error(err) => Some(err.to_string()),
            _ => None,
        }
    }

    /// 是否持有视频流
    pub fn holds_stream(&self) -> bool {
        match &self.phase {
            Phase::Loading(stream) => stream.is_some(),
            Phase::Running(_) => true,
            Phase::Idle | Phase::Error(_) => false,
        }
    }

    /// 是否持有模型句柄
    pub fn holds_model(&self) -> bool {
        matches!(self.phase, Phase::Running(_))
    }

    /// 运行中会话的帧尺寸
    pub fn frame_info(&self) -> Option<FrameInfo> {
        match &self.phase {
            Phase::Running(running) => Some(running.frame),
            _ => None,
        }
    }

    pub fn sink(&self) -> &Arc<VideoSink> {
        &self.sink
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.get()
    }

    /// 最近一帧的检测结果，未运行时为空
    pub fn latest_detections(&self) -> Arc<[Detection]> {
        match &self.phase {
            Phase::Running(running) => running.snapshot.latest(),
            _ => Arc::from(Vec::new()),
        }
    }

    pub fn show_overlays(&self) -> bool {
        self.display.show_overlays()
    }

    pub fn set_show_overlays(&self, show: bool) {
        self.display.set_show_overlays(show);
    }

    pub fn dynamic_threshold(&self) -> bool {
        self.display.dynamic_threshold()
    }

    /// 开关自适应阈值；运行中会立即启动或停止控制器
    pub async fn set_dynamic_threshold(&mut self, enabled: bool) {
        self.display.set_dynamic_threshold(enabled);
        let Phase::Running(running) = &mut self.phase else {
            return;
        };
        match (enabled, running.controller.is_some()) {
            (true, false) => {
                let reader = running.snapshot.clone();
                running.controller = Some(spawn_controller(
                    self.policy,
                    reader,
                    Arc::clone(&self.threshold),
                ));
            }
            (false, true) => {
                if let Some(controller) = running.controller.take() {
                    controller.stop().await;
                }
                self.manual_threshold = self.threshold.get();
            }
            _ => {}
        }
    }

    /// 手动设置阈值，自适应模式开启时不生效并返回 `false`
    pub fn set_manual_threshold(&mut self, value: f32) -> bool {
        if self.display.dynamic_threshold() {
            return false;
        }
        self.manual_threshold = self.threshold.set(value);
        true
    }

    fn transition(&mut self, phase: Phase) {
        self.phase = phase;
        let state = self.state();
        info!(state = ?state, "会话状态变化");
        let _ = self.events.send(state);
    }

    /// 启动会话
    ///
    /// 先完整停止上一次会话，然后依次检查运行环境、获取摄像头、等待视频元数据、加载模型。
    /// 任一步骤失败都会释放已获取的资源并进入 Error 状态。
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.stop().await;
        self.transition(Phase::Loading(None));

        match self.acquire().await {
            Ok(running) => {
                info!(
                    width = running.frame.width,
                    height = running.frame.height,
                    "检测已启动"
                );
                self.transition(Phase::Running(running));
                Ok(())
            }
            Err(err) => {
                error!("会话启动失败: {err}");
                self.release_loading();
                self.transition(Phase::Error(err.clone()));
                Err(err)
            }
        }
    }

    async fn acquire(&mut self) -> Result<Running, SessionError> {
        if !self.devices.is_secure_context() {
            return Err(SessionError::InsecureContext);
        }
        if !self.devices.supports_capture() {
            return Err(SessionError::CaptureUnsupported);
        }

        let stream = match self
            .devices
            .request_stream(&StreamConstraints::environment())
            .await
        {
            Ok(stream) => stream,
            Err(first) => {
                warn!("无法打开后置摄像头，改用默认摄像头: {first}");
                self.devices
                    .request_stream(&StreamConstraints::any())
                    .await
                    .map_err(SessionError::from)?
            }
        };
        info!(camera = %stream.label(), "摄像头已打开");
        self.phase = Phase::Loading(Some(Arc::clone(&stream)));

        self.sink.bind(Arc::clone(&stream));
        let frame = self.sink.loaded().await?;

        let model = self
            .models
            .load()
            .await
            .map_err(|e| SessionError::ModelLoad(e.to_string()))?;

        // 自适应模式下保留控制器上次收敛到的值
        if !self.display.dynamic_threshold() {
            self.threshold.set(self.manual_threshold);
        }
        let (writer, reader) = latest::<Detection>();
        let detection_loop = DetectionLoop::new(
            model,
            Arc::clone(&self.sink),
            Arc::clone(&self.surface),
            writer,
            Arc::clone(&self.threshold),
            Arc::clone(&self.display),
        );
        let frame_interval = self.frame_interval;
        let detection = MultiLoop::spawn(move |stop| detection_loop.run(stop, frame_interval));

        let controller = self.display.dynamic_threshold().then(|| {
            spawn_controller(self.policy, reader.clone(), Arc::clone(&self.threshold))
        });

        Ok(Running {
            stream,
            detection,
            controller,
            snapshot: reader,
            frame,
        })
    }

    /// 释放 Loading 阶段已获取的视频流
    fn release_loading(&mut self) {
        if let Phase::Loading(Some(stream)) = std::mem::replace(&mut self.phase, Phase::Idle) {
            stream.stop();
        }
        self.sink.clear();
    }

    fn clear_surface(&self) {
        let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
        surface.clear();
    }

    /// 停止会话并释放全部资源
    ///
    /// 可以在任何状态下重复调用；返回后检测循环和控制器都不会再执行。
    pub async fn stop(&mut self) {
        let was_idle = matches!(self.phase, Phase::Idle);
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Running(running) => {
                running.shutdown().await;
                self.clear_surface();
            }
            Phase::Loading(Some(stream)) => stream.stop(),
            Phase::Loading(None) | Phase::Idle | Phase::Error(_) => {}
        }
        self.sink.clear();
        if !was_idle {
            self.transition(Phase::Idle);
        }
    }

    /// 检查运行中的检测循环
    ///
    /// 循环因视频流结束而退出时，释放资源并进入 `Error(DeviceLost)`。
    pub async fn check_health(&mut self) -> SessionState {
        let finished = matches!(&self.phase, Phase::Running(r) if r.detection.is_finished());
        if !finished {
            return self.state();
        }
        let Phase::Running(running) = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return self.state();
        };

        let exit = running.shutdown().await;
        self.sink.clear();
        self.clear_surface();
        let err = match exit {
            Some(LoopExit::DeviceLost) => SessionError::DeviceLost,
            Some(LoopExit::Stopped) | None => {
                SessionError::Setup("detection loop ended unexpectedly".into())
            }
        };
        error!("检测循环异常结束: {err}");
        self.transition(Phase::Error(err));
        self.state()
    }
}

fn spawn_controller(
    policy: ThresholdPolicy,
    snapshot: StreamReader<Detection>,
    state: Arc<ThresholdState>,
) -> MultiLoop<()> {
    let controller = AdaptiveController::new(policy);
    MultiLoop::spawn(move |stop| controller.run(snapshot, state, stop))
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            // 循环任务在 MultiLoop 析构时被中止
            Phase::Running(running) => running.stream.stop(),
            Phase::Loading(Some(stream)) => stream.stop(),
            _ => {}
        }
        self.sink.clear();
    }
}

/// 包装绘图表面，调用方保留具体类型，克隆后可转换为 [`SharedSurface`] 交给会话
pub fn shared_surface<S: OverlaySurface + 'static>(surface: S) -> Arc<Mutex<S>> {
    Arc::new(Mutex::new(surface))
}
