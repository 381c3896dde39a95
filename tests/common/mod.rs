#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use camsight::media::{FrameInfo, MediaDevices, MediaStream, StreamConstraints};
use camsight::overlay::{Canvas, Color, OverlaySurface};
use camsight::{
    AcquireError, BoundingBox, Detection, DetectionModel, MediaError, ModelProvider, Settings,
    SharedSurface, ThresholdPolicy, VisionError, shared_surface,
};
use image::{DynamicImage, RgbImage};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

pub fn fast_settings() -> Settings {
    Settings {
        frame_interval: Duration::from_millis(2),
        threshold: ThresholdPolicy {
            period: Duration::from_millis(5),
            ..ThresholdPolicy::default()
        },
        ..Settings::default()
    }
}

pub fn detection(label: &str, score: f32) -> Detection {
    Detection::new(BoundingBox::new(4.0, 4.0, 20.0, 16.0), 0, label, score)
}

/// 轮询直到条件成立，超时返回 `false`
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    check()
}

pub struct FakeStream {
    pub live: AtomicBool,
    pub stops: AtomicUsize,
    pub fail_metadata: bool,
}

impl FakeStream {
    pub fn new(fail_metadata: bool) -> Self {
        Self {
            live: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
            fail_metadata,
        }
    }

    /// 模拟设备被拔出
    pub fn unplug(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stops.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl MediaStream for FakeStream {
    fn label(&self) -> String {
        "fake".into()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn metadata(&self) -> Result<FrameInfo, MediaError> {
        if self.fail_metadata {
            return Err(MediaError::Metadata("no video track".into()));
        }
        Ok(FrameInfo {
            width: WIDTH,
            height: HEIGHT,
        })
    }

    fn grab(&self) -> Option<DynamicImage> {
        self.is_live()
            .then(|| DynamicImage::ImageRgb8(RgbImage::new(WIDTH, HEIGHT)))
    }
}

pub struct FakeDevices {
    pub secure: bool,
    pub supported: bool,
    pub environment: Mutex<Result<(), AcquireError>>,
    pub fallback: Mutex<Result<(), AcquireError>>,
    pub fail_metadata: bool,
    pub requests: Mutex<Vec<StreamConstraints>>,
    pub streams: Mutex<Vec<Arc<FakeStream>>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self {
            secure: true,
            supported: true,
            environment: Mutex::new(Ok(())),
            fallback: Mutex::new(Ok(())),
            fail_metadata: false,
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(
        environment: Result<(), AcquireError>,
        fallback: Result<(), AcquireError>,
    ) -> Self {
        let devices = Self::new();
        *devices.environment.lock().unwrap() = environment;
        *devices.fallback.lock().unwrap() = fallback;
        devices
    }

    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_stream(&self) -> Option<Arc<FakeStream>> {
        self.streams.lock().unwrap().last().cloned()
    }

    pub fn all_streams_stopped(&self) -> bool {
        self.streams.lock().unwrap().iter().all(|s| s.stopped())
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    fn is_secure_context(&self) -> bool {
        self.secure
    }

    fn supports_capture(&self) -> bool {
        self.supported
    }

    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, AcquireError> {
        self.requests.lock().unwrap().push(*constraints);
        let outcome = if constraints.facing.is_some() {
            self.environment.lock().unwrap().clone()
        } else {
            self.fallback.lock().unwrap().clone()
        };
        outcome?;
        let stream = Arc::new(FakeStream::new(self.fail_metadata));
        self.streams.lock().unwrap().push(Arc::clone(&stream));
        Ok(stream)
    }
}

/// 模型的共享控制面板
#[derive(Clone, Default)]
pub struct ModelControls {
    pub detections: Arc<Mutex<Vec<Detection>>>,
    pub fail: Arc<AtomicBool>,
    pub live: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
}

impl ModelControls {
    pub fn set_detections(&self, detections: Vec<Detection>) {
        *self.detections.lock().unwrap() = detections;
    }

    pub fn live_models(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct FakeModel {
    controls: ModelControls,
}

impl FakeModel {
    pub fn new(controls: ModelControls) -> Self {
        controls.live.fetch_add(1, Ordering::SeqCst);
        Self { controls }
    }
}

impl Drop for FakeModel {
    fn drop(&mut self) {
        self.controls.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DetectionModel for FakeModel {
    async fn detect(&mut self, _frame: &DynamicImage) -> Result<Vec<Detection>, VisionError> {
        self.controls.calls.fetch_add(1, Ordering::SeqCst);
        if self.controls.fail.load(Ordering::SeqCst) {
            return Err(VisionError::Output("synthetic failure".into()));
        }
        Ok(self.controls.detections.lock().unwrap().clone())
    }
}

pub struct FakeModels {
    pub controls: ModelControls,
    pub fail_load: bool,
    pub loads: AtomicUsize,
}

impl FakeModels {
    pub fn new(controls: ModelControls) -> Self {
        Self {
            controls,
            fail_load: false,
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ModelProvider for FakeModels {
    async fn load(&self) -> Result<Box<dyn DetectionModel>, VisionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(VisionError::Output("weights are corrupt".into()));
        }
        Ok(Box::new(FakeModel::new(self.controls.clone())))
    }
}

/// 记录每次绘制调用的表面
#[derive(Default)]
pub struct RecordingSurface {
    pub size: (u32, u32),
    pub clears: usize,
    pub boxes: Vec<BoundingBox>,
    pub texts: Vec<String>,
}

impl OverlaySurface for RecordingSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self) {
        self.clears += 1;
        self.boxes.clear();
        self.texts.clear();
    }

    fn draw(&mut self, paint: &mut dyn FnMut(&mut dyn Canvas)) {
        paint(self);
    }
}

impl Canvas for RecordingSurface {
    fn stroke_rect(&mut self, rect: &BoundingBox, _color: Color, _line_width: f32) {
        self.boxes.push(*rect);
    }

    fn fill_rect(&mut self, _rect: &BoundingBox, _color: Color) {}

    fn fill_text(&mut self, text: &str, _x: f32, _y: f32, _color: Color, _size: f32) {
        self.texts.push(text.to_string());
    }

    fn measure_text(&self, text: &str, size: f32) -> f32 {
        text.len() as f32 * size * 0.5
    }
}

pub fn recording_surface() -> (Arc<Mutex<RecordingSurface>>, SharedSurface) {
    let surface = shared_surface(RecordingSurface::default());
    let shared: SharedSurface = surface.clone();
    (surface, shared)
}
