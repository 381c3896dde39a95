use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use image::DynamicImage;
use ort::session::{Session, builder::GraphOptimizationLevel};
use tracing::{debug, info};

use crate::config::ModelSettings;
use crate::error::VisionError;
use crate::vision::bounds::Detection;
use crate::vision::infer::run_inference;
use crate::vision::posts::{ScaleMessage, process_detections};
use crate::vision::prevs::image_to_tensor;

/// 已加载的检测模型
#[async_trait]
pub trait DetectionModel: Send {
    /// 对一帧图像执行推理
    async fn detect(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>, VisionError>;
}

/// 同步的单帧检测器
pub trait FrameDetector: Send + 'static {
    fn detect_frame(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>, VisionError>;
}

/// 把同步检测器放到 tokio 阻塞线程池上执行，推理期间不占用异步工作线程
pub struct OffloadedModel<D> {
    detector: Arc<Mutex<D>>,
}

impl<D: FrameDetector> OffloadedModel<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
        }
    }
}

#[async_trait]
impl<D: FrameDetector> DetectionModel for OffloadedModel<D> {
    async fn detect(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>, VisionError> {
        let detector = Arc::clone(&self.detector);
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || {
            let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
            detector.detect_frame(&frame)
        })
        .await
        .map_err(|e| VisionError::Join(e.to_string()))?
    }
}

/// 异步加载检测模型
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn load(&self) -> Result<Box<dyn DetectionModel>, VisionError>;
}

/// 加载YOLO模型
///
/// 加载ONNX格式的YOLO模型，并应用优化配置。
pub fn load_model(model_path: &Path, intra_threads: usize) -> Result<Session, VisionError> {
    if !model_path.exists() {
        return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
    }
    let model = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(model_path)?;
    Ok(model)
}

/// YOLO目标检测器
///
/// 封装了图像预处理、模型推理和结果后处理。
pub struct OnnxDetector {
    /// ONNX模型会话
    model: Session,
    input_name: String,
    input_width: usize,
    input_height: usize,
    score_floor: f32,
    nms_threshold: f32,
}

impl OnnxDetector {
    pub fn new(model: Session, settings: &ModelSettings) -> Self {
        Self {
            model,
            input_name: settings.input_name.clone(),
            input_width: settings.input_width,
            input_height: settings.input_height,
            score_floor: settings.score_floor,
            nms_threshold: settings.nms_threshold,
        }
    }
}

impl FrameDetector for OnnxDetector {
    /// 完整的检测流程：从图像到检测结果
    fn detect_frame(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>, VisionError> {
        let message = ScaleMessage {
            o_width: frame.width(),
            o_height: frame.height(),
            s_width: self.input_width,
            s_height: self.input_height,
        };
        let input = image_to_tensor(frame, self.input_height, self.input_width);

        let start_time = Instant::now();
        let output = run_inference(&mut self.model, &self.input_name, &input)?;
        debug!(elapsed = ?start_time.elapsed(), "模型推理完成");

        Ok(process_detections(
            &output,
            &message,
            self.score_floor,
            self.nms_threshold,
        ))
    }
}

/// 从ONNX文件加载 [`OnnxDetector`]
#[derive(Debug, Clone)]
pub struct OnnxModelProvider {
    settings: ModelSettings,
}

impl OnnxModelProvider {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }

    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.settings.path)
    }
}

#[async_trait]
impl ModelProvider for OnnxModelProvider {
    async fn load(&self) -> Result<Box<dyn DetectionModel>, VisionError> {
        let path = self.model_path();
        let threads = self.settings.intra_threads;
        let session = tokio::task::spawn_blocking(move || load_model(&path, threads))
            .await
            .map_err(|e| VisionError::Join(e.to_string()))??;
        info!(path = %self.settings.path, "模型加载完成");
        Ok(Box::new(OffloadedModel::new(OnnxDetector::new(
            session,
            &self.settings,
        ))))
    }
}
