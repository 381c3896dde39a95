//! 错误类型
//!
//! 会话错误在获取资源的位置完成分类，`Display` 即为面向用户的提示文本。

use std::path::PathBuf;
use thiserror::Error;

/// 会话错误的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 非安全上下文或运行环境不支持摄像头采集
    UnsupportedEnvironment,
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    ModelLoadFailure,
    /// 会话运行期间摄像头丢失
    DeviceLost,
    UnknownAcquisitionFailure,
}

/// 启动或运行会话时的错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Camera access requires a secure connection (HTTPS).")]
    InsecureContext,

    #[error("Webcam access is not supported by this runtime.")]
    CaptureUnsupported,

    #[error(
        "Camera permission denied. Please allow camera access in your settings and try again."
    )]
    PermissionDenied,

    #[error("No suitable camera found. Please ensure a camera is connected and enabled.")]
    DeviceNotFound,

    #[error(
        "The camera is already in use by another application. Please close the other app and try again."
    )]
    DeviceBusy,

    #[error("Failed to load AI model. Your system might not support the required features: {0}")]
    ModelLoad(String),

    #[error("Failed to setup video stream. Please try again: {0}")]
    Setup(String),

    #[error("The camera stopped delivering frames. Please reconnect it and try again.")]
    DeviceLost,

    #[error("Could not access the camera: {0}.")]
    Acquisition(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsecureContext | Self::CaptureUnsupported => ErrorKind::UnsupportedEnvironment,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::DeviceNotFound => ErrorKind::DeviceNotFound,
            Self::DeviceBusy => ErrorKind::DeviceBusy,
            Self::ModelLoad(_) => ErrorKind::ModelLoadFailure,
            Self::DeviceLost => ErrorKind::DeviceLost,
            Self::Setup(_) | Self::Acquisition(_) => ErrorKind::UnknownAcquisitionFailure,
        }
    }
}

/// 设备层返回的原始失败原因
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcquireError {
    #[error("not allowed")]
    NotAllowed,
    #[error("permission denied")]
    PermissionDenied,
    #[error("device not found")]
    NotFound,
    #[error("constraints cannot be satisfied")]
    Overconstrained,
    #[error("device not readable")]
    NotReadable,
    #[error("track failed to start")]
    TrackStart,
    /// 采集后端（例如 GPU 或编解码器）不可用
    #[error("capture backend unavailable: {0}")]
    Backend(String),
    #[error("{0}")]
    Other(String),
}

impl From<AcquireError> for SessionError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::NotAllowed | AcquireError::PermissionDenied => Self::PermissionDenied,
            AcquireError::NotFound | AcquireError::Overconstrained => Self::DeviceNotFound,
            AcquireError::NotReadable | AcquireError::TrackStart => Self::DeviceBusy,
            AcquireError::Backend(msg) => Self::ModelLoad(msg),
            AcquireError::Other(msg) => Self::Acquisition(msg),
        }
    }
}

/// 视频流绑定与元数据错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediaError {
    #[error("no stream is bound to the video sink")]
    Unbound,
    #[error("the stream has ended")]
    Ended,
    #[error("stream metadata unavailable: {0}")]
    Metadata(String),
}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        Self::Setup(err.to_string())
    }
}

/// 模型加载与推理错误
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("unexpected model output: {0}")]
    Output(String),

    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("model task failed: {0}")]
    Join(String),
}

/// 配置文件错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
