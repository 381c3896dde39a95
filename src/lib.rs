pub mod config;
pub mod detect_loop;
pub mod error;
pub mod media;
pub mod overlay;
pub mod session;
pub mod threshold;
pub mod utils;
pub mod vision;

// 重新导出常用类型
pub use config::Settings;
pub use detect_loop::{DetectionLoop, DisplayControls, LoopExit, SharedSurface, StepOutcome};
pub use error::{AcquireError, ErrorKind, MediaError, SessionError, VisionError};
pub use media::{ImageDirDevices, MediaDevices, MediaStream, StreamConstraints, VideoSink};
pub use overlay::{Canvas, OverlaySurface, RaqoteSurface, render_detections};
pub use session::{CameraSession, SessionState, shared_surface};
pub use threshold::{AdaptiveController, ThresholdPolicy, ThresholdState};
pub use vision::{BoundingBox, Detection, DetectionModel, ModelProvider, OnnxModelProvider};
