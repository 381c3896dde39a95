//! 媒体采集接口
//!
//! 摄像头设备与视频流以 trait 的形式提供给会话控制器，
//! [`still`] 中是基于图片目录的实现。

use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;

use crate::error::{AcquireError, MediaError};

pub mod sink;
pub mod still;

pub use sink::{Readiness, VideoSink};
pub use still::{ImageDirDevices, StillStream};

/// 摄像头朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// 后置摄像头
    Environment,
    /// 前置摄像头
    User,
}

/// 请求视频流时的约束条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamConstraints {
    /// `None` 表示任意摄像头
    pub facing: Option<FacingMode>,
}

impl StreamConstraints {
    pub fn environment() -> Self {
        Self {
            facing: Some(FacingMode::Environment),
        }
    }

    pub fn any() -> Self {
        Self { facing: None }
    }
}

/// 帧尺寸信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
}

/// 已获取的视频流
#[async_trait]
pub trait MediaStream: Send + Sync {
    fn label(&self) -> String;

    /// 停止流上的所有轨道，可重复调用
    fn stop(&self);

    fn is_live(&self) -> bool;

    /// 等待流的元数据（帧尺寸）可用
    async fn metadata(&self) -> Result<FrameInfo, MediaError>;

    /// 最新一帧，暂无可用帧时返回 `None`
    fn grab(&self) -> Option<DynamicImage>;
}

/// 摄像头设备访问
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// 运行环境是否满足安全上下文要求
    fn is_secure_context(&self) -> bool {
        true
    }

    /// 运行环境是否提供摄像头采集接口
    fn supports_capture(&self) -> bool {
        true
    }

    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, AcquireError>;
}
