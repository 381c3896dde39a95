use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::DynamicImage;

use crate::error::MediaError;
use crate::media::{FrameInfo, MediaStream};

/// 视频接收端的就绪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// 未绑定或元数据尚未加载
    Unavailable,
    /// 可以读取完整帧
    Ready,
    /// 绑定的流已经结束（设备丢失）
    Ended,
}

#[derive(Default)]
struct Binding {
    stream: Option<Arc<dyn MediaStream>>,
    info: Option<FrameInfo>,
}

/// 视频接收端
///
/// 会话控制器把视频流绑定到这里，检测循环从这里读取帧。
#[derive(Default)]
pub struct VideoSink {
    binding: Mutex<Binding>,
}

impl VideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bind(&self, stream: Arc<dyn MediaStream>) {
        *self.lock() = Binding {
            stream: Some(stream),
            info: None,
        };
    }

    /// 解除绑定
    pub fn clear(&self) {
        *self.lock() = Binding::default();
    }

    pub fn is_bound(&self) -> bool {
        self.lock().stream.is_some()
    }

    /// 等待已绑定流的元数据加载完成
    pub async fn loaded(&self) -> Result<FrameInfo, MediaError> {
        let stream = self.lock().stream.clone().ok_or(MediaError::Unbound)?;
        let info = stream.metadata().await?;

        let mut binding = self.lock();
        match &binding.stream {
            Some(current) if Arc::ptr_eq(current, &stream) => {
                binding.info = Some(info);
                Ok(info)
            }
            _ => Err(MediaError::Unbound),
        }
    }

    pub fn readiness(&self) -> Readiness {
        let binding = self.lock();
        match (&binding.stream, binding.info) {
            (None, _) => Readiness::Unavailable,
            (Some(stream), _) if !stream.is_live() => Readiness::Ended,
            (Some(_), None) => Readiness::Unavailable,
            (Some(_), Some(_)) => Readiness::Ready,
        }
    }

    /// 当前帧，只有在 [`Readiness::Ready`] 时才会返回
    pub fn current_frame(&self) -> Option<DynamicImage> {
        let stream = {
            let binding = self.lock();
            binding.info?;
            binding.stream.clone()?
        };
        stream.grab()
    }
}
