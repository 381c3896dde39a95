//! 基于图片目录的摄像头
//!
//! `<root>/environment/` 下的图片作为后置摄像头，`<root>` 下的图片作为默认摄像头，
//! 按固定帧间隔循环播放。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::DynamicImage;
use tracing::debug;

use crate::error::{AcquireError, MediaError};
use crate::media::{FacingMode, FrameInfo, MediaDevices, MediaStream, StreamConstraints};

const ENVIRONMENT_DIR: &str = "environment";
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 图片目录摄像头
#[derive(Debug, Clone)]
pub struct ImageDirDevices {
    root: PathBuf,
    frame_interval: Duration,
}

impl ImageDirDevices {
    pub fn new(root: impl Into<PathBuf>, frame_interval: Duration) -> Self {
        Self {
            root: root.into(),
            frame_interval,
        }
    }

    fn dir_for(&self, constraints: &StreamConstraints) -> Result<PathBuf, AcquireError> {
        match constraints.facing {
            Some(FacingMode::Environment) => {
                let dir = self.root.join(ENVIRONMENT_DIR);
                if dir.is_dir() {
                    Ok(dir)
                } else {
                    Err(AcquireError::Overconstrained)
                }
            }
            Some(FacingMode::User) | None => {
                if self.root.is_dir() {
                    Ok(self.root.clone())
                } else {
                    Err(AcquireError::NotFound)
                }
            }
        }
    }
}

#[async_trait]
impl MediaDevices for ImageDirDevices {
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, AcquireError> {
        let dir = self.dir_for(constraints)?;
        let label = dir.display().to_string();
        let frames = tokio::task::spawn_blocking(move || load_frames(&dir))
            .await
            .map_err(|e| AcquireError::Other(e.to_string()))??;
        debug!(label = %label, frames = frames.len(), "图片摄像头已打开");
        Ok(Arc::new(StillStream::new(label, frames, self.frame_interval)))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn load_frames(dir: &Path) -> Result<Vec<DynamicImage>, AcquireError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => AcquireError::PermissionDenied,
        std::io::ErrorKind::NotFound => AcquireError::NotFound,
        _ => AcquireError::Other(e.to_string()),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(AcquireError::NotFound);
    }

    paths
        .iter()
        .map(|path| image::open(path).map_err(|_| AcquireError::NotReadable))
        .collect()
}

/// 循环播放一组静态图片的视频流
pub struct StillStream {
    label: String,
    frames: Vec<DynamicImage>,
    frame_interval: Duration,
    started: Instant,
    live: AtomicBool,
}

impl StillStream {
    pub fn new(label: impl Into<String>, frames: Vec<DynamicImage>, frame_interval: Duration) -> Self {
        Self {
            label: label.into(),
            frames,
            frame_interval,
            started: Instant::now(),
            live: AtomicBool::new(true),
        }
    }

    fn frame_index(&self) -> usize {
        if self.frames.len() <= 1 || self.frame_interval.is_zero() {
            return 0;
        }
        let ticks = self.started.elapsed().as_nanos() / self.frame_interval.as_nanos();
        (ticks % self.frames.len() as u128) as usize
    }
}

#[async_trait]
impl MediaStream for StillStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    async fn metadata(&self) -> Result<FrameInfo, MediaError> {
        if !self.is_live() {
            return Err(MediaError::Ended);
        }
        let first = self
            .frames
            .first()
            .ok_or_else(|| MediaError::Metadata("stream has no frames".into()))?;
        Ok(FrameInfo {
            width: first.width(),
            height: first.height(),
        })
    }

    fn grab(&self) -> Option<DynamicImage> {
        if !self.is_live() {
            return None;
        }
        self.frames.get(self.frame_index()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_frame(dir: &Path, name: &str, width: u32, height: u32) {
        std::fs::create_dir_all(dir).unwrap();
        RgbImage::new(width, height).save(dir.join(name)).unwrap();
    }

    #[tokio::test]
    async fn environment_request_needs_environment_dir() {
        let root = tempfile::tempdir().unwrap();
        write_frame(root.path(), "a.png", 8, 6);
        let devices = ImageDirDevices::new(root.path(), Duration::from_millis(10));

        let err = devices
            .request_stream(&StreamConstraints::environment())
            .await
            .err()
            .unwrap();
        assert_eq!(err, AcquireError::Overconstrained);

        let stream = devices.request_stream(&StreamConstraints::any()).await.unwrap();
        assert_eq!(
            stream.metadata().await.unwrap(),
            FrameInfo { width: 8, height: 6 }
        );
    }

    #[tokio::test]
    async fn empty_directory_has_no_camera() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("notes.txt"), "not a frame").unwrap();
        let devices = ImageDirDevices::new(root.path(), Duration::from_millis(10));
        let err = devices
            .request_stream(&StreamConstraints::any())
            .await
            .err()
            .unwrap();
        assert_eq!(err, AcquireError::NotFound);
    }

    #[tokio::test]
    async fn stopped_stream_yields_nothing() {
        let root = tempfile::tempdir().unwrap();
        write_frame(&root.path().join(ENVIRONMENT_DIR), "rear.png", 4, 4);
        let devices = ImageDirDevices::new(root.path(), Duration::from_millis(10));
        let stream = devices
            .request_stream(&StreamConstraints::environment())
            .await
            .unwrap();

        assert!(stream.grab().is_some());
        stream.stop();
        stream.stop();
        assert!(!stream.is_live());
        assert!(stream.grab().is_none());
        assert_eq!(stream.metadata().await, Err(MediaError::Ended));
    }
}
