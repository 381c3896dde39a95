//! 配置模块
//!
//! 默认常量与 TOML 配置文件。配置文件中的所有字段都是可选的，缺省时使用下面的常量。

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::threshold::ThresholdPolicy;

// 采集与渲染
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const DEFAULT_STILL_FRAME_INTERVAL_MS: u64 = 33;

// 目标检测超参数配置
pub const DEFAULT_MODEL_PATH: &str = "models/yolo11n.onnx";
pub const DEFAULT_INPUT_NAME: &str = "images";
pub const DEFAULT_INPUT_WIDTH: usize = 640;
pub const DEFAULT_INPUT_HEIGHT: usize = 640;
pub const DEFAULT_SCORE_FLOOR: f32 = 0.25;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.7;
pub const DEFAULT_INTRA_THREADS: usize = 4;

// 自适应阈值策略
pub const DEFAULT_INITIAL_THRESHOLD: f32 = 0.5;
pub const DEFAULT_TARGET_SCORE: f32 = 0.7;
pub const DEFAULT_GAIN: f32 = 0.05;
pub const DEFAULT_NOISE_FLOOR: f32 = 0.4;
pub const DEFAULT_MIN_THRESHOLD: f32 = 0.2;
pub const DEFAULT_MAX_THRESHOLD: f32 = 0.9;
pub const DEFAULT_ADJUST_PERIOD_MS: u64 = 500;

// 叠加层样式
pub const OVERLAY_COLOR: (u8, u8, u8) = (0x06, 0xb6, 0xd4);
pub const OVERLAY_LINE_WIDTH: f32 = 2.0;
pub const OVERLAY_FONT_SIZE: f32 = 16.0;
pub const OVERLAY_LABEL_HEIGHT: f32 = 20.0;
pub const OVERLAY_LABEL_PADDING: f32 = 5.0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    capture: Option<CaptureFile>,
    model: Option<ModelFile>,
    threshold: Option<ThresholdFile>,
    display: Option<DisplayFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureFile {
    frame_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelFile {
    path: Option<String>,
    input_width: Option<usize>,
    input_height: Option<usize>,
    input_name: Option<String>,
    score_floor: Option<f32>,
    nms_threshold: Option<f32>,
    intra_threads: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ThresholdFile {
    initial: Option<f32>,
    target: Option<f32>,
    gain: Option<f32>,
    noise_floor: Option<f32>,
    min: Option<f32>,
    max: Option<f32>,
    period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayFile {
    show_overlays: Option<bool>,
    dynamic_threshold: Option<bool>,
}

/// ONNX 检测模型的加载参数
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub path: String,
    pub input_width: usize,
    pub input_height: usize,
    pub input_name: String,
    /// 模型输出的最低分数，低于此值的候选框在后处理阶段直接丢弃
    pub score_floor: f32,
    pub nms_threshold: f32,
    pub intra_threads: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_MODEL_PATH.to_string(),
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
            input_name: DEFAULT_INPUT_NAME.to_string(),
            score_floor: DEFAULT_SCORE_FLOOR,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

/// 用户可控的显示选项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    pub show_overlays: bool,
    pub dynamic_threshold: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_overlays: true,
            dynamic_threshold: false,
        }
    }
}

/// 完整的运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// 检测循环的帧周期
    pub frame_interval: Duration,
    pub model: ModelSettings,
    pub threshold: ThresholdPolicy,
    pub display: DisplaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
            model: ModelSettings::default(),
            threshold: ThresholdPolicy::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl Settings {
    /// 从 TOML 文件加载配置并校验
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// 解析 TOML 文本，缺省字段使用默认值
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let file: SettingsFile = toml::from_str(raw)?;
        let settings = Self::from_file(file);
        settings.validate()?;
        Ok(settings)
    }

    fn from_file(file: SettingsFile) -> Self {
        let capture = file.capture.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let threshold = file.threshold.unwrap_or_default();
        let display = file.display.unwrap_or_default();

        let model_defaults = ModelSettings::default();
        let policy_defaults = ThresholdPolicy::default();
        let display_defaults = DisplaySettings::default();

        Self {
            frame_interval: Duration::from_millis(
                capture.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
            ),
            model: ModelSettings {
                path: model.path.unwrap_or(model_defaults.path),
                input_width: model.input_width.unwrap_or(model_defaults.input_width),
                input_height: model.input_height.unwrap_or(model_defaults.input_height),
                input_name: model.input_name.unwrap_or(model_defaults.input_name),
                score_floor: model.score_floor.unwrap_or(model_defaults.score_floor),
                nms_threshold: model.nms_threshold.unwrap_or(model_defaults.nms_threshold),
                intra_threads: model.intra_threads.unwrap_or(model_defaults.intra_threads),
            },
            threshold: ThresholdPolicy {
                initial: threshold.initial.unwrap_or(policy_defaults.initial),
                target: threshold.target.unwrap_or(policy_defaults.target),
                gain: threshold.gain.unwrap_or(policy_defaults.gain),
                noise_floor: threshold.noise_floor.unwrap_or(policy_defaults.noise_floor),
                min: threshold.min.unwrap_or(policy_defaults.min),
                max: threshold.max.unwrap_or(policy_defaults.max),
                period: threshold
                    .period_ms
                    .map(Duration::from_millis)
                    .unwrap_or(policy_defaults.period),
            },
            display: DisplaySettings {
                show_overlays: display.show_overlays.unwrap_or(display_defaults.show_overlays),
                dynamic_threshold: display
                    .dynamic_threshold
                    .unwrap_or(display_defaults.dynamic_threshold),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "capture.frame_interval_ms must be greater than zero".into(),
            ));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(ConfigError::Invalid(
                "model input size must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.model.nms_threshold) {
            return Err(ConfigError::Invalid(
                "model.nms_threshold must be within [0, 1]".into(),
            ));
        }
        self.threshold.validate()
    }
}
