//! 自适应阈值
//!
//! 一个离散的比例控制器：周期性地读取最近一帧的检测结果，
//! 使置信度均值向目标值靠拢。没有积分项和微分项，也不保证收敛。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::config::{
    DEFAULT_ADJUST_PERIOD_MS, DEFAULT_GAIN, DEFAULT_INITIAL_THRESHOLD, DEFAULT_MAX_THRESHOLD,
    DEFAULT_MIN_THRESHOLD, DEFAULT_NOISE_FLOOR, DEFAULT_TARGET_SCORE,
};
use crate::error::ConfigError;
use crate::utils::muloop::{StopSignal, ticker};
use crate::utils::stream::StreamReader;
use crate::vision::Detection;

/// 阈值控制策略常量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    /// 会话开始时的阈值
    pub initial: f32,
    /// 期望的置信度均值
    pub target: f32,
    /// 比例增益
    pub gain: f32,
    /// 参与均值计算的最低分数（严格大于）
    pub noise_floor: f32,
    pub min: f32,
    pub max: f32,
    /// 控制周期，与帧率无关
    pub period: Duration,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_THRESHOLD,
            target: DEFAULT_TARGET_SCORE,
            gain: DEFAULT_GAIN,
            noise_floor: DEFAULT_NOISE_FLOOR,
            min: DEFAULT_MIN_THRESHOLD,
            max: DEFAULT_MAX_THRESHOLD,
            period: Duration::from_millis(DEFAULT_ADJUST_PERIOD_MS),
        }
    }
}

impl ThresholdPolicy {
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min < self.max) {
            return Err(ConfigError::Invalid(format!(
                "threshold.min ({}) must be below threshold.max ({})",
                self.min, self.max
            )));
        }
        if !(self.min..=self.max).contains(&self.initial) {
            return Err(ConfigError::Invalid(format!(
                "threshold.initial ({}) must lie within [{}, {}]",
                self.initial, self.min, self.max
            )));
        }
        if !(self.gain >= 0.0) {
            return Err(ConfigError::Invalid("threshold.gain must not be negative".into()));
        }
        if self.period.is_zero() {
            return Err(ConfigError::Invalid(
                "threshold.period_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// 单步控制计算
    ///
    /// 返回 `None` 表示本周期没有可用信号，阈值保持不变。
    pub fn step(&self, current: f32, detections: &[Detection]) -> Option<f32> {
        let mut count = 0usize;
        let mut sum = 0.0f32;
        for detection in detections.iter().filter(|d| d.score > self.noise_floor) {
            sum += detection.score;
            count += 1;
        }
        if count == 0 {
            return None;
        }

        let mean = sum / count as f32;
        let error = mean - self.target;
        let adjustment = error * self.gain;
        Some(self.clamp(current + adjustment))
    }
}

/// 当前生效的阈值
///
/// 以 f32 的位模式存放在原子变量中，写入时总是先按策略上下限截断。
#[derive(Debug)]
pub struct ThresholdState {
    bits: AtomicU32,
    min: f32,
    max: f32,
}

impl ThresholdState {
    pub fn new(policy: &ThresholdPolicy) -> Self {
        Self {
            bits: AtomicU32::new(policy.clamp(policy.initial).to_bits()),
            min: policy.min,
            max: policy.max,
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// 写入新阈值，返回截断后的实际值
    pub fn set(&self, value: f32) -> f32 {
        let clamped = if value.is_nan() {
            self.get()
        } else {
            value.clamp(self.min, self.max)
        };
        self.bits.store(clamped.to_bits(), Ordering::Release);
        clamped
    }
}

/// 自适应阈值控制器
///
/// 只读取检测快照，只写入阈值。
pub struct AdaptiveController {
    policy: ThresholdPolicy,
}

impl AdaptiveController {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self { policy }
    }

    /// 执行一次调整，返回调整后的阈值（无信号时返回 `None`）
    pub fn tick(&self, state: &ThresholdState, detections: &[Detection]) -> Option<f32> {
        let current = state.get();
        let next = self.policy.step(current, detections)?;
        let applied = state.set(next);
        debug!(from = current, to = applied, samples = detections.len(), "阈值已调整");
        Some(applied)
    }

    /// 按固定周期运行，直到收到停止信号
    pub async fn run(
        self,
        snapshot: StreamReader<Detection>,
        state: Arc<ThresholdState>,
        mut stop: StopSignal,
    ) {
        let mut clock = ticker(self.policy.period);
        while stop.tick(&mut clock).await {
            let latest = snapshot.latest();
            if latest.is_empty() {
                continue;
            }
            self.tick(&state, &latest);
        }
    }
}
