//! Vision模块 - 基于YOLO的目标检测
//!
//! 该模块提供检测模型的抽象与ONNX实现，包括：
//! - 模型加载
//! - 图像预处理
//! - 模型推理
//! - 结果后处理
//!
//! # 主要组件
//!
//! - [`ModelProvider`] / [`DetectionModel`]：会话控制器依赖的模型接口
//! - [`OnnxModelProvider`]：从ONNX文件加载 [`OnnxDetector`]
//! - [`OffloadedModel`]：在阻塞线程池上运行同步检测器
//! - [`Detection`]：单帧检测结果

pub mod bounds;
pub mod infer;
pub mod labels;
pub mod model;
pub mod posts;
pub mod prevs;

pub use bounds::{BoundingBox, Detection};
pub use model::{
    DetectionModel, FrameDetector, ModelProvider, OffloadedModel, OnnxDetector, OnnxModelProvider,
    load_model,
};
