//! 边界框后处理模块
//!
//! 负责坐标转换、分数过滤和非极大值抑制(NMS)。

use ndarray::{Array2, Axis};

use crate::vision::bounds::{BoundingBox, Detection};
use crate::vision::labels::label_for;

/// 模型输入与源帧之间的尺寸信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleMessage {
    /// 源帧宽度
    pub o_width: u32,
    /// 源帧高度
    pub o_height: u32,
    /// 模型输入宽度
    pub s_width: usize,
    /// 模型输入高度
    pub s_height: usize,
}

impl ScaleMessage {
    fn factors(&self) -> (f32, f32) {
        (
            self.o_width as f32 / self.s_width as f32,
            self.o_height as f32 / self.s_height as f32,
        )
    }
}

/// 处理模型输出，应用分数下限和NMS阈值
///
/// # 参数
/// * `output` - 模型输出，形状为(num_boxes, 6)
/// * `message` - 尺寸信息
/// * `score_floor` - 低于此分数的候选框被丢弃
/// * `nms_threshold` - NMS阈值
///
/// # 返回值
/// 按分数降序排列、坐标为源帧像素的检测结果
pub fn process_detections(
    output: &Array2<f32>,
    message: &ScaleMessage,
    score_floor: f32,
    nms_threshold: f32,
) -> Vec<Detection> {
    let (scale_x, scale_y) = message.factors();
    let mut detections = Vec::with_capacity(output.len_of(Axis(0)));

    for row in output.axis_iter(Axis(0)) {
        let score = row[4];
        if !score.is_finite() || score < score_floor {
            continue;
        }
        let bbox = BoundingBox::from_corners(row[0], row[1], row[2], row[3]).scaled(scale_x, scale_y);
        if !bbox.is_valid() {
            continue;
        }
        let class_id = row[5].max(0.0).round() as usize;
        detections.push(Detection::new(
            bbox,
            class_id,
            label_for(class_id),
            score.min(1.0),
        ));
    }

    detections.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));
    apply_nms(detections, nms_threshold)
}

/// 应用非极大值抑制
///
/// 同一类别中与更高分框重叠度达到阈值的框被去除。输入需按分数降序排列。
fn apply_nms(detections: Vec<Detection>, nms_threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) >= nms_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const MESSAGE: ScaleMessage = ScaleMessage {
        o_width: 1280,
        o_height: 720,
        s_width: 640,
        s_height: 640,
    };

    #[test]
    fn boxes_are_scaled_to_source_frame() {
        let output = array![[100.0, 100.0, 200.0, 300.0, 0.8, 0.0]];
        let detections = process_detections(&output, &MESSAGE, 0.25, 0.7);

        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert_eq!(det.label, "person");
        assert_eq!(det.bbox.x, 200.0);
        assert_eq!(det.bbox.width, 200.0);
        assert!((det.bbox.y - 112.5).abs() < 1e-4);
        assert!((det.bbox.height - 225.0).abs() < 1e-4);
    }

    #[test]
    fn low_scores_and_degenerate_boxes_are_dropped() {
        let output = array![
            [0.0, 0.0, 10.0, 10.0, 0.1, 0.0],
            [5.0, 5.0, 5.0, 20.0, 0.9, 0.0],
            [0.0, 0.0, 10.0, 10.0, 0.6, 41.0],
        ];
        let detections = process_detections(&output, &MESSAGE, 0.25, 0.7);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "cup");
    }

    #[test]
    fn nms_keeps_highest_score_per_class() {
        let output = array![
            [0.0, 0.0, 100.0, 100.0, 0.6, 0.0],
            [2.0, 2.0, 102.0, 102.0, 0.9, 0.0],
            [2.0, 2.0, 102.0, 102.0, 0.7, 16.0],
            [300.0, 300.0, 400.0, 400.0, 0.5, 0.0],
        ];
        let detections = process_detections(&output, &MESSAGE, 0.25, 0.7);
        let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5]);
        assert_eq!(detections[1].label, "dog");
    }
}
