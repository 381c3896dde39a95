/// 边界框结构
///
/// 以左上角坐标加宽高表示，单位为源帧像素。
#[derive(Debug, Clone, Default, Copy, PartialEq)]
pub struct BoundingBox {
    /// 左上角x坐标
    pub x: f32,
    /// 左上角y坐标
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// 由左上角和右下角坐标构造
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (left, right) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (top, bottom) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// 检查边界框是否有效（宽度和高度都大于0）
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// 交并比
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let width = self.right().min(other.right()) - self.x.max(other.x);
        let height = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if width <= 0.0 || height <= 0.0 {
            return 0.0;
        }
        let intersection = width * height;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }

    /// 按比例缩放到另一坐标系
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self {
            x: self.x * scale_x,
            y: self.y * scale_y,
            width: self.width * scale_x,
            height: self.height * scale_y,
        }
    }
}

/// 检测结果结构
///
/// 单帧推理产生的一个目标，只在一个帧周期内有效。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// 类别ID
    pub class_id: usize,
    /// 类别名称
    pub label: String,
    /// 置信度，范围 [0, 1]
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: usize, label: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            class_id,
            label: label.into(),
            score,
        }
    }

    /// 叠加层上显示的标签，例如 `person (87%)`
    pub fn caption(&self) -> String {
        format!("{} ({}%)", self.label, (self.score * 100.0).round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalised() {
        let bbox = BoundingBox::from_corners(30.0, 40.0, 10.0, 20.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 20.0, 20.0, 20.0));
        assert_eq!(bbox.right(), 30.0);
        assert_eq!(bbox.bottom(), 40.0);
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        let c = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&a), 1.0);
        assert!((a.iou(&c) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn caption_rounds_percentage() {
        let det = Detection::new(BoundingBox::default(), 0, "cup", 0.876);
        assert_eq!(det.caption(), "cup (88%)");
        let det = Detection::new(BoundingBox::default(), 0, "cup", 0.5);
        assert_eq!(det.caption(), "cup (50%)");
    }
}
