//! 叠加层绘制
//!
//! [`OverlaySurface`] 是检测循环唯一写入的二维绘图表面，
//! [`RaqoteSurface`] 基于 raqote 实现，标签文字使用系统无衬线字体。

use std::path::Path;
use std::sync::Arc;

use font_kit::family_name::FamilyName;
use font_kit::font::Font;
use font_kit::properties::Properties;
use font_kit::source::SystemSource;
use image::{DynamicImage, GenericImageView, RgbaImage};
use raqote::{DrawOptions, DrawTarget, LineJoin, PathBuilder, Point, SolidSource, Source, StrokeStyle};
use tracing::warn;

use crate::config::{
    OVERLAY_COLOR, OVERLAY_FONT_SIZE, OVERLAY_LABEL_HEIGHT, OVERLAY_LABEL_PADDING,
    OVERLAY_LINE_WIDTH,
};
use crate::media::FrameInfo;
use crate::vision::{BoundingBox, Detection};

/// 不透明颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const ACCENT: Color = Color::rgb(OVERLAY_COLOR.0, OVERLAY_COLOR.1, OVERLAY_COLOR.2);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn source(self) -> Source<'static> {
        Source::Solid(SolidSource::from_unpremultiplied_argb(0xff, self.r, self.g, self.b))
    }
}

/// 一次绘制中可用的图元
pub trait Canvas {
    fn stroke_rect(&mut self, rect: &BoundingBox, color: Color, line_width: f32);

    fn fill_rect(&mut self, rect: &BoundingBox, color: Color);

    /// 以 `(x, y)` 为基线起点绘制文字
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color, size: f32);

    fn measure_text(&self, text: &str, size: f32) -> f32;
}

/// 二维绘图表面
///
/// 表面本身只保存像素，图元在 [`OverlaySurface::draw`] 给出的 [`Canvas`] 上绘制。
pub trait OverlaySurface: Send {
    /// 调整尺寸，与源帧保持一致
    fn resize(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    /// 清除全部标注
    fn clear(&mut self);

    fn draw(&mut self, paint: &mut dyn FnMut(&mut dyn Canvas));
}

/// 渲染一帧的标注
///
/// 依次调整尺寸、清空，然后在开启叠加层时绘制分数不低于 `threshold` 的检测结果。
/// 返回实际绘制的数量。
pub fn render_detections(
    surface: &mut dyn OverlaySurface,
    frame: FrameInfo,
    detections: &[Detection],
    show_overlays: bool,
    threshold: f32,
) -> usize {
    if surface.size() != (frame.width, frame.height) {
        surface.resize(frame.width, frame.height);
    }
    surface.clear();
    if !show_overlays {
        return 0;
    }

    let mut drawn = 0;
    surface.draw(&mut |canvas: &mut dyn Canvas| {
        for detection in detections.iter().filter(|d| d.score >= threshold) {
            draw_detection(canvas, detection);
            drawn += 1;
        }
    });
    drawn
}

fn draw_detection(canvas: &mut dyn Canvas, detection: &Detection) {
    let bbox = &detection.bbox;
    let caption = detection.caption();

    canvas.stroke_rect(bbox, Color::ACCENT, OVERLAY_LINE_WIDTH);

    let text_width = canvas.measure_text(&caption, OVERLAY_FONT_SIZE);
    let label = BoundingBox::new(
        bbox.x,
        bbox.y,
        text_width + OVERLAY_LABEL_PADDING * 2.0,
        OVERLAY_LABEL_HEIGHT,
    );
    canvas.fill_rect(&label, Color::ACCENT);
    canvas.fill_text(
        &caption,
        bbox.x + OVERLAY_LABEL_PADDING,
        bbox.y + OVERLAY_FONT_SIZE,
        Color::WHITE,
        OVERLAY_FONT_SIZE,
    );
}

/// raqote 绘图表面
///
/// 只持有预乘 BGRA 像素，每次绘制时在其上临时建立 `DrawTarget`。
pub struct RaqoteSurface {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    /// 字体数据与索引，每次绘制解析一次
    font: Option<(Arc<Vec<u8>>, u32)>,
}

impl RaqoteSurface {
    /// 创建绘图表面并尝试加载系统无衬线字体
    pub fn new(width: u32, height: u32) -> Self {
        let font = match load_system_font() {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("无法加载系统字体，标签将不显示文字: {e}");
                None
            }
        };
        Self {
            font,
            ..Self::without_font(width, height)
        }
    }

    /// 不加载字体，标签只绘制背景
    pub fn without_font(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
            font: None,
        }
    }

    fn font(&self) -> Option<Font> {
        let (data, index) = self.font.as_ref()?;
        Font::from_bytes(Arc::clone(data), *index).ok()
    }

    /// 导出叠加层（透明背景）
    pub fn to_image(&self) -> RgbaImage {
        let pixels: Vec<u8> = self.pixels.iter().flat_map(|&pixel| unpremultiply(pixel)).collect();
        RgbaImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// 将叠加层合成到源帧上
    pub fn composite(&self, frame: &DynamicImage) -> DynamicImage {
        let (width, height) = frame.dimensions();
        let mut dt = DrawTarget::new(width as i32, height as i32);

        let frame_data: Vec<u32> = frame
            .to_rgba8()
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                premultiply(r, g, b, a)
            })
            .collect();
        dt.draw_image_at(
            0.0,
            0.0,
            &raqote::Image {
                width: width as i32,
                height: height as i32,
                data: &frame_data,
            },
            &DrawOptions::new(),
        );
        dt.draw_image_at(
            0.0,
            0.0,
            &raqote::Image {
                width: self.width as i32,
                height: self.height as i32,
                data: &self.pixels,
            },
            &DrawOptions::new(),
        );

        let pixels: Vec<u8> = dt.get_data().iter().flat_map(|&p| unpremultiply(p)).collect();
        RgbaImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgba8)
            .unwrap_or_else(|| frame.clone())
    }

    /// 将合成结果保存为图片
    pub fn save_composite(&self, frame: &DynamicImage, path: &Path) -> image::ImageResult<()> {
        self.composite(frame).save(path)
    }
}

impl OverlaySurface for RaqoteSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize];
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn draw(&mut self, paint: &mut dyn FnMut(&mut dyn Canvas)) {
        let font = self.font();
        let mut canvas = RaqoteCanvas {
            target: DrawTarget::from_backing(
                self.width as i32,
                self.height as i32,
                &mut self.pixels[..],
            ),
            font,
        };
        paint(&mut canvas);
    }
}

/// 单次绘制期间的 raqote 画布
struct RaqoteCanvas<'a> {
    target: DrawTarget<&'a mut [u32]>,
    font: Option<Font>,
}

impl Canvas for RaqoteCanvas<'_> {
    fn stroke_rect(&mut self, rect: &BoundingBox, color: Color, line_width: f32) {
        let mut pb = PathBuilder::new();
        pb.rect(rect.x, rect.y, rect.width, rect.height);
        let path = pb.finish();
        self.target.stroke(
            &path,
            &color.source(),
            &StrokeStyle {
                join: LineJoin::Round,
                width: line_width,
                ..StrokeStyle::default()
            },
            &DrawOptions::new(),
        );
    }

    fn fill_rect(&mut self, rect: &BoundingBox, color: Color) {
        self.target.fill_rect(
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            &color.source(),
            &DrawOptions::new(),
        );
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color, size: f32) {
        let Some(font) = &self.font else {
            return;
        };
        self.target.draw_text(
            font,
            size,
            text,
            Point::new(x, y),
            &color.source(),
            &DrawOptions::new(),
        );
    }

    fn measure_text(&self, text: &str, size: f32) -> f32 {
        if let Some(font) = &self.font {
            let units_per_em = font.metrics().units_per_em as f32;
            if units_per_em > 0.0 {
                let advance: f32 = text
                    .chars()
                    .filter_map(|c| font.glyph_for_char(c))
                    .filter_map(|glyph| font.advance(glyph).ok())
                    .map(|v| v.x())
                    .sum();
                return advance * size / units_per_em;
            }
        }
        approximate_text_width(text, size)
    }
}

/// 无字体时按平均字宽估算
fn approximate_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.6
}

fn load_system_font() -> Result<(Arc<Vec<u8>>, u32), String> {
    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::SansSerif], &Properties::new())
        .map_err(|e| e.to_string())?;
    let font = handle.load().map_err(|e| e.to_string())?;
    let data = font
        .copy_font_data()
        .ok_or_else(|| "font data unavailable".to_string())?;
    let index = match handle {
        font_kit::handle::Handle::Path { font_index, .. } => font_index,
        font_kit::handle::Handle::Memory { font_index, .. } => font_index,
    };
    Ok((data, index))
}

fn premultiply(r: u8, g: u8, b: u8, a: u8) -> u32 {
    let mul = |c: u8| ((c as u32 * a as u32 + 127) / 255) as u8;
    u32::from_le_bytes([mul(b), mul(g), mul(r), a])
}

/// raqote 的预乘 BGRA 转为 RGBA
fn unpremultiply(pixel: u32) -> [u8; 4] {
    let [b, g, r, a] = pixel.to_le_bytes();
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let div = |c: u8| ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8;
    [div(r), div(g), div(b), a]
}
