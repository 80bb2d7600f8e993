// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/overlay.rs - 坐标映射与叠加层绘制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use tracing::debug;

use crate::model::{BoundingBox, DetectResult, Detection};

/// 标签背景相对文本的留白（像素）
pub const LABEL_PADDING: f32 = 8.0;

/// 覆盖式缩放系数：画面铺满视图，超出部分裁掉
pub fn compute_scale_factor(
  view_width: f32,
  view_height: f32,
  image_width: f32,
  image_height: f32,
) -> f32 {
  (view_width / image_width).max(view_height / image_height)
}

/// 每个坐标独立乘以缩放系数，不做平移
pub fn map_box(bbox: &BoundingBox, scale: f32) -> BoundingBox {
  BoundingBox {
    left: bbox.left * scale,
    top: bbox.top * scale,
    right: bbox.right * scale,
    bottom: bbox.bottom * scale,
  }
}

/// 归一化坐标转换为源图像像素坐标
pub fn denormalize(bbox: &BoundingBox, image_width: f32, image_height: f32) -> BoundingBox {
  BoundingBox {
    left: bbox.left * image_width,
    top: bbox.top * image_height,
    right: bbox.right * image_width,
    bottom: bbox.bottom * image_height,
  }
}

/// 将检测结果从归一化的模型空间映射到显示空间
///
/// 视图或图像尺寸变化时重新计算缩放系数。画面从左上角对齐，
/// 裁掉的部分不做居中补偿。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
  view: (u32, u32),
  image: (u32, u32),
  scale: f32,
}

impl CoordinateMapper {
  pub fn new(view_width: u32, view_height: u32, image_width: u32, image_height: u32) -> Self {
    let mut mapper = Self {
      view: (view_width, view_height),
      image: (image_width, image_height),
      scale: 1.0,
    };
    mapper.recompute();
    mapper
  }

  fn recompute(&mut self) {
    self.scale = compute_scale_factor(
      self.view.0 as f32,
      self.view.1 as f32,
      self.image.0 as f32,
      self.image.1 as f32,
    );
    debug!(
      "视图 {}x{}, 图像 {}x{}, 缩放系数 {}",
      self.view.0, self.view.1, self.image.0, self.image.1, self.scale
    );
  }

  pub fn set_view(&mut self, width: u32, height: u32) {
    if self.view != (width, height) {
      self.view = (width, height);
      self.recompute();
    }
  }

  pub fn set_image(&mut self, width: u32, height: u32) {
    if self.image != (width, height) {
      self.image = (width, height);
      self.recompute();
    }
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn view(&self) -> (u32, u32) {
    self.view
  }

  pub fn image(&self) -> (u32, u32) {
    self.image
  }

  pub fn map_box(&self, bbox: &BoundingBox) -> BoundingBox {
    map_box(bbox, self.scale)
  }

  pub fn to_display(&self, detection: &Detection) -> Detection {
    let pixels = denormalize(&detection.bbox, self.image.0 as f32, self.image.1 as f32);
    Detection {
      bbox: self.map_box(&pixels),
      label: detection.label.clone(),
      confidence: detection.confidence,
    }
  }

  /// 按结果携带的图像尺寸更新后映射整帧结果
  pub fn map_result(&mut self, result: &DetectResult) -> Vec<Detection> {
    self.set_image(result.image_width, result.image_height);
    result.items.iter().map(|d| self.to_display(d)).collect()
  }
}

/// 叠加层绘制目标，具体的绘图原语由实现方提供
pub trait Canvas {
  /// 文本的宽和高（像素）
  fn measure_text(&self, text: &str) -> (f32, f32);
  fn stroke_rect(&mut self, rect: &BoundingBox);
  fn fill_rect(&mut self, rect: &BoundingBox);
  /// `(x, y)` 为文本基线左端
  fn draw_text(&mut self, text: &str, x: f32, y: f32);
}

/// 单个检测在显示空间中的绘制布局
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
  pub outline: BoundingBox,
  pub tag: BoundingBox,
  pub text: String,
  pub text_origin: (f32, f32),
}

/// 按四舍五入（而不是银行家舍入）格式化小数
///
/// 先取 `f64` 的最短十进制表示，再对第 `decimals + 1` 位做进位，
/// 因此 0.125 显示为 0.13。
pub fn format_half_up(value: f32, decimals: usize) -> String {
  let value = f64::from(value);
  if !value.is_finite() {
    return format!("{:.*}", decimals, value);
  }

  let text = format!("{}", value.abs());
  let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
  let kept: String = frac
    .chars()
    .chain(std::iter::repeat('0'))
    .take(decimals)
    .collect();
  let round_up = frac.chars().nth(decimals).is_some_and(|d| d >= '5');
  let scaled = format!("{}{}", int, kept)
    .parse::<u128>()
    .ok()
    .and_then(|n| n.checked_add(u128::from(round_up)));
  let Some(scaled) = scaled else {
    return format!("{:.*}", decimals, value);
  };

  let sign = if value < 0.0 && scaled != 0 { "-" } else { "" };
  if decimals == 0 {
    return format!("{}{}", sign, scaled);
  }
  let base = 10u128.pow(decimals as u32);
  format!(
    "{}{}.{:0width$}",
    sign,
    scaled / base,
    scaled % base,
    width = decimals
  )
}

pub fn label_text(detection: &Detection) -> String {
  format!("{} {}", detection.label, format_half_up(detection.confidence, 2))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRenderer {
  padding: f32,
}

impl Default for OverlayRenderer {
  fn default() -> Self {
    Self {
      padding: LABEL_PADDING,
    }
  }
}

impl OverlayRenderer {
  pub fn with_padding(mut self, padding: f32) -> Self {
    self.padding = padding;
    self
  }

  /// 边框、标签背景和文本位置，标签锚定在边框左上角
  pub fn layout<C: Canvas + ?Sized>(&self, canvas: &C, detection: &Detection) -> OverlayItem {
    let text = label_text(detection);
    let (text_width, text_height) = canvas.measure_text(&text);
    let BoundingBox { left, top, .. } = detection.bbox;

    OverlayItem {
      outline: detection.bbox,
      tag: BoundingBox::new(
        left,
        top,
        left + text_width + self.padding,
        top + text_height + self.padding,
      ),
      text,
      text_origin: (left, top + text_height),
    }
  }

  /// 绘制显示空间中的检测结果
  pub fn render<C: Canvas + ?Sized>(&self, canvas: &mut C, detections: &[Detection]) {
    for detection in detections {
      let item = self.layout(canvas, detection);
      canvas.stroke_rect(&item.outline);
      canvas.fill_rect(&item.tag);
      canvas.draw_text(&item.text, item.text_origin.0, item.text_origin.1);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[derive(Debug, PartialEq)]
  enum Call {
    Stroke(BoundingBox),
    Fill(BoundingBox),
    Text(String, f32, f32),
  }

  #[derive(Default)]
  struct RecordingCanvas {
    calls: Vec<Call>,
  }

  impl Canvas for RecordingCanvas {
    fn measure_text(&self, text: &str) -> (f32, f32) {
      (text.chars().count() as f32 * 10.0, 20.0)
    }

    fn stroke_rect(&mut self, rect: &BoundingBox) {
      self.calls.push(Call::Stroke(*rect));
    }

    fn fill_rect(&mut self, rect: &BoundingBox) {
      self.calls.push(Call::Fill(*rect));
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32) {
      self.calls.push(Call::Text(text.to_string(), x, y));
    }
  }

  fn detection(bbox: BoundingBox) -> Detection {
    Detection {
      bbox,
      label: "dog".to_string(),
      confidence: 0.876,
    }
  }

  #[test]
  fn cover_fit_scale() {
    assert_eq!(compute_scale_factor(200.0, 100.0, 50.0, 50.0), 4.0);
    assert_eq!(compute_scale_factor(100.0, 200.0, 50.0, 50.0), 4.0);
    assert_relative_eq!(
      compute_scale_factor(640.0, 480.0, 1280.0, 720.0),
      2.0 / 3.0,
      epsilon = 1e-6
    );
  }

  #[test]
  fn map_box_scales_without_offset() {
    let mapped = map_box(&BoundingBox::new(1.0, 2.0, 3.0, 4.0), 2.5);
    assert_eq!(mapped, BoundingBox::new(2.5, 5.0, 7.5, 10.0));
  }

  #[test]
  fn mapper_recomputes_on_geometry_change() {
    let mut mapper = CoordinateMapper::new(200, 100, 50, 50);
    assert_eq!(mapper.scale(), 4.0);

    mapper.set_view(100, 300);
    assert_eq!(mapper.scale(), 6.0);

    mapper.set_image(100, 100);
    assert_eq!(mapper.scale(), 3.0);
  }

  #[test]
  fn normalized_detection_to_display() {
    let mut mapper = CoordinateMapper::new(200, 100, 1, 1);
    let result = DetectResult {
      items: vec![detection(BoundingBox::new(0.4, 0.4, 0.6, 0.6))].into_boxed_slice(),
      image_width: 50,
      image_height: 50,
    };
    let mapped = mapper.map_result(&result);
    assert_eq!(mapper.scale(), 4.0);
    assert_eq!(mapped.len(), 1);
    assert_relative_eq!(mapped[0].bbox.left, 80.0, epsilon = 1e-4);
    assert_relative_eq!(mapped[0].bbox.top, 80.0, epsilon = 1e-4);
    assert_relative_eq!(mapped[0].bbox.right, 120.0, epsilon = 1e-4);
    assert_relative_eq!(mapped[0].bbox.bottom, 120.0, epsilon = 1e-4);
    assert_eq!(mapped[0].label, "dog");
  }

  #[test]
  fn label_text_has_two_decimals() {
    assert_eq!(label_text(&detection(BoundingBox::default())), "dog 0.88");
  }

  #[test]
  fn confidence_ties_round_half_up() {
    assert_eq!(format_half_up(0.125, 2), "0.13");
    assert_eq!(format_half_up(0.625, 2), "0.63");
    assert_eq!(format_half_up(0.875, 2), "0.88");
    assert_eq!(format_half_up(0.5, 2), "0.50");
    assert_eq!(format_half_up(1.0, 2), "1.00");
    assert_eq!(format_half_up(0.996, 2), "1.00");
    assert_eq!(format_half_up(-0.125, 2), "-0.13");
    assert_eq!(format_half_up(2.5, 0), "3");

    let tie = Detection {
      confidence: 0.625,
      ..detection(BoundingBox::default())
    };
    assert_eq!(label_text(&tie), "dog 0.63");
  }

  #[test]
  fn custom_padding_widens_the_tag() {
    let canvas = RecordingCanvas::default();
    let bbox = BoundingBox::new(10.0, 20.0, 110.0, 220.0);
    let item = OverlayRenderer::default()
      .with_padding(2.0)
      .layout(&canvas, &detection(bbox));
    assert_eq!(item.tag, BoundingBox::new(10.0, 20.0, 92.0, 42.0));
    assert_eq!(item.text_origin, (10.0, 40.0));
  }

  #[test]
  fn renders_outline_tag_and_text() {
    let mut canvas = RecordingCanvas::default();
    let bbox = BoundingBox::new(10.0, 20.0, 110.0, 220.0);
    OverlayRenderer::default().render(&mut canvas, &[detection(bbox)]);

    // "dog 0.88" 共 8 个字符
    assert_eq!(
      canvas.calls,
      vec![
        Call::Stroke(bbox),
        Call::Fill(BoundingBox::new(10.0, 20.0, 10.0 + 80.0 + 8.0, 20.0 + 20.0 + 8.0)),
        Call::Text("dog 0.88".to_string(), 10.0, 40.0),
      ]
    );
  }

  #[test]
  fn nothing_to_draw() {
    let mut canvas = RecordingCanvas::default();
    OverlayRenderer::default().render(&mut canvas, &[]);
    assert!(canvas.calls.is_empty());
  }
}
