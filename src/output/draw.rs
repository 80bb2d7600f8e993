// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::{
  model::{BoundingBox, Detection},
  overlay::{Canvas, CoordinateMapper, OverlayRenderer},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 50.0;
const LABEL_CHAR_WIDTH_RATIO: f32 = 0.55; // 没有字体时每字符平均宽度与字号之比（粗略估计）
const STROKE_WIDTH: u32 = 8;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const TAG_COLOR: [u8; 3] = [0, 0, 0]; // 黑色
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色

#[derive(Error, Debug)]
pub enum FontError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 绘制样式
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  stroke_width: u32,
  box_color: [u8; 3],
  tag_color: [u8; 3],
  text_color: [u8; 3],
  renderer: OverlayRenderer,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      stroke_width: STROKE_WIDTH,
      box_color: BOX_COLOR,
      tag_color: TAG_COLOR,
      text_color: TEXT_COLOR,
      renderer: OverlayRenderer::default(),
    }
  }
}

impl Draw {
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, FontError> {
    let path = path.as_ref();
    info!("加载字体文件: {}", path.display());
    let data = std::fs::read(path)?;
    self.font = Some(FontArc::try_from_vec(data)?);
    Ok(self)
  }

  pub fn with_stroke_width(mut self, stroke_width: u32) -> Self {
    self.stroke_width = stroke_width;
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn canvas<'a>(&'a self, image: &'a mut RgbImage) -> ImageCanvas<'a> {
    ImageCanvas { draw: self, image }
  }

  /// 按覆盖式缩放把帧画到视图大小的画布上，超出部分从右下裁掉
  pub fn compose(&self, frame: &RgbImage, mapper: &CoordinateMapper) -> RgbImage {
    let (view_width, view_height) = mapper.view();
    let scale = mapper.scale();
    let width = ((frame.width() as f32 * scale).round() as u32).max(1);
    let height = ((frame.height() as f32 * scale).round() as u32).max(1);

    let mut surface = RgbImage::new(view_width, view_height);
    if (width, height) == frame.dimensions() {
      image::imageops::replace(&mut surface, frame, 0, 0);
    } else {
      let scaled = image::imageops::resize(frame, width, height, FilterType::Triangle);
      image::imageops::replace(&mut surface, &scaled, 0, 0);
    }
    surface
  }

  /// 在显示空间的画布上绘制检测结果
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    let renderer = self.renderer;
    let mut canvas = self.canvas(image);
    renderer.render(&mut canvas, detections);
  }
}

/// 基于 `RgbImage` 的画布
pub struct ImageCanvas<'a> {
  draw: &'a Draw,
  image: &'a mut RgbImage,
}

fn to_rect(rect: &BoundingBox, inset: u32) -> Option<Rect> {
  let left = rect.left.round() as i32 + inset as i32;
  let top = rect.top.round() as i32 + inset as i32;
  let right = rect.right.round() as i32 - inset as i32;
  let bottom = rect.bottom.round() as i32 - inset as i32;
  if right <= left || bottom <= top {
    return None;
  }
  Some(Rect::at(left, top).of_size((right - left) as u32, (bottom - top) as u32))
}

impl Canvas for ImageCanvas<'_> {
  fn measure_text(&self, text: &str) -> (f32, f32) {
    match &self.draw.font {
      Some(font) => {
        let (w, h) = text_size(PxScale::from(self.draw.font_size), font, text);
        (w as f32, h as f32)
      }
      None => (
        text.chars().count() as f32 * self.draw.font_size * LABEL_CHAR_WIDTH_RATIO,
        self.draw.font_size,
      ),
    }
  }

  fn stroke_rect(&mut self, rect: &BoundingBox) {
    // 线宽向内加粗
    for inset in 0..self.draw.stroke_width.max(1) {
      if let Some(r) = to_rect(rect, inset) {
        draw_hollow_rect_mut(&mut *self.image, r, Rgb(self.draw.box_color));
      }
    }
  }

  fn fill_rect(&mut self, rect: &BoundingBox) {
    if let Some(r) = to_rect(rect, 0) {
      draw_filled_rect_mut(&mut *self.image, r, Rgb(self.draw.tag_color));
    }
  }

  fn draw_text(&mut self, text: &str, x: f32, y: f32) {
    // 没有字体时只画标签背景
    let Some(font) = &self.draw.font else {
      return;
    };
    let scale = PxScale::from(self.draw.font_size);
    let (_, text_height) = text_size(scale, font, text);
    // imageproc 以文本左上角定位，这里传入的是基线位置
    draw_text_mut(
      &mut *self.image,
      Rgb(self.draw.text_color),
      x.round() as i32,
      y.round() as i32 - text_height as i32,
      scale,
      font,
      text,
    );
  }
}
