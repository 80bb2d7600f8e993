// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/output/save_image_file.rs - 保存叠加检测结果的图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Frame,
  model::DetectResult,
  output::{
    Render,
    draw::{Draw, FontError},
  },
  overlay::CoordinateMapper,
  parse_size, url_path, url_query,
};

/// 将帧按视图尺寸做覆盖式缩放，绘制检测结果后保存
///
/// URL 形如 `image:///out.png?view=1280x720&font=/path/font.ttf&font_size=50&stroke=8`，
/// 未指定 `view` 时视图与帧同尺寸。
pub struct SaveImageFileOutput {
  path: String,
  view: Option<(u32, u32)>,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体错误: {0}")]
  FontError(#[from] FontError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let view = match url_query(uri, "view") {
      Some(view) => Some(
        parse_size(&view)
          .ok_or_else(|| SaveImageFileError::InvalidParameter(format!("view={}", view)))?,
      ),
      None => None,
    };

    let mut draw = Draw::default();
    if let Some(stroke) = url_query(uri, "stroke") {
      let stroke = stroke
        .parse()
        .map_err(|_| SaveImageFileError::InvalidParameter(format!("stroke={}", stroke)))?;
      draw = draw.with_stroke_width(stroke);
    }
    if let Some(size) = url_query(uri, "font_size") {
      let size = size
        .parse::<f32>()
        .ok()
        .filter(|s| *s > 0.0)
        .ok_or_else(|| SaveImageFileError::InvalidParameter(format!("font_size={}", size)))?;
      draw = draw.with_font_size(size);
    }
    match url_query(uri, "font") {
      Some(font) => draw = draw.with_font_file(font)?,
      None => warn!("未指定字体文件，只绘制边框和标签背景"),
    }

    Ok(SaveImageFileOutput {
      path: url_path(uri),
      view,
      draw,
    })
  }
}

impl SaveImageFileOutput {
  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;

    info!("保存图像到文件: {}", self.path);

    Ok(())
  }

  /// 生成视图大小的叠加画面
  pub fn render_surface(&self, frame: &RgbImage, result: &DetectResult) -> RgbImage {
    let (view_width, view_height) = self.view.unwrap_or(frame.dimensions());
    let mut mapper =
      CoordinateMapper::new(view_width, view_height, result.image_width, result.image_height);
    let detections = mapper.map_result(result);
    debug!("显示空间检测结果: {:?}", detections);

    let mut surface = self.draw.compose(frame, &mapper);
    self.draw.draw_detections(&mut surface, &detections);
    surface
  }
}

impl Render<Frame, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.render_surface(&frame.image, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, Detection};
  use image::Rgb;

  fn output_url(path: &Path, query: &str) -> Url {
    Url::parse(&format!("image://{}{}", path.display(), query)).unwrap()
  }

  #[test]
  fn saves_view_sized_surface() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.png");
    let url = output_url(&path, "?view=40x20&stroke=1&font_size=4");
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let frame = Frame {
      index: 0,
      image: RgbImage::from_pixel(10, 10, Rgb([9, 9, 9])),
    };
    let result = DetectResult {
      items: vec![Detection {
        bbox: BoundingBox::new(0.1, 0.1, 0.5, 0.5),
        label: "cat".to_string(),
        confidence: 0.9,
      }]
      .into_boxed_slice(),
      image_width: 10,
      image_height: 10,
    };
    output.render_result(&frame, &result).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (40, 20));
    // 缩放系数 4：边框右下角 (0.5 * 10 * 4) - 1
    assert_eq!(saved.get_pixel(19, 19), &Rgb([0, 0, 255]));
    // 标签背景高度 4 + 8，锚定在 (4, 4)
    assert_eq!(saved.get_pixel(6, 10), &Rgb([0, 0, 0]));
    // 视图右侧是放大后的帧
    assert_eq!(saved.get_pixel(35, 15), &Rgb([9, 9, 9]));
  }

  #[test]
  fn invalid_view_is_rejected() {
    let url = Url::parse("image:///tmp/out.png?view=wide").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::InvalidParameter(_))
    ));
  }

  #[test]
  fn missing_font_file_is_rejected() {
    let url = Url::parse("image:///tmp/out.png?font=/nonexistent/font.ttf").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::FontError(_))
    ));
  }
}
