// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Frame, url_path};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("目录中没有图像文件: {0}")]
  EmptyDirectory(String),
}

enum Source {
  Single(Option<RgbImage>),
  Directory(VecDeque<PathBuf>),
}

/// 单个图像文件或图像目录（按文件名排序）作为帧序列
pub struct ImageFileInput {
  source: Source,
  index: u64,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url_path(url);
    if Path::new(&path).is_dir() {
      Self::from_directory(&path)
    } else {
      Self::from_file(&path)
    }
  }
}

fn is_image_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      .unwrap_or(false)
}

fn read_image(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::open(path)?.decode()?;
  Ok(image.to_rgb8())
}

impl ImageFileInput {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    info!("读取图像文件: {}", path.display());
    let image = read_image(path)?;
    Ok(ImageFileInput {
      source: Source::Single(Some(image)),
      index: 0,
    })
  }

  pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let mut files = std::fs::read_dir(path)?
      .map(|entry| entry.map(|e| e.path()))
      .collect::<Result<Vec<_>, _>>()?;
    files.retain(|p| is_image_file(p));
    files.sort();

    if files.is_empty() {
      return Err(ImageFileInputError::EmptyDirectory(
        path.display().to_string(),
      ));
    }

    info!("读取图像目录: {}, 共 {} 个文件", path.display(), files.len());
    Ok(ImageFileInput {
      source: Source::Directory(files.into()),
      index: 0,
    })
  }

  fn next_image(&mut self) -> Option<RgbImage> {
    match &mut self.source {
      Source::Single(image) => image.take(),
      Source::Directory(files) => {
        while let Some(path) = files.pop_front() {
          match read_image(&path) {
            Ok(image) => {
              debug!("读取图像: {}", path.display());
              return Some(image);
            }
            Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
          }
        }
        None
      }
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.next_image()?;
    let frame = Frame {
      index: self.index,
      image,
    };
    self.index += 1;
    Some(frame)
  }
}
