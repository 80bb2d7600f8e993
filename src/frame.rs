// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/frame.rs - 模型输入张量编码
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

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

const RGB_CHANNELS: usize = 3;
const CHANNEL_MAX: f32 = 255.0;

/// 模型输入张量，NHWC 排列的 f32 数据，取值范围 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl InputTensor {
  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 以本机字节序展开为字节缓冲区
  pub fn to_ne_bytes(&self) -> Vec<u8> {
    self.data.iter().flat_map(|v| v.to_ne_bytes()).collect()
  }
}

impl AsRef<[f32]> for InputTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

/// 将图像编码为模型输入
///
/// 图像被直接拉伸到 `width x height`（不保持宽高比，最近邻采样），
/// 坐标映射阶段依赖同样的拉伸约定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorEncoder {
  width: u32,
  height: u32,
}

impl TensorEncoder {
  pub fn new(width: u32, height: u32) -> Self {
    assert!(width > 0 && height > 0, "模型输入尺寸不能为 0");
    Self { width, height }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn encode(&self, image: &RgbImage) -> InputTensor {
    encode(image, self.width, self.height)
  }
}

/// 图像缩放并归一化为 `width * height * 3` 个 f32
///
/// 像素按存储顺序（行优先）逐个写出，每个像素依次为 R、G、B，
/// 各通道除以 255.0。推理引擎依赖这一顺序，不能随意更改。
///
/// # Panics
///
/// 图像或目标尺寸为 0 时 panic。
pub fn encode(image: &RgbImage, width: u32, height: u32) -> InputTensor {
  assert!(
    image.width() > 0 && image.height() > 0,
    "输入图像尺寸不能为 0"
  );
  assert!(width > 0 && height > 0, "模型输入尺寸不能为 0");

  let resized;
  let source = if image.dimensions() == (width, height) {
    image
  } else {
    debug!(
      "缩放图像: {}x{} -> {}x{}",
      image.width(),
      image.height(),
      width,
      height
    );
    resized = image::imageops::resize(image, width, height, FilterType::Nearest);
    &resized
  };

  let pixel_count = width as usize * height as usize;
  let mut data = Vec::with_capacity(pixel_count * RGB_CHANNELS);
  for pixel in source.pixels() {
    let [r, g, b] = pixel.0;
    data.push(r as f32 / CHANNEL_MAX);
    data.push(g as f32 / CHANNEL_MAX);
    data.push(b as f32 / CHANNEL_MAX);
  }

  InputTensor {
    width: width as usize,
    height: height as usize,
    data: data.into_boxed_slice(),
  }
}
