// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;

use crate::{frame::InputTensor, label::LabelError};

/// 输出张量中描述边框几何的通道数：cx, cy, w, h
pub const BOX_CHANNELS: usize = 4;

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 不透明的推理引擎：固定形状的输入张量 -> 固定形状的输出张量
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 声明的输入形状，期望为 `[1, W, H, 3]`
  fn input_dims(&self) -> &[usize];
  /// 声明的输出形状，期望为 `[1, N, C]`
  fn output_dims(&self) -> &[usize];
  /// 返回按行优先展开的输出张量
  fn run(&self, input: &InputTensor) -> Result<Vec<f32>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型输入形状不受支持: {0:?}")]
  UnsupportedInputShape(Vec<usize>),
  #[error("模型输出形状不受支持: {0:?}")]
  UnsupportedOutputShape(Vec<usize>),
  #[error("输出通道数 {channels} 与标签数 {labels} 不匹配 (期望 4 + {labels})")]
  LabelMismatch { channels: usize, labels: usize },
  #[error("输出张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  OutputLengthMismatch { expected: usize, actual: usize },
  #[error("置信度阈值必须在 [0, 1] 之间: {0}")]
  InvalidThreshold(f32),
  #[error("标签错误: {0}")]
  LabelError(#[from] LabelError),
  #[error("推理错误: {0}")]
  InferenceError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 边框，依次为左、上、右、下
///
/// 解码后为归一化坐标，坐标映射后为显示像素坐标。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BoundingBox {
  pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
    Self {
      left,
      top,
      right,
      bottom,
    }
  }

  /// 由中心点和宽高得到角点形式
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self {
      left: cx - w / 2.0,
      top: cy - h / 2.0,
      right: cx + w / 2.0,
      bottom: cy + h / 2.0,
    }
  }

  /// 四个坐标都在 [0, 1] 之内，NaN 视为越界
  pub fn is_normalized(&self) -> bool {
    self
      .corners()
      .iter()
      .all(|v| (0.0..=1.0).contains(v))
  }

  pub fn corners(&self) -> [f32; 4] {
    [self.left, self.top, self.right, self.bottom]
  }

  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub label: String,
  pub confidence: f32,
}

/// 单帧的检测结果快照
///
/// 构造后不再修改，整体在检测线程和渲染线程之间移交。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
  pub image_width: u32,
  pub image_height: u32,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

/// 初始化时由推理引擎声明的张量形状得到的模型参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelShape {
  pub input_width: usize,
  pub input_height: usize,
  pub num_candidates: usize,
  pub num_channels: usize,
}

impl ModelShape {
  /// 输入形状 `[1, W, H, 3]`，输出形状 `[1, N, C]`
  pub fn from_dims(input: &[usize], output: &[usize]) -> Result<Self, ModelError> {
    let (input_width, input_height) = match input {
      &[1, w, h, 3] if w > 0 && h > 0 => (w, h),
      _ => return Err(ModelError::UnsupportedInputShape(input.to_vec())),
    };

    let (num_candidates, num_channels) = match output {
      &[1, n, c] if n > 0 && c > BOX_CHANNELS => (n, c),
      _ => return Err(ModelError::UnsupportedOutputShape(output.to_vec())),
    };

    Ok(Self {
      input_width,
      input_height,
      num_candidates,
      num_channels,
    })
  }

  pub fn from_engine<E: InferenceEngine>(engine: &E) -> Result<Self, ModelError> {
    Self::from_dims(engine.input_dims(), engine.output_dims())
  }

  pub fn num_classes(&self) -> usize {
    self.num_channels - BOX_CHANNELS
  }

  pub fn output_len(&self) -> usize {
    self.num_candidates * self.num_channels
  }

  /// 检查 `num_channels == 4 + labels`
  pub fn check_labels(&self, labels: usize) -> Result<(), ModelError> {
    if self.num_classes() != labels {
      return Err(ModelError::LabelMismatch {
        channels: self.num_channels,
        labels,
      });
    }
    Ok(())
  }
}

/// 形状为 `[num_candidates][num_channels]` 的原始输出张量
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  num_candidates: usize,
  num_channels: usize,
  data: Vec<f32>,
}

impl RawOutput {
  pub fn new(
    num_candidates: usize,
    num_channels: usize,
    data: Vec<f32>,
  ) -> Result<Self, ModelError> {
    let expected = num_candidates * num_channels;
    if data.len() != expected {
      return Err(ModelError::OutputLengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      num_candidates,
      num_channels,
      data,
    })
  }

  pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, ModelError> {
    let num_channels = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
    let mut data = Vec::with_capacity(rows.len() * num_channels);
    for row in rows {
      let row = row.as_ref();
      if row.len() != num_channels {
        return Err(ModelError::OutputLengthMismatch {
          expected: num_channels,
          actual: row.len(),
        });
      }
      data.extend_from_slice(row);
    }
    Ok(Self {
      num_candidates: rows.len(),
      num_channels,
      data,
    })
  }

  pub fn num_candidates(&self) -> usize {
    self.num_candidates
  }

  pub fn num_channels(&self) -> usize {
    self.num_channels
  }

  pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
    // chunks_exact 在通道数为 0 时会 panic
    self.data.chunks_exact(self.num_channels.max(1))
  }
}

/// 检测器配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
  pub confidence_threshold: f32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
    }
  }
}

impl DetectorConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn validate(&self) -> Result<(), ModelError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ModelError::InvalidThreshold(self.confidence_threshold));
    }
    Ok(())
  }
}

mod decode;
mod detector;
pub use self::decode::DetectionDecoder;
pub use self::detector::ObjectDetector;

#[cfg(feature = "onnx_engine")]
mod onnx;
#[cfg(feature = "onnx_engine")]
pub use self::onnx::{OnnxEngine, OnnxEngineBuilder, OnnxEngineError};
