// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/model/detector.rs - 目标检测器
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

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  frame::TensorEncoder,
  label::LabelTable,
  model::{
    DetectResult, DetectionDecoder, DetectorConfig, InferenceEngine, Model, ModelError, ModelShape,
    RawOutput,
  },
};

/// 目标检测器
///
/// 推理引擎、模型形状与标签表在构造时一次性确定，之后只读。
pub struct ObjectDetector<E> {
  engine: E,
  shape: ModelShape,
  labels: Arc<LabelTable>,
  encoder: TensorEncoder,
  decoder: DetectionDecoder,
}

impl<E: InferenceEngine> ObjectDetector<E> {
  pub fn new(
    engine: E,
    labels: Arc<LabelTable>,
    config: DetectorConfig,
  ) -> Result<Self, ModelError> {
    config.validate()?;

    let shape = ModelShape::from_engine(&engine)?;
    info!(
      "模型输入: {}x{}, 候选数: {}, 通道数: {}",
      shape.input_width, shape.input_height, shape.num_candidates, shape.num_channels
    );
    shape.check_labels(labels.len())?;

    let encoder = TensorEncoder::new(shape.input_width as u32, shape.input_height as u32);
    let decoder = DetectionDecoder::new(config.confidence_threshold);
    debug!("置信度阈值: {}", config.confidence_threshold);

    Ok(Self {
      engine,
      shape,
      labels,
      encoder,
      decoder,
    })
  }

  pub fn shape(&self) -> &ModelShape {
    &self.shape
  }

  pub fn labels(&self) -> &Arc<LabelTable> {
    &self.labels
  }

  pub fn detect(&self, image: &RgbImage) -> Result<DetectResult, ModelError> {
    let input = self.encoder.encode(image);

    debug!("执行模型推理");
    let data = self
      .engine
      .run(&input)
      .map_err(|e| ModelError::InferenceError(Box::new(e)))?;

    let output = RawOutput::new(self.shape.num_candidates, self.shape.num_channels, data)?;
    let items = self.decoder.decode(&output, &self.labels)?;
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      image_width: image.width(),
      image_height: image.height(),
    })
  }
}

impl<E: InferenceEngine> Model for ObjectDetector<E> {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}
