// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/model/decode.rs - 检测输出解码
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

use crate::{
  label::LabelTable,
  model::{BOX_CHANNELS, BoundingBox, DEFAULT_CONFIDENCE_THRESHOLD, Detection, ModelError, RawOutput},
};

/// 将原始输出张量解码为检测结果
///
/// 每行一个候选：前 4 个通道为归一化的 cx, cy, w, h，其余为各类别得分。
/// 不做非极大值抑制，输出顺序与候选顺序一致。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionDecoder {
  confidence_threshold: f32,
}

impl Default for DetectionDecoder {
  fn default() -> Self {
    Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
  }
}

impl DetectionDecoder {
  pub fn new(confidence_threshold: f32) -> Self {
    Self {
      confidence_threshold,
    }
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn decode(
    &self,
    output: &RawOutput,
    labels: &LabelTable,
  ) -> Result<Vec<Detection>, ModelError> {
    decode(output, labels, self.confidence_threshold)
  }
}

/// 取得分最高的类别通道，得分相同时取靠前的通道
fn best_class(scores: &[f32]) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (idx, &score) in scores.iter().enumerate() {
    if best.is_none_or(|(_, max)| score > max) && !score.is_nan() {
      best = Some((idx, score));
    }
  }
  best
}

pub fn decode(
  output: &RawOutput,
  labels: &LabelTable,
  confidence_threshold: f32,
) -> Result<Vec<Detection>, ModelError> {
  // 标签数与通道数不一致属于配置错误，在解码任何候选之前拒绝
  if output.num_channels() != BOX_CHANNELS + labels.len() {
    return Err(ModelError::LabelMismatch {
      channels: output.num_channels(),
      labels: labels.len(),
    });
  }

  let mut items = Vec::new();
  let mut rejected = 0usize;

  for (idx, row) in output.rows().enumerate() {
    let Some((class_idx, score)) = best_class(&row[BOX_CHANNELS..]) else {
      continue;
    };

    if score <= confidence_threshold {
      continue;
    }

    let label = labels.get(class_idx).ok_or(ModelError::LabelMismatch {
      channels: output.num_channels(),
      labels: labels.len(),
    })?;

    let bbox = BoundingBox::from_center(row[0], row[1], row[2], row[3]);
    if !bbox.is_normalized() {
      rejected += 1;
      debug!("候选 {} 边框越界，丢弃: {:?}", idx, bbox);
      continue;
    }

    items.push(Detection {
      bbox,
      label: label.to_string(),
      confidence: score,
    });
  }

  debug!(
    "解码完成: {} 个候选, {} 个检测, {} 个越界",
    output.num_candidates(),
    items.len(),
    rejected
  );

  Ok(items)
}
