// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Frame,
  model::{DetectResult, Detection},
  output::Render,
  url_path, url_query,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("不支持的记录格式: {0}")]
  UnsupportedFormat(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 检测记录的文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
  /// 每行 `label, confidence, left, top, right, bottom`
  #[default]
  Text,
  /// 每行一个 JSON 对象
  Json,
}

impl RecordFormat {
  fn extension(&self) -> &'static str {
    match self {
      RecordFormat::Text => "txt",
      RecordFormat::Json => "jsonl",
    }
  }

  fn format_line(&self, frame: &Frame, item: &Detection) -> Result<String, serde_json::Error> {
    let bbox = &item.bbox;
    match self {
      RecordFormat::Text => Ok(format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        item.label, item.confidence, bbox.left, bbox.top, bbox.right, bbox.bottom
      )),
      RecordFormat::Json => serde_json::to_string(&json!({
        "frame": frame.index,
        "label": item.label,
        "confidence": item.confidence,
        "bbox": [bbox.left, bbox.top, bbox.right, bbox.bottom],
      })),
    }
  }
}

/// 按日期分目录记录每帧的检测结果（归一化坐标）
///
/// URL 形如 `folder:///records?format=json&always&frame`：
/// `always` 时无检测结果的帧也写出空记录，`frame` 时同时保存原始帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  format: RecordFormat,
  frame_counter: AtomicU16,
  always: bool,
  save_frame: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let format = match url_query(uri, "format").as_deref() {
      None | Some("text") => RecordFormat::Text,
      Some("json") => RecordFormat::Json,
      Some(other) => {
        return Err(DirectoryRecordOutputError::UnsupportedFormat(
          other.to_string(),
        ));
      }
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let save_frame = uri.query_pairs().any(|(k, _)| k == "frame");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_path(uri)),
      format,
      frame_counter: AtomicU16::new(0),
      always,
      save_frame,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn format(&self) -> RecordFormat {
    self.format
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// `<dir>/YYYY/MM/DD/HH-MM-SS-XXXX`，不带扩展名
  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(
    &self,
    path: &Path,
    frame: &Frame,
    result: &DetectResult,
  ) -> Result<PathBuf, DirectoryRecordOutputError> {
    let lines = result
      .items
      .iter()
      .map(|item| self.format.format_line(frame, item))
      .collect::<Result<Vec<_>, _>>()?;

    let record_path = path.with_extension(self.format.extension());
    std::fs::write(&record_path, lines.join("\n"))?;
    Ok(record_path)
  }
}

impl Render<Frame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("第 {} 帧没有检测结果，跳过记录", frame.index);
      return Ok(());
    }

    let path = self.frame_path()?;
    let record_path = self.write_record(&path, frame, result)?;
    if self.save_frame {
      frame.image.save(path.with_extension("png"))?;
    }

    info!(
      "记录第 {} 帧 {} 个检测结果到: {}",
      frame.index,
      result.len(),
      record_path.display()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;
  use image::RgbImage;

  fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        collect_files(&path, files);
      } else {
        files.push(path);
      }
    }
  }

  fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files(dir, &mut files);
    files.sort();
    files
  }

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  fn frame() -> Frame {
    Frame {
      index: 7,
      image: RgbImage::new(4, 4),
    }
  }

  fn result(items: Vec<Detection>) -> DetectResult {
    DetectResult {
      items: items.into_boxed_slice(),
      image_width: 4,
      image_height: 4,
    }
  }

  fn dog() -> Detection {
    Detection {
      bbox: BoundingBox::new(0.4, 0.4, 0.6, 0.6),
      label: "dog".to_string(),
      confidence: 0.9,
    }
  }

  #[test]
  fn text_record() {
    let dir = tempfile::tempdir().unwrap();
    let output = output(dir.path(), "");
    assert_eq!(output.directory(), dir.path());
    assert_eq!(output.format(), RecordFormat::Text);

    output.render_result(&frame(), &result(vec![dog()])).unwrap();

    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().unwrap(), "txt");
    assert!(files[0].to_string_lossy().ends_with("-0001.txt"));
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(content, "dog, 0.9000, 0.4000, 0.4000, 0.6000, 0.6000");
  }

  #[test]
  fn json_record_with_frame() {
    let dir = tempfile::tempdir().unwrap();
    let output = output(dir.path(), "?format=json&frame");
    output.render_result(&frame(), &result(vec![dog()])).unwrap();

    let files = files_under(dir.path());
    assert_eq!(files.len(), 2);
    let record = files
      .iter()
      .find(|p| p.extension().unwrap() == "jsonl")
      .unwrap();
    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(record).unwrap()).unwrap();
    assert_eq!(value["label"], "dog");
    assert_eq!(value["frame"], 7);
    assert_eq!(value["bbox"].as_array().unwrap().len(), 4);
    assert!(files.iter().any(|p| p.extension().unwrap() == "png"));
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    output(dir.path(), "").render_result(&frame(), &result(vec![])).unwrap();
    assert!(files_under(dir.path()).is_empty());

    output(dir.path(), "?always").render_result(&frame(), &result(vec![])).unwrap();
    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "");
  }

  #[test]
  fn unsupported_format() {
    let url = url::Url::parse("folder:///tmp/records?format=xml").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::UnsupportedFormat(f)) if f == "xml"
    ));
  }
}
