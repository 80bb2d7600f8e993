// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::{path::Path, str::FromStr};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件为空")]
  Empty,
}

/// 有序的类别名称表，第 `i` 个标签对应输出张量的第 `4 + i` 个通道
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  labels: Box<[String]>,
}

impl LabelTable {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let table = text.parse::<Self>()?;
    info!("标签加载完成，共 {} 个类别", table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl FromStr for LabelTable {
  type Err = LabelError;

  // 每行一个标签；末尾换行不产生空标签，中间的空行按顺序保留
  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let labels: Vec<String> = text.lines().map(str::to_string).collect();
    if labels.is_empty() {
      return Err(LabelError::Empty);
    }
    debug!("标签: {:?}", labels);
    Ok(Self {
      labels: labels.into_boxed_slice(),
    })
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  #[test]
  fn parses_one_label_per_line() {
    let table: LabelTable = "person\nbicycle\ncar\n".parse().unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(0), Some("person"));
    assert_eq!(table.get(2), Some("car"));
    assert_eq!(table.get(3), None);
  }

  #[test]
  fn crlf_and_inner_blank_lines() {
    let table: LabelTable = "cat\r\n\r\ndog".parse().unwrap();
    assert_eq!(table.iter().collect::<Vec<_>>(), vec!["cat", "", "dog"]);
  }

  #[test]
  fn empty_file_is_rejected() {
    assert!(matches!("".parse::<LabelTable>(), Err(LabelError::Empty)));
  }

  #[test]
  fn loads_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "cat\ndog\nbird\n").unwrap();
    let table = LabelTable::from_path(file.path()).unwrap();
    assert_eq!(
      table,
      ["cat", "dog", "bird"].into_iter().collect::<LabelTable>()
    );
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let result = LabelTable::from_path("/nonexistent/labels.txt");
    assert!(matches!(result, Err(LabelError::IoError(_))));
  }
}
