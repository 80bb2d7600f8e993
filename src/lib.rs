// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod frame;
pub mod input;
pub mod label;
pub mod model;
pub mod output;
pub mod overlay;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 对 URL 路径做百分号解码，解码失败时保留原始路径
pub fn url_path(url: &url::Url) -> String {
  let path = url.path();
  match urlencoding::decode(path) {
    Ok(decoded) => decoded.into_owned(),
    Err(_) => path.to_string(),
  }
}

/// 读取 URL 中的查询参数
pub fn url_query(url: &url::Url, key: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.into_owned())
}

/// 解析 `WxH` 形式的尺寸，宽高都必须大于 0
pub fn parse_size(text: &str) -> Option<(u32, u32)> {
  let (w, h) = text.split_once('x')?;
  let (w, h): (u32, u32) = (w.trim().parse().ok()?, h.trim().parse().ok()?);
  (w > 0 && h > 0).then_some((w, h))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = url::Url::parse("image:///tmp/my%20frames/a.png").unwrap();
    assert_eq!(url_path(&url), "/tmp/my frames/a.png");
  }

  #[test]
  fn url_query_finds_first_value() {
    let url = url::Url::parse("image:///tmp/out.png?view=640x480&font=/a.ttf").unwrap();
    assert_eq!(url_query(&url, "view").as_deref(), Some("640x480"));
    assert_eq!(url_query(&url, "font").as_deref(), Some("/a.ttf"));
    assert_eq!(url_query(&url, "stroke"), None);
  }

  #[test]
  fn size_parsing() {
    assert_eq!(parse_size("640x480"), Some((640, 480)));
    assert_eq!(parse_size("640X480"), None);
    assert_eq!(parse_size("0x480"), None);
    assert_eq!(parse_size("640"), None);
  }
}
