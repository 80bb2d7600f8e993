// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/main.rs - 项目主程序
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use huiyan::{
  FromUrl,
  input::InputWrapper,
  label::LabelTable,
  model::{DEFAULT_CONFIDENCE_THRESHOLD, DetectorConfig, ObjectDetector, OnnxEngineBuilder},
  output::OutputWrapper,
  task::{ContinuousTask, OneShotTask, Task, install_interrupt_handler},
};

/// Huiyan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型，例如 onnx:///models/detect.onnx?size=320x320
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件，每行一个类别名
  #[arg(long, value_name = "LABELS")]
  pub labels: PathBuf,
  /// 输入来源，例如 image:///frames/
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///out.png?view=1280x720 或 folder:///records?format=json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值
  #[arg(long, value_name = "CONFIDENCE", default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
  pub confidence: f32,
  /// 处理指定帧数后退出
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 只处理第一帧
  #[arg(long)]
  pub one_shot: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("标签文件路径: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.confidence);

  let labels = Arc::new(LabelTable::from_path(&args.labels)?);
  let engine = OnnxEngineBuilder::from_url(&args.model)?.build()?;
  let config = DetectorConfig::default().with_confidence_threshold(args.confidence);
  let model = ObjectDetector::new(engine, labels, config)?;

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  if args.one_shot {
    OneShotTask.run_task(input, model, output)?;
  } else {
    let stop = install_interrupt_handler()?;
    ContinuousTask::default()
      .with_frame_number(args.frame_number)
      .with_stop_flag(stop)
      .run_task(input, model, output)?;
  }

  Ok(())
}
