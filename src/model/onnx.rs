// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/model/onnx.rs - ONNX 推理引擎
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
use tracing::{debug, error, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::InputTensor, model::InferenceEngine, parse_size, url_path,
  url_query,
};

const ONNX_NUM_INPUTS: usize = 1;
const ONNX_NUM_OUTPUTS: usize = 1;

#[derive(Error, Debug)]
pub enum OnnxEngineError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("Tract 错误: {0}")]
  TractError(Box<dyn std::error::Error + Send + Sync>),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<std::io::Error> for OnnxEngineError {
  fn from(err: std::io::Error) -> Self {
    OnnxEngineError::ModelLoadError(err)
  }
}

impl From<TractError> for OnnxEngineError {
  fn from(err: TractError) -> Self {
    OnnxEngineError::TractError(err.into())
  }
}

impl OnnxEngineError {
  pub fn invalid(msg: &str) -> Self {
    OnnxEngineError::ModelInvalid(msg.to_string())
  }
}

pub struct OnnxEngine {
  model: TypedRunnableModel<TypedModel>,
  input_dims: Vec<usize>,
  output_dims: Vec<usize>,
}

pub struct OnnxEngineBuilder {
  model_path: String,
  input_size: Option<(usize, usize)>,
}

impl FromUrlWithScheme for OnnxEngineBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxEngineBuilder {
  type Error = OnnxEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxEngineError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let input_size = match url_query(url, "size") {
      Some(size) => {
        let (w, h) = parse_size(&size).ok_or_else(|| {
          OnnxEngineError::ModelPathError(format!("无法解析输入尺寸: {}", size))
        })?;
        Some((w as usize, h as usize))
      }
      None => None,
    };

    Ok(OnnxEngineBuilder {
      model_path: url_path(url),
      input_size,
    })
  }
}

fn concrete_dims(fact: &TypedFact, what: &str) -> Result<Vec<usize>, OnnxEngineError> {
  match fact.shape.as_concrete() {
    Some(dims) => Ok(dims.to_vec()),
    None => {
      error!("{}形状不是静态形状: {:?}", what, fact.shape);
      Err(OnnxEngineError::invalid(&format!(
        "{}形状不是静态形状，请导出静态尺寸模型或指定 size 参数",
        what
      )))
    }
  }
}

impl OnnxEngineBuilder {
  /// 显式指定模型输入尺寸，用于动态尺寸的模型
  pub fn input_size(mut self, width: usize, height: usize) -> Self {
    self.input_size = Some((width, height));
    self
  }

  pub fn build(self) -> Result<OnnxEngine, OnnxEngineError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let mut model = tract_onnx::onnx().model_for_read(&mut std::io::Cursor::new(&model_data))?;

    if model.inputs.len() != ONNX_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        model.inputs.len()
      );
      return Err(OnnxEngineError::invalid(&format!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS,
        model.inputs.len()
      )));
    }

    if model.outputs.len() != ONNX_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        ONNX_NUM_OUTPUTS,
        model.outputs.len()
      );
      return Err(OnnxEngineError::invalid(&format!(
        "预期模型输出数量为 {}, 实际为 {}",
        ONNX_NUM_OUTPUTS,
        model.outputs.len()
      )));
    }

    if let Some((w, h)) = self.input_size {
      debug!("指定模型输入尺寸: {}x{}", w, h);
      let fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, w, h, 3));
      model = model.with_input_fact(0, fact)?;
    }

    info!("优化模型");
    let model = model.into_optimized()?;

    let input_dims = concrete_dims(model.input_fact(0)?, "输入")?;
    let output_dims = concrete_dims(model.output_fact(0)?, "输出")?;
    debug!("模型输入形状: {:?}", input_dims);
    debug!("模型输出形状: {:?}", output_dims);

    let model = model.into_runnable()?;
    info!("模型加载完成");

    Ok(OnnxEngine {
      model,
      input_dims,
      output_dims,
    })
  }
}

impl InferenceEngine for OnnxEngine {
  type Error = OnnxEngineError;

  fn input_dims(&self) -> &[usize] {
    &self.input_dims
  }

  fn output_dims(&self) -> &[usize] {
    &self.output_dims
  }

  fn run(&self, input: &InputTensor) -> Result<Vec<f32>, Self::Error> {
    let tensor = Tensor::from_shape(&self.input_dims, input.as_slice())?;
    let outputs = self.model.run(tvec!(tensor.into()))?;
    let view = outputs[0].to_array_view::<f32>()?;
    Ok(view.iter().copied().collect())
  }
}
