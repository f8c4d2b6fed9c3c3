// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/ssd_onnx.rs - SSD MobileNet（ONNX Runtime）
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

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, ModelFrame},
  model::{DetectionResult, Model, ModelError},
};

const SSD_NUM_INPUTS: usize = 1;
const SSD_NUM_OUTPUTS: usize = 4;
// 按 locations, classes, scores, count 的顺序
const SSD_OUTPUT_NAMES: [&str; SSD_NUM_OUTPUTS] = [
  "detection_boxes",
  "detection_classes",
  "detection_scores",
  "num_detections",
];

pub struct SsdMobilenet {
  session: Session,
  input_name: String,
  output_names: [String; SSD_NUM_OUTPUTS],
}

pub struct SsdMobilenetBuilder {
  model_path: String,
}

impl FromUrlWithScheme for SsdMobilenetBuilder {
  const SCHEME: &'static str = "ssd";
}

impl FromUrl for SsdMobilenetBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(SsdMobilenetBuilder {
      model_path: url.path().to_string(),
    })
  }
}

/// 先按名称（允许 `:0` 后缀）匹配输出，找不到时按位置取
fn resolve_output_names(available: &[String]) -> Option<[String; SSD_NUM_OUTPUTS]> {
  let by_name = SSD_OUTPUT_NAMES.map(|wanted| {
    available
      .iter()
      .find(|name| name.as_str() == wanted || name.strip_suffix(":0") == Some(wanted))
      .cloned()
  });
  if by_name.iter().all(Option::is_some) {
    return Some(by_name.map(|name| name.unwrap_or_default()));
  }

  if available.len() < SSD_NUM_OUTPUTS {
    return None;
  }
  Some([
    available[0].clone(),
    available[1].clone(),
    available[2].clone(),
    available[3].clone(),
  ])
}

impl SsdMobilenetBuilder {
  pub fn build(self) -> Result<SsdMobilenet, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let session = Session::builder()?.commit_from_file(&self.model_path)?;

    let num_inputs = session.inputs.len();
    if num_inputs != SSD_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        SSD_NUM_INPUTS, num_inputs
      );
      return Err(ModelError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        SSD_NUM_INPUTS, num_inputs
      )));
    }
    let input_name = session.inputs[0].name.clone();

    let available: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    debug!("模型输出: {:?}", available);
    let output_names = resolve_output_names(&available).ok_or_else(|| {
      ModelError::ModelInvalid(format!(
        "预期模型输出数量至少为 {}, 实际为 {}",
        SSD_NUM_OUTPUTS,
        available.len()
      ))
    })?;

    info!("模型加载完成，输入: {}", input_name);
    Ok(SsdMobilenet {
      session,
      input_name,
      output_names,
    })
  }
}

impl Model for SsdMobilenet {
  type Input = ModelFrame;
  type Output = DetectionResult;
  type Error = ModelError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let shape = [1usize, input.height(), input.width(), input.channels()];
    let tensor = Tensor::from_array((shape, input.as_nhwc().to_vec().into_boxed_slice()))?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => tensor])?;

    let mut arrays: [Vec<f32>; SSD_NUM_OUTPUTS] = Default::default();
    for (slot, name) in arrays.iter_mut().zip(self.output_names.iter()) {
      let (_shape, data) = outputs[name.as_str()].try_extract_tensor::<f32>()?;
      *slot = data.to_vec();
    }
    let [locations, classes, scores, count] = arrays;

    let result = DetectionResult {
      locations,
      classes,
      scores,
      count: count.first().copied().unwrap_or(0.0),
    };
    result.validate()?;
    debug!("模型报告 {} 个检测", result.count);
    Ok(result)
  }
}
