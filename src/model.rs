// 该文件是 Kanjian （看见） 项目的一部分。
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::ModelFrame};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 一次推理的四个并行输出
///
/// `locations` 每个检测占 4 个值，顺序为 [top, left, bottom, right]，
/// 均为 0~1 的归一化坐标；`classes` 与 `scores` 每个检测占 1 个值。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
  pub locations: Vec<f32>,
  pub classes: Vec<f32>,
  pub scores: Vec<f32>,
  pub count: f32,
}

/// 单个检测在数组中的视图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub index: usize,
  /// [top, left, bottom, right]
  pub location: [f32; 4],
  pub class_index: f32,
  pub score: f32,
}

/// 遍历检测时使用的上界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DetectionBound {
  /// 遍历整个分数数组
  #[default]
  ArrayLength,
  /// 只遍历模型报告的数量（不超过数组长度）
  ReportedCount,
}

impl DetectionResult {
  pub fn validate(&self) -> Result<(), ModelError> {
    let n = self.scores.len();
    if self.locations.len() != 4 * n || self.classes.len() != n {
      return Err(ModelError::MalformedOutput {
        locations: self.locations.len(),
        classes: self.classes.len(),
        scores: n,
      });
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  pub fn limit(&self, bound: DetectionBound) -> usize {
    match bound {
      DetectionBound::ArrayLength => self.len(),
      DetectionBound::ReportedCount => {
        if self.count.is_finite() && self.count > 0.0 {
          (self.count as usize).min(self.len())
        } else {
          0
        }
      }
    }
  }

  pub fn get(&self, index: usize) -> Option<Detection> {
    let base = index * 4;
    let location = self.locations.get(base..base + 4)?;
    Some(Detection {
      index,
      location: [location[0], location[1], location[2], location[3]],
      class_index: *self.classes.get(index)?,
      score: *self.scores.get(index)?,
    })
  }

  pub fn iter(&self, bound: DetectionBound) -> impl Iterator<Item = Detection> + '_ {
    (0..self.limit(bound)).filter_map(|i| self.get(i))
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型输出格式错误: locations={locations}, classes={classes}, scores={scores}")]
  MalformedOutput {
    locations: usize,
    classes: usize,
    scores: usize,
  },
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("回放文件解析错误: {0}")]
  ReplayParseError(#[from] serde_json::Error),
  #[cfg(feature = "ssd_onnx")]
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

mod replay;
pub use self::replay::ReplayModel;

#[cfg(feature = "ssd_onnx")]
mod ssd_onnx;
#[cfg(feature = "ssd_onnx")]
pub use self::ssd_onnx::{SsdMobilenet, SsdMobilenetBuilder};

pub enum ModelWrapper {
  Replay(ReplayModel),
  #[cfg(feature = "ssd_onnx")]
  SsdMobilenet(SsdMobilenet),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayModel::SCHEME => Ok(ModelWrapper::Replay(ReplayModel::from_url(url)?)),
      #[cfg(feature = "ssd_onnx")]
      SsdMobilenetBuilder::SCHEME => Ok(ModelWrapper::SsdMobilenet(
        SsdMobilenetBuilder::from_url(url)?.build()?,
      )),
      other => Err(ModelError::SchemeMismatch(format!(
        "不支持的模型方案 '{}'",
        other
      ))),
    }
  }
}

impl Model for ModelWrapper {
  type Input = ModelFrame;
  type Output = DetectionResult;
  type Error = ModelError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match self {
      ModelWrapper::Replay(model) => model.infer(input),
      #[cfg(feature = "ssd_onnx")]
      ModelWrapper::SsdMobilenet(model) => model.infer(input),
    }
  }
}

/// 持有模型句柄，析构时释放
pub struct ModelHandle<M> {
  name: String,
  model: M,
}

impl<M> ModelHandle<M> {
  pub fn acquire(name: impl Into<String>, model: M) -> Self {
    let name = name.into();
    info!("模型已加载: {}", name);
    Self { name, model }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl<M: Model> Model for ModelHandle<M> {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.model.infer(input)
  }
}

impl<M> Drop for ModelHandle<M> {
  fn drop(&mut self) {
    info!("模型已释放: {}", self.name);
  }
}
