// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/replay.rs - 回放已记录的模型输出
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

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ModelFrame,
  model::{DetectionResult, Model, ModelError},
};

/// 不运行网络，对任意输入帧返回同一份记录好的输出
///
/// 文件格式为 JSON：
/// `{"locations": [...], "classes": [...], "scores": [...], "count": 1.0}`
#[derive(Debug, Clone)]
pub struct ReplayModel {
  output: DetectionResult,
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(format!(
        "期望模型方案 '{}', 实际模型方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = url.path();
    info!("加载回放文件: {}", path);
    let data = std::fs::read(path)?;
    let output: DetectionResult = serde_json::from_slice(&data)?;
    Self::new(output)
  }
}

impl ReplayModel {
  pub fn new(output: DetectionResult) -> Result<Self, ModelError> {
    output.validate()?;
    debug!("回放输出包含 {} 个候选", output.len());
    Ok(Self { output })
  }
}

impl Model for ReplayModel {
  type Input = ModelFrame;
  type Output = DetectionResult;
  type Error = ModelError;

  fn infer(&mut self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(self.output.clone())
  }
}
