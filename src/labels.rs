// 该文件是 Kanjian （看见） 项目的一部分。
// src/labels.rs - 类别标签表
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

use std::io::BufRead;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

/// 类别下标越界时显示的名称
pub const UNKNOWN_LABEL: &str = "???";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 按类别下标排列的类别名称，启动时加载一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  names: Box<[String]>,
}

impl LabelTable {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let io_err = |source| LabelError::Io {
      path: path.display().to_string(),
      source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;
    let table = Self::from_reader(std::io::BufReader::new(file)).map_err(io_err)?;
    if table.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }
    debug!("共 {} 个类别", table.len());
    Ok(table)
  }

  /// 逐行读取，去除首尾空白并跳过空行
  pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, std::io::Error> {
    let mut names = Vec::new();
    for line in reader.lines() {
      let line = line?;
      let name = line.trim();
      if !name.is_empty() {
        names.push(name.to_string());
      }
    }
    Ok(Self {
      names: names.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  /// 模型以浮点数编码类别下标，截断取整
  pub fn name_for(&self, class_index: f32) -> &str {
    if !class_index.is_finite() || class_index < 0.0 {
      return UNKNOWN_LABEL;
    }
    self.get(class_index as usize).unwrap_or(UNKNOWN_LABEL)
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}
