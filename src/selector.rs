// 该文件是 Kanjian （看见） 项目的一部分。
// src/selector.rs - 图像来源选择
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

use std::io::{BufRead, Write};

use tracing::debug;

use crate::input::RequestCode;

/// 三选一：拍照、从图库选择、取消
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceChoice {
  Camera,
  Gallery,
  Cancel,
}

impl SourceChoice {
  pub const ITEMS: [&'static str; 3] = ["Take Photo", "Choose from Library", "Cancel"];

  pub fn from_item(item: &str) -> Option<Self> {
    match item {
      "Take Photo" => Some(SourceChoice::Camera),
      "Choose from Library" => Some(SourceChoice::Gallery),
      "Cancel" => Some(SourceChoice::Cancel),
      _ => None,
    }
  }

  pub fn item(self) -> &'static str {
    match self {
      SourceChoice::Camera => Self::ITEMS[0],
      SourceChoice::Gallery => Self::ITEMS[1],
      SourceChoice::Cancel => Self::ITEMS[2],
    }
  }

  /// 取消时没有请求
  pub fn request(self) -> Option<RequestCode> {
    match self {
      SourceChoice::Camera => Some(RequestCode::CameraCapture),
      SourceChoice::Gallery => Some(RequestCode::GalleryPick),
      SourceChoice::Cancel => None,
    }
  }

  /// 在终端列出选项并读取一行；输入结束视为取消
  pub fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> std::io::Result<Self> {
    loop {
      for (i, item) in Self::ITEMS.iter().enumerate() {
        writeln!(output, "  {}. {}", i + 1, item)?;
      }
      write!(output, "> ")?;
      output.flush()?;

      let mut line = String::new();
      if input.read_line(&mut line)? == 0 {
        return Ok(SourceChoice::Cancel);
      }
      let line = line.trim();
      debug!("选择输入: {:?}", line);

      let choice = match line.parse::<usize>() {
        Ok(n) if (1..=Self::ITEMS.len()).contains(&n) => Self::from_item(Self::ITEMS[n - 1]),
        _ => Self::from_item(line).or_else(|| {
          <Self as clap::ValueEnum>::from_str(line, true).ok()
        }),
      };
      match choice {
        Some(choice) => return Ok(choice),
        None => writeln!(output, "无效的选择: {}", line)?,
      }
    }
  }
}
