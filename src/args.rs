// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use kanjian::{model::DetectionBound, output::draw::CONFIDENCE_THRESHOLD, selector::SourceChoice};

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型
  /// - ONNX SSD MobileNet: ssd:///path/to/model.onnx
  /// - 回放记录的输出: replay:///path/to/outputs.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 标签文件，每行一个类别名称
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 显示输出，例如 image:///tmp/display.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 图库图像，例如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<Url>,

  /// 相机设备
  #[arg(long, value_name = "CAMERA", default_value = "v4l:///dev/video0")]
  pub camera: Url,

  /// 图像来源；不指定时在终端中询问
  #[arg(long, value_enum, value_name = "SOURCE")]
  pub source: Option<SourceChoice>,

  /// 置信度阈值 (0.0 - 1.0)，严格大于才显示
  #[arg(long, default_value_t = CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 遍历检测结果的上界
  #[arg(long, value_enum, default_value_t = DetectionBound::ArrayLength)]
  pub bound: DetectionBound,

  /// 标签字体（TTF/OTF）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}
