// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 检测结果叠加绘制
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

use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::{
  labels::LabelTable,
  model::{DetectionBound, DetectionResult},
};

/// 默认置信度阈值，严格大于才显示
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;
// 线宽与字号按图像高度缩放
const STROKE_DIVISOR: f32 = 85.0;
const TEXT_SIZE_DIVISOR: f32 = 15.0;

const FALLBACK_FONTS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/Library/Fonts/Arial.ttf",
];

/// 按检测序号（而非类别）循环取色
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
  colors: Box<[Rgb<u8>]>,
}

impl Default for Palette {
  fn default() -> Self {
    Self {
      colors: Box::new([
        Rgb([0, 0, 255]),     // 蓝
        Rgb([0, 255, 0]),     // 绿
        Rgb([255, 0, 0]),     // 红
        Rgb([0, 255, 255]),   // 青
        Rgb([136, 136, 136]), // 灰
        Rgb([0, 0, 0]),       // 黑
        Rgb([68, 68, 68]),    // 深灰
        Rgb([255, 0, 255]),   // 品红
        Rgb([255, 255, 0]),   // 黄
        Rgb([255, 0, 0]),     // 红
      ]),
    }
  }
}

impl Palette {
  pub fn new(colors: Vec<Rgb<u8>>) -> Option<Self> {
    if colors.is_empty() {
      return None;
    }
    Some(Self {
      colors: colors.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.colors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }

  pub fn color(&self, index: usize) -> Rgb<u8> {
    self.colors[index % self.colors.len()]
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlaySettings {
  pub threshold: f32,
  pub bound: DetectionBound,
}

impl Default for OverlaySettings {
  fn default() -> Self {
    Self {
      threshold: CONFIDENCE_THRESHOLD,
      bound: DetectionBound::ArrayLength,
    }
  }
}

/// 像素坐标下的矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl PixelBox {
  /// location 为 [top, left, bottom, right]
  pub fn from_normalized(location: [f32; 4], width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    Self {
      left: location[1] * w,
      top: location[0] * h,
      right: location[3] * w,
      bottom: location[2] * h,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
  pub index: usize,
  pub rect: PixelBox,
  pub color: Rgb<u8>,
  pub label: String,
  /// 文本基线的起点，即框的左上角
  pub anchor: (f32, f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPlan {
  pub stroke_width: f32,
  pub text_size: f32,
  pub items: Vec<OverlayItem>,
}

impl OverlayPlan {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 分数保留小数点，整数值显示为 `1.0`
pub fn label_text(labels: &LabelTable, class_index: f32, score: f32) -> String {
  format!("{} {:?}", labels.name_for(class_index), score)
}

/// 计算要绘制的内容，不触碰像素
pub fn plan_overlay(
  result: &DetectionResult,
  labels: &LabelTable,
  palette: &Palette,
  settings: &OverlaySettings,
  (width, height): (u32, u32),
) -> OverlayPlan {
  let items = result
    .iter(settings.bound)
    .filter(|d| d.score > settings.threshold)
    .map(|d| {
      let rect = PixelBox::from_normalized(d.location, width, height);
      OverlayItem {
        index: d.index,
        rect,
        color: palette.color(d.index),
        label: label_text(labels, d.class_index, d.score),
        anchor: (rect.left, rect.top),
      }
    })
    .collect();

  OverlayPlan {
    stroke_width: height as f32 / STROKE_DIVISOR,
    text_size: height as f32 / TEXT_SIZE_DIVISOR,
    items,
  }
}

pub struct Draw {
  font: Option<FontArc>,
}

impl Draw {
  pub fn without_font() -> Self {
    Self { font: None }
  }

  pub fn with_font(font: FontArc) -> Self {
    Self { font: Some(font) }
  }

  /// 优先使用指定字体，否则尝试常见的系统字体
  pub fn load(font_path: Option<&Path>) -> Self {
    let candidates: Vec<PathBuf> = match font_path {
      Some(path) => vec![path.to_path_buf()],
      None => FALLBACK_FONTS.iter().map(PathBuf::from).collect(),
    };

    for path in candidates {
      match std::fs::read(&path) {
        Ok(data) => match FontArc::try_from_vec(data) {
          Ok(font) => {
            info!("使用字体: {}", path.display());
            return Self::with_font(font);
          }
          Err(e) => warn!("无法解析字体 {}: {}", path.display(), e),
        },
        Err(e) => debug!("无法读取字体 {}: {}", path.display(), e),
      }
    }

    warn!("没有可用字体，将只绘制边框");
    Self::without_font()
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn draw_overlay(&self, image: &mut RgbImage, plan: &OverlayPlan) {
    let thickness = plan.stroke_width.round().max(1.0) as i32;
    for item in plan.items.iter() {
      draw_box(image, &item.rect, item.color, thickness);
      if let Some(font) = &self.font {
        draw_label(image, font, plan.text_size, item);
      }
    }
    debug!("绘制了 {} 个检测框", plan.items.len());
  }
}

// 线宽以边线为中心向两侧展开
fn draw_box(image: &mut RgbImage, rect: &PixelBox, color: Rgb<u8>, thickness: i32) {
  let x0 = rect.left.round() as i32;
  let y0 = rect.top.round() as i32;
  let x1 = rect.right.round() as i32;
  let y1 = rect.bottom.round() as i32;
  if x1 <= x0 || y1 <= y0 {
    return;
  }

  let start = -(thickness / 2);
  for offset in start..start + thickness {
    let (left, top) = (x0 - offset, y0 - offset);
    let width = x1 - x0 + 2 * offset + 1;
    let height = y1 - y0 + 2 * offset + 1;
    if width <= 0 || height <= 0 {
      continue;
    }
    let r = Rect::at(left, top).of_size(width as u32, height as u32);
    draw_hollow_rect_mut(image, r, color);
  }
}

fn draw_label(image: &mut RgbImage, font: &FontArc, text_size: f32, item: &OverlayItem) {
  let scale = PxScale::from(text_size.max(1.0));
  let ascent = font.as_scaled(scale).ascent();
  let x = item.anchor.0.round() as i32;
  let y = (item.anchor.1 - ascent).round() as i32;
  draw_text_mut(image, item.color, x, y, scale, font, &item.label);
}
