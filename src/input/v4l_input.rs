// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/v4l_input.rs - V4L 相机拍照
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;
use v4l::{
  FourCC, buffer::Type, io::mmap::Stream, io::traits::CaptureStream, video::Capture,
};

use super::camera_device_path;
use crate::{FromUrl, FromUrlWithScheme};

// 丢弃前几帧，等待自动曝光稳定
const WARMUP_FRAMES: usize = 3;
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image decode error: {0}")]
  DecodeError(#[from] image::ImageError),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Captured buffer size mismatch: expected {expected}, got {actual}")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

pub struct V4lCamera {
  device_path: String,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    // v4l:///dev/video0
    let device_path = camera_device_path(url).to_string();

    Ok(V4lCamera { device_path })
  }
}

impl V4lCamera {
  pub fn device_path(&self) -> &str {
    &self.device_path
  }

  /// 拍摄一张照片
  pub fn capture(&self) -> Result<RgbImage, V4lInputError> {
    info!("打开相机: {}", self.device_path);
    let device = v4l::Device::with_path(&self.device_path)?;

    let mut format = device.format()?;
    format.fourcc = FourCC::new(b"MJPG");
    // 驱动可能拒绝请求的格式，以实际返回为准
    let format = device.set_format(&format)?;
    debug!(
      "相机格式: {}x{} {}",
      format.width, format.height, format.fourcc
    );

    let mut stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;
    for _ in 0..WARMUP_FRAMES {
      stream.next()?;
    }
    let (buf, meta) = stream.next()?;
    let used = (meta.bytesused as usize).min(buf.len());
    let data = if used > 0 { &buf[..used] } else { buf };

    decode_frame(format.fourcc, format.width, format.height, data)
  }
}

fn decode_frame(
  fourcc: FourCC,
  width: u32,
  height: u32,
  data: &[u8],
) -> Result<RgbImage, V4lInputError> {
  if fourcc == FourCC::new(b"MJPG") {
    return Ok(image::load_from_memory(data)?.into_rgb8());
  }

  let pixels = width as usize * height as usize;
  if fourcc == FourCC::new(b"RGB3") {
    let expected = pixels * 3;
    if data.len() < expected {
      return Err(V4lInputError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }
    return RgbImage::from_raw(width, height, data[..expected].to_vec()).ok_or(
      V4lInputError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      },
    );
  }

  if fourcc == FourCC::new(b"YUYV") {
    let expected = pixels * 2;
    if data.len() < expected {
      return Err(V4lInputError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }
    return Ok(yuyv_to_rgb(width, height, &data[..expected]));
  }

  Err(V4lInputError::UnsupportedPixelFormat(fourcc.to_string()))
}

// BT.601 有限范围
fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> RgbImage {
  let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
  for chunk in data.chunks_exact(4) {
    let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
    for y in [y0, y1] {
      let c = y as f32 - 16.0;
      let d = u as f32 - 128.0;
      let e = v as f32 - 128.0;
      let r = 1.164 * c + 1.596 * e;
      let g = 1.164 * c - 0.392 * d - 0.813 * e;
      let b = 1.164 * c + 2.017 * d;
      rgb.extend_from_slice(&[
        r.clamp(0.0, 255.0) as u8,
        g.clamp(0.0, 255.0) as u8,
        b.clamp(0.0, 255.0) as u8,
      ]);
    }
  }
  RgbImage::from_raw(width, height, rgb).unwrap_or_else(|| RgbImage::new(width, height))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::DEFAULT_CAMERA_DEVICE;

  #[test]
  fn default_device_path() {
    let camera = V4lCamera::from_url(&Url::parse("v4l:///").unwrap()).unwrap();
    assert_eq!(camera.device_path(), DEFAULT_CAMERA_DEVICE);
    let camera = V4lCamera::from_url(&Url::parse("v4l:///dev/video2").unwrap()).unwrap();
    assert_eq!(camera.device_path(), "/dev/video2");
  }

  #[test]
  fn yuyv_gray_converts_to_gray() {
    // Y=126, U=V=128 -> 约 128 灰
    let data = [126u8, 128, 126, 128];
    let image = decode_frame(FourCC::new(b"YUYV"), 2, 1, &data).unwrap();
    let p = image.get_pixel(1, 0).0;
    assert!(p.iter().all(|&c| (c as i32 - 128).abs() <= 1));
  }

  #[test]
  fn short_buffer_is_rejected() {
    let err = decode_frame(FourCC::new(b"RGB3"), 2, 2, &[0u8; 5]).unwrap_err();
    assert!(matches!(
      err,
      V4lInputError::BufferSizeMismatch {
        expected: 12,
        actual: 5
      }
    ));
  }
}
