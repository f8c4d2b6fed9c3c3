// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 图像来源（相机拍摄 / 图库选择）
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
use tracing::{debug, info};
use url::Url;

use crate::FromUrl;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l_camera")]
mod v4l_input;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_input::{V4lCamera, V4lInputError};

/// 相机 URL 未指明设备时使用的设备节点
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// 从相机 URL 解析设备节点，例如 v4l:///dev/video2
pub fn camera_device_path(url: &Url) -> &str {
  match url.path() {
    "" | "/" => DEFAULT_CAMERA_DEVICE,
    path => path,
  }
}

/// 请求码：区分回调来自哪个流程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCode {
  CameraPermission,
  CameraCapture,
  GalleryPick,
}

impl RequestCode {
  pub const fn code(self) -> u16 {
    match self {
      RequestCode::CameraPermission => 100,
      RequestCode::CameraCapture => 200,
      RequestCode::GalleryPick => 250,
    }
  }

  pub const fn from_code(code: u16) -> Option<Self> {
    match code {
      100 => Some(RequestCode::CameraPermission),
      200 => Some(RequestCode::CameraCapture),
      250 => Some(RequestCode::GalleryPick),
      _ => None,
    }
  }
}

/// 选择器回传的图像：相机直接给像素，图库给一个引用
#[derive(Debug, Clone)]
pub enum PickedImage {
  Captured(RgbImage),
  Reference(Url),
}

/// 一次拍摄/选择流程的回调
#[derive(Debug, Clone)]
pub struct PickerResult {
  pub request_code: u16,
  pub image: PickedImage,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "v4l_camera")]
  #[error("相机输入错误: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[error("未知的请求码: {0}")]
  UnknownRequestCode(u16),
  #[error("请求码 {code} 不接受此类回调")]
  UnexpectedPayload { code: u16 },
  #[error("没有指定图库图像")]
  NoGalleryImage,
  #[error("相机不可用: {0}")]
  CameraUnavailable(String),
}

impl PickerResult {
  /// 把回调解析为解码后的图像
  pub fn resolve(self) -> Result<(RequestCode, RgbImage), InputError> {
    let code = RequestCode::from_code(self.request_code)
      .ok_or(InputError::UnknownRequestCode(self.request_code))?;
    let image = match (code, self.image) {
      (RequestCode::CameraCapture, PickedImage::Captured(image)) => image,
      (RequestCode::GalleryPick, PickedImage::Reference(url)) => {
        debug!("解析图库引用: {}", url);
        ImageFileInput::from_url(&url)?.into_image()
      }
      _ => {
        return Err(InputError::UnexpectedPayload {
          code: self.request_code,
        });
      }
    };
    info!(
      "收到图像 ({}): {}x{}",
      self.request_code,
      image.width(),
      image.height()
    );
    Ok((code, image))
  }
}

/// 外部选择器：接收一个请求，回传一次结果
pub trait Picker {
  type Error;
  fn launch(&mut self, request: RequestCode) -> Result<PickerResult, Self::Error>;
}

/// 命令行下的选择器：图库是给定的图像 URL，相机是 V4L2 设备
pub struct UrlPicker {
  camera: Url,
  gallery: Option<Url>,
}

impl UrlPicker {
  pub fn new(camera: Url, gallery: Option<Url>) -> Self {
    Self { camera, gallery }
  }

  #[cfg(feature = "v4l_camera")]
  fn capture(&self) -> Result<RgbImage, InputError> {
    let camera = V4lCamera::from_url(&self.camera)?;
    Ok(camera.capture()?)
  }

  #[cfg(not(feature = "v4l_camera"))]
  fn capture(&self) -> Result<RgbImage, InputError> {
    Err(InputError::CameraUnavailable(format!(
      "{} (未启用 v4l_camera 特性)",
      self.camera
    )))
  }
}

impl Picker for UrlPicker {
  type Error = InputError;

  fn launch(&mut self, request: RequestCode) -> Result<PickerResult, Self::Error> {
    let image = match request {
      RequestCode::CameraCapture => PickedImage::Captured(self.capture()?),
      RequestCode::GalleryPick => {
        PickedImage::Reference(self.gallery.clone().ok_or(InputError::NoGalleryImage)?)
      }
      RequestCode::CameraPermission => {
        return Err(InputError::UnexpectedPayload {
          code: request.code(),
        });
      }
    };
    Ok(PickerResult {
      request_code: request.code(),
      image,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn camera_url_without_device_uses_default() {
    let url = Url::parse("v4l:///").unwrap();
    assert_eq!(camera_device_path(&url), DEFAULT_CAMERA_DEVICE);
    let url = Url::parse("v4l://").unwrap();
    assert_eq!(camera_device_path(&url), DEFAULT_CAMERA_DEVICE);
    let url = Url::parse("v4l:///dev/video2").unwrap();
    assert_eq!(camera_device_path(&url), "/dev/video2");
  }

  #[test]
  fn request_codes_round_trip() {
    for code in [
      RequestCode::CameraPermission,
      RequestCode::CameraCapture,
      RequestCode::GalleryPick,
    ] {
      assert_eq!(RequestCode::from_code(code.code()), Some(code));
    }
    assert_eq!(RequestCode::GalleryPick.code(), 250);
    assert_eq!(RequestCode::from_code(42), None);
  }

  #[test]
  fn captured_photo_resolves_directly() {
    let result = PickerResult {
      request_code: 200,
      image: PickedImage::Captured(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]))),
    };
    let (code, image) = result.resolve().unwrap();
    assert_eq!(code, RequestCode::CameraCapture);
    assert_eq!(image.dimensions(), (4, 3));
  }

  #[test]
  fn gallery_reference_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    RgbImage::from_pixel(8, 6, Rgb([9, 9, 9])).save(&path).unwrap();

    let mut picker = UrlPicker::new(
      Url::parse("v4l:///dev/video0").unwrap(),
      Some(Url::parse(&format!("image://{}", path.display())).unwrap()),
    );
    let result = picker.launch(RequestCode::GalleryPick).unwrap();
    assert_eq!(result.request_code, 250);
    let (_, image) = result.resolve().unwrap();
    assert_eq!(image.dimensions(), (8, 6));
  }

  #[test]
  fn mismatched_payload_is_rejected() {
    let result = PickerResult {
      request_code: 250,
      image: PickedImage::Captured(RgbImage::new(1, 1)),
    };
    assert!(matches!(
      result.resolve(),
      Err(InputError::UnexpectedPayload { code: 250 })
    ));

    let result = PickerResult {
      request_code: 7,
      image: PickedImage::Captured(RgbImage::new(1, 1)),
    };
    assert!(matches!(
      result.resolve(),
      Err(InputError::UnknownRequestCode(7))
    ));
  }

  #[test]
  fn gallery_without_image_is_an_error() {
    let mut picker = UrlPicker::new(Url::parse("v4l:///dev/video0").unwrap(), None);
    assert!(matches!(
      picker.launch(RequestCode::GalleryPick),
      Err(InputError::NoGalleryImage)
    ));
  }
}
