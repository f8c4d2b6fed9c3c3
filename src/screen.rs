// 该文件是 Kanjian （看见） 项目的一部分。
// src/screen.rs - 检测界面会话
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

//! 一个界面的全部状态：标签表、调色板、当前显示的图像和推理线程。
//!
//! 流程为 权限检查 -> 选择来源 -> 回调解析 -> 预处理 -> 后台推理 -> 叠加绘制。
//! 用户可见的失败都变成通知，界面回到空闲状态。

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::ModelFrame,
  input::{Picker, PickerResult, RequestCode},
  labels::LabelTable,
  model::{DetectionResult, Model, ModelHandle},
  output::{
    DisplaySurface,
    draw::{Draw, OverlaySettings, Palette, plan_overlay},
  },
  permission::{Notifier, PermissionProvider, PermissionStatus, check_and_grant},
  selector::SourceChoice,
  task::{CancelToken, InferenceError, InferenceWorker, JobId},
};

pub const CAMERA_DISABLED_MESSAGE: &str =
  "Camera is disabled because camera permission was denied. Choose from Library instead.";
pub const BUSY_MESSAGE: &str = "Detection is still running";

#[derive(Error, Debug)]
pub enum ScreenError {
  #[error("无法启动推理线程: {0}")]
  WorkerSpawn(#[from] std::io::Error),
}

/// 一次用户操作的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  /// 用户取消了选择
  Dismissed,
  /// 相机不可用，界面保留了说明
  CaptureDisabled,
  /// 已有推理在进行
  Busy,
  /// 已提交推理，等待完成
  Pending(JobId),
  /// 显示了带标注的图像
  Annotated { detections: usize },
  /// 失败并已通知用户
  Failed(String),
  Cancelled,
}

pub struct ScreenConfig {
  pub labels: LabelTable,
  pub palette: Palette,
  pub settings: OverlaySettings,
  pub draw: Draw,
}

struct PendingDetection {
  job: JobId,
  original: RgbImage,
}

pub struct Screen<D, N> {
  labels: LabelTable,
  palette: Palette,
  settings: OverlaySettings,
  draw: Draw,
  display: D,
  notifier: N,
  displayed: Option<RgbImage>,
  capture_disabled: Option<&'static str>,
  pending: Option<PendingDetection>,
  worker: InferenceWorker,
}

impl<D, N> Screen<D, N>
where
  D: DisplaySurface,
  D::Error: std::fmt::Display,
  N: Notifier,
{
  /// 创建界面时获取模型，界面析构时释放
  pub fn create<M>(
    model_name: &str,
    model: M,
    config: ScreenConfig,
    display: D,
    notifier: N,
    cancel: CancelToken,
  ) -> Result<Self, ScreenError>
  where
    M: Model<Input = ModelFrame, Output = DetectionResult> + Send + 'static,
    M::Error: std::fmt::Display,
  {
    let handle = ModelHandle::acquire(model_name, model);
    let worker = InferenceWorker::spawn(handle, cancel)?;

    Ok(Self {
      labels: config.labels,
      palette: config.palette,
      settings: config.settings,
      draw: config.draw,
      display,
      notifier,
      displayed: None,
      capture_disabled: None,
      pending: None,
      worker,
    })
  }

  pub fn check_permissions<P: PermissionProvider + ?Sized>(
    &mut self,
    provider: &mut P,
  ) -> PermissionStatus {
    let status = check_and_grant(provider, &self.notifier);
    self.capture_disabled = match status {
      PermissionStatus::Granted => None,
      PermissionStatus::Denied => Some(CAMERA_DISABLED_MESSAGE),
    };
    status
  }

  pub fn capture_enabled(&self) -> bool {
    self.capture_disabled.is_none()
  }

  /// 相机被禁用时的说明
  pub fn capture_explanation(&self) -> Option<&str> {
    self.capture_disabled
  }

  pub fn is_busy(&self) -> bool {
    self.pending.is_some()
  }

  pub fn displayed(&self) -> Option<&RgbImage> {
    self.displayed.as_ref()
  }

  pub fn display(&self) -> &D {
    &self.display
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  pub fn cancel_token(&self) -> &CancelToken {
    self.worker.cancel_token()
  }

  /// 处理来源选择，返回需要发起的请求
  pub fn select_source(&mut self, choice: SourceChoice) -> Result<RequestCode, Outcome> {
    info!("选择来源: {}", choice.item());
    let request = choice.request().ok_or(Outcome::Dismissed)?;
    if self.is_busy() {
      self.notifier.notify(BUSY_MESSAGE);
      return Err(Outcome::Busy);
    }
    if request == RequestCode::CameraCapture
      && let Some(explanation) = self.capture_disabled
    {
      self.notifier.notify(explanation);
      return Err(Outcome::CaptureDisabled);
    }
    Ok(request)
  }

  /// 处理拍照/选择回调：显示原图，预处理后提交推理
  pub fn on_picker_result(&mut self, result: PickerResult) -> Outcome {
    if self.is_busy() {
      self.notifier.notify(BUSY_MESSAGE);
      return Outcome::Busy;
    }

    let (code, image) = match result.resolve() {
      Ok(resolved) => resolved,
      Err(e) => return self.fail(format!("Could not load the image: {}", e)),
    };
    debug!("回调来源: {:?}", code);

    if let Err(e) = self.display.show(&image) {
      return self.fail(format!("Could not display the image: {}", e));
    }
    self.displayed = Some(image.clone());

    let now = Instant::now();
    let frame = match ModelFrame::resize_from(&image) {
      Ok(frame) => frame,
      Err(e) => return self.fail(format!("Could not prepare the image: {}", e)),
    };
    debug!("预处理完成，耗时: {:.2?}", now.elapsed());

    match self.worker.submit(frame) {
      Ok(job) => {
        self.pending = Some(PendingDetection {
          job,
          original: image,
        });
        Outcome::Pending(job)
      }
      Err(InferenceError::Cancelled) => Outcome::Cancelled,
      Err(e) => self.fail(format!("Detection failed: {}", e)),
    }
  }

  /// 阻塞等待当前推理完成
  pub fn await_detection(&mut self) -> Outcome {
    let Some(pending) = self.pending.take() else {
      return Outcome::Dismissed;
    };
    let result = self.worker.wait(pending.job);
    self.finish(pending, result)
  }

  /// 非阻塞地检查推理是否完成
  pub fn poll_detection(&mut self) -> Option<Outcome> {
    let job = self.pending.as_ref()?.job;
    loop {
      let result = match self.worker.try_completion() {
        Ok(None) => return None,
        Ok(Some(completion)) if completion.job != job => {
          debug!("丢弃过期的推理结果 {:?}", completion.job);
          continue;
        }
        Ok(Some(completion)) => completion.result,
        Err(e) => Err(e),
      };
      let pending = self.pending.take()?;
      return Some(self.finish(pending, result));
    }
  }

  /// 完整走一遍：选择来源、调用选择器、等待推理
  pub fn run_choice<P>(&mut self, choice: SourceChoice, picker: &mut P) -> Outcome
  where
    P: Picker + ?Sized,
    P::Error: std::fmt::Display,
  {
    let request = match self.select_source(choice) {
      Ok(request) => request,
      Err(outcome) => return outcome,
    };

    let result = match picker.launch(request) {
      Ok(result) => result,
      Err(e) => return self.fail(format!("Could not get an image: {}", e)),
    };

    match self.on_picker_result(result) {
      Outcome::Pending(_) => self.await_detection(),
      other => other,
    }
  }

  fn finish(
    &mut self,
    pending: PendingDetection,
    result: Result<DetectionResult, InferenceError>,
  ) -> Outcome {
    let output = match result {
      Ok(output) => output,
      Err(InferenceError::Cancelled) => {
        warn!("推理已取消");
        return Outcome::Cancelled;
      }
      Err(e) => return self.fail(format!("Detection failed: {}", e)),
    };

    let now = Instant::now();
    let mut annotated = pending.original;
    let plan = plan_overlay(
      &output,
      &self.labels,
      &self.palette,
      &self.settings,
      annotated.dimensions(),
    );
    for item in plan.items.iter() {
      info!(
        "  - {} at ({:.0}, {:.0})-({:.0}, {:.0})",
        item.label, item.rect.left, item.rect.top, item.rect.right, item.rect.bottom
      );
    }
    self.draw.draw_overlay(&mut annotated, &plan);
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    if let Err(e) = self.display.show(&annotated) {
      return self.fail(format!("Could not display the image: {}", e));
    }
    self.displayed = Some(annotated);
    Outcome::Annotated {
      detections: plan.items.len(),
    }
  }

  fn fail(&mut self, message: String) -> Outcome {
    error!("{}", message);
    self.notifier.notify(&message);
    Outcome::Failed(message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::PickedImage;
  use crate::model::{ModelError, ReplayModel};
  use image::Rgb;
  use std::cell::RefCell;
  use std::convert::Infallible;

  #[derive(Default)]
  struct Recorder(RefCell<Vec<String>>);

  impl Notifier for Recorder {
    fn notify(&self, message: &str) {
      self.0.borrow_mut().push(message.to_string());
    }
  }

  #[derive(Default)]
  struct Frames(Vec<RgbImage>);

  impl DisplaySurface for Frames {
    type Error = Infallible;
    fn show(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
      self.0.push(image.clone());
      Ok(())
    }
  }

  struct Denied;

  impl PermissionProvider for Denied {
    fn check(&self) -> PermissionStatus {
      PermissionStatus::Denied
    }
    fn request(&mut self, _code: RequestCode) -> PermissionStatus {
      PermissionStatus::Denied
    }
  }

  struct Broken;

  impl Model for Broken {
    type Input = ModelFrame;
    type Output = DetectionResult;
    type Error = ModelError;
    fn infer(&mut self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err(ModelError::ModelInvalid("no weights".to_string()))
    }
  }

  fn config() -> ScreenConfig {
    ScreenConfig {
      labels: ["person", "bicycle", "car", "dog"].into_iter().collect(),
      palette: Palette::default(),
      settings: OverlaySettings::default(),
      draw: Draw::without_font(),
    }
  }

  fn replay(scores: Vec<f32>) -> ReplayModel {
    let n = scores.len();
    ReplayModel::new(DetectionResult {
      locations: (0..n).flat_map(|_| [0.1, 0.2, 0.5, 0.8]).collect(),
      classes: vec![3.0; n],
      scores,
      count: n as f32,
    })
    .unwrap()
  }

  fn screen<M>(model: M) -> Screen<Frames, Recorder>
  where
    M: Model<Input = ModelFrame, Output = DetectionResult> + Send + 'static,
    M::Error: std::fmt::Display,
  {
    Screen::create(
      "test",
      model,
      config(),
      Frames::default(),
      Recorder::default(),
      CancelToken::new(),
    )
    .unwrap()
  }

  fn captured(image: RgbImage) -> PickerResult {
    PickerResult {
      request_code: RequestCode::CameraCapture.code(),
      image: PickedImage::Captured(image),
    }
  }

  #[test]
  fn raw_then_annotated_image_is_shown() {
    let mut screen = screen(replay(vec![0.95]));
    let original = RgbImage::from_pixel(300, 300, Rgb([200, 200, 200]));
    assert!(matches!(
      screen.on_picker_result(captured(original.clone())),
      Outcome::Pending(_)
    ));
    assert!(screen.is_busy());
    assert_eq!(screen.await_detection(), Outcome::Annotated { detections: 1 });
    assert!(!screen.is_busy());

    let shown = &screen.display().0;
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0], original);
    assert_ne!(shown[1], original);
    assert_eq!(screen.displayed(), Some(&shown[1]));
    // 第 0 个检测使用蓝色
    assert_eq!(shown[1].get_pixel(60, 90), &Rgb([0, 0, 255]));
  }

  #[test]
  fn nothing_above_threshold_leaves_image_untouched() {
    let mut screen = screen(replay(vec![0.5, 0.1]));
    let original = RgbImage::from_pixel(64, 48, Rgb([5, 6, 7]));
    screen.on_picker_result(captured(original.clone()));
    assert_eq!(screen.await_detection(), Outcome::Annotated { detections: 0 });
    assert_eq!(screen.displayed(), Some(&original));
  }

  #[test]
  fn decode_failure_notifies_and_returns_to_idle() {
    let mut screen = screen(replay(vec![0.9]));
    let result = PickerResult {
      request_code: RequestCode::GalleryPick.code(),
      image: PickedImage::Reference(url::Url::parse("image:///no/such/photo.jpg").unwrap()),
    };
    assert!(matches!(screen.on_picker_result(result), Outcome::Failed(_)));
    assert!(!screen.is_busy());
    assert!(screen.displayed().is_none());
    assert_eq!(screen.notifier().0.borrow().len(), 1);
  }

  #[test]
  fn inference_failure_notifies_and_keeps_raw_image() {
    let mut screen = screen(Broken);
    let original = RgbImage::new(10, 10);
    screen.on_picker_result(captured(original.clone()));
    let outcome = screen.await_detection();
    assert!(matches!(&outcome, Outcome::Failed(m) if m.contains("no weights")));
    assert!(!screen.is_busy());
    assert_eq!(screen.displayed(), Some(&original));
  }

  #[test]
  fn denied_permission_disables_camera_only() {
    let mut screen = screen(replay(vec![]));
    assert_eq!(screen.check_permissions(&mut Denied), PermissionStatus::Denied);
    assert!(!screen.capture_enabled());
    assert_eq!(screen.capture_explanation(), Some(CAMERA_DISABLED_MESSAGE));

    assert_eq!(
      screen.select_source(SourceChoice::Camera),
      Err(Outcome::CaptureDisabled)
    );
    // 说明在之后每次选择相机时都会再次出现
    assert_eq!(
      screen.select_source(SourceChoice::Camera),
      Err(Outcome::CaptureDisabled)
    );
    assert_eq!(
      screen.select_source(SourceChoice::Gallery),
      Ok(RequestCode::GalleryPick)
    );
    assert_eq!(
      screen.select_source(SourceChoice::Cancel),
      Err(Outcome::Dismissed)
    );

    let notes = screen.notifier().0.borrow();
    assert_eq!(notes[0], "Camera permission is denied");
    assert_eq!(notes[1], CAMERA_DISABLED_MESSAGE);
    assert_eq!(notes[2], CAMERA_DISABLED_MESSAGE);
  }

  #[test]
  fn second_callback_while_busy_is_refused() {
    let mut screen = screen(replay(vec![0.9]));
    screen.on_picker_result(captured(RgbImage::new(8, 8)));
    assert_eq!(
      screen.on_picker_result(captured(RgbImage::new(8, 8))),
      Outcome::Busy
    );
    assert_eq!(
      screen.select_source(SourceChoice::Gallery),
      Err(Outcome::Busy)
    );
    screen.await_detection();
  }

  #[test]
  fn poll_eventually_completes() {
    let mut screen = screen(replay(vec![0.9]));
    screen.on_picker_result(captured(RgbImage::new(30, 30)));
    let outcome = loop {
      if let Some(outcome) = screen.poll_detection() {
        break outcome;
      }
      std::thread::sleep(std::time::Duration::from_millis(5));
    };
    assert_eq!(outcome, Outcome::Annotated { detections: 1 });
    assert_eq!(screen.poll_detection(), None);
  }

  struct Crashing;

  impl Model for Crashing {
    type Input = ModelFrame;
    type Output = DetectionResult;
    type Error = ModelError;
    fn infer(&mut self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      panic!("model crashed");
    }
  }

  #[test]
  fn crashed_worker_fails_poll_and_returns_to_idle() {
    let mut screen = screen(Crashing);
    let original = RgbImage::new(16, 16);
    screen.on_picker_result(captured(original.clone()));
    let outcome = loop {
      if let Some(outcome) = screen.poll_detection() {
        break outcome;
      }
      std::thread::sleep(std::time::Duration::from_millis(5));
    };
    assert!(matches!(&outcome, Outcome::Failed(m) if m.contains("推理线程已退出")));
    assert!(!screen.is_busy());
    assert_eq!(screen.displayed(), Some(&original));
    assert_eq!(screen.notifier().0.borrow().len(), 1);
    // 会话回到空闲，不再提示忙碌
    assert_eq!(
      screen.select_source(SourceChoice::Gallery),
      Ok(RequestCode::GalleryPick)
    );
  }

  #[test]
  fn cancellation_stops_waiting() {
    let mut screen = screen(replay(vec![0.9]));
    screen.cancel_token().cancel();
    assert_eq!(
      screen.on_picker_result(captured(RgbImage::new(8, 8))),
      Outcome::Cancelled
    );
  }
}
