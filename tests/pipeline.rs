// 该文件是 Kanjian （看见） 项目的一部分。
// tests/pipeline.rs - 端到端流程测试
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

use std::convert::Infallible;
use std::path::Path;

use image::{Rgb, RgbImage};
use url::Url;

use kanjian::{
  FromUrl,
  input::UrlPicker,
  labels::LabelTable,
  model::{DetectionBound, DetectionResult, ModelWrapper},
  output::{
    DisplaySurface, OutputWrapper,
    draw::{Draw, OverlaySettings, Palette, PixelBox, plan_overlay},
  },
  permission::Notifier,
  screen::{Outcome, Screen, ScreenConfig},
  selector::SourceChoice,
  task::CancelToken,
};

fn image_url(path: &Path) -> Url {
  Url::parse(&format!("image://{}", path.display())).unwrap()
}

fn write_fixtures(dir: &Path) -> (Url, std::path::PathBuf) {
  let labels = dir.join("labels.txt");
  std::fs::write(&labels, "person\nbicycle\ncar\ndog\n").unwrap();

  let replay = dir.join("outputs.json");
  std::fs::write(
    &replay,
    r#"{
      "locations": [0.1, 0.2, 0.5, 0.8, 0.0, 0.0, 0.2, 0.2],
      "classes": [3.0, 0.0],
      "scores": [0.95, 0.3],
      "count": 2.0
    }"#,
  )
  .unwrap();

  (
    Url::parse(&format!("replay://{}", replay.display())).unwrap(),
    labels,
  )
}

struct Silent;

impl Notifier for Silent {
  fn notify(&self, _message: &str) {}
}

#[derive(Default)]
struct Latest(Option<RgbImage>);

impl DisplaySurface for Latest {
  type Error = Infallible;
  fn show(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    self.0 = Some(image.clone());
    Ok(())
  }
}

fn single_detection() -> DetectionResult {
  DetectionResult {
    locations: vec![0.1, 0.2, 0.5, 0.8],
    classes: vec![3.0],
    scores: vec![0.95],
    count: 1.0,
  }
}

#[test]
fn one_detection_on_square_target() {
  let labels: LabelTable = ["person", "bicycle", "car", "dog"].into_iter().collect();
  let plan = plan_overlay(
    &single_detection(),
    &labels,
    &Palette::default(),
    &OverlaySettings::default(),
    (300, 300),
  );
  assert_eq!(plan.items.len(), 1);
  let item = &plan.items[0];
  assert_eq!(
    item.rect,
    PixelBox {
      left: 60.0,
      top: 30.0,
      right: 240.0,
      bottom: 150.0
    }
  );
  assert_eq!(item.anchor, (60.0, 30.0));
  assert_eq!(item.label, "dog 0.95");
  assert_eq!(item.color, Rgb([0, 0, 255]));
}

#[test]
fn boxes_scale_to_render_target_not_model_frame() {
  let labels: LabelTable = ["person", "bicycle", "car", "dog"].into_iter().collect();
  let plan = plan_overlay(
    &single_detection(),
    &labels,
    &Palette::default(),
    &OverlaySettings::default(),
    (300, 400),
  );
  let rect = plan.items[0].rect;
  assert_eq!((rect.left, rect.right), (60.0, 240.0));
  assert_eq!((rect.top, rect.bottom), (40.0, 200.0));
}

#[test]
fn gallery_pick_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  let (model_url, labels_path) = write_fixtures(dir.path());

  let photo = dir.path().join("photo.png");
  RgbImage::from_pixel(300, 300, Rgb([255, 255, 255]))
    .save(&photo)
    .unwrap();
  let display_path = dir.path().join("display.png");

  let model = ModelWrapper::from_url(&model_url).unwrap();
  let display = OutputWrapper::from_url(&image_url(&display_path)).unwrap();
  let config = ScreenConfig {
    labels: LabelTable::load(&labels_path).unwrap(),
    palette: Palette::default(),
    settings: OverlaySettings::default(),
    draw: Draw::without_font(),
  };
  let mut screen = Screen::create(
    "replay",
    model,
    config,
    display,
    Silent,
    CancelToken::new(),
  )
  .unwrap();

  let mut picker = UrlPicker::new(
    Url::parse("v4l:///dev/video0").unwrap(),
    Some(image_url(&photo)),
  );
  let outcome = screen.run_choice(SourceChoice::Gallery, &mut picker);
  assert_eq!(outcome, Outcome::Annotated { detections: 1 });

  let shown = image::open(&display_path).unwrap().into_rgb8();
  assert_eq!(shown.dimensions(), (300, 300));
  assert_eq!(shown.get_pixel(60, 90), &Rgb([0, 0, 255]));
  assert_eq!(shown.get_pixel(150, 90), &Rgb([255, 255, 255]));
  // 第二个检测低于阈值，不绘制
  assert_eq!(shown.get_pixel(30, 0), &Rgb([255, 255, 255]));

  assert_eq!(
    screen.run_choice(SourceChoice::Cancel, &mut picker),
    Outcome::Dismissed
  );
}

#[test]
fn reported_count_bound_in_session() {
  let mut output = single_detection();
  output.count = 0.0;
  let model = kanjian::model::ReplayModel::new(output).unwrap();
  let config = ScreenConfig {
    labels: ["dog"].into_iter().collect(),
    palette: Palette::default(),
    settings: OverlaySettings {
      bound: DetectionBound::ReportedCount,
      ..OverlaySettings::default()
    },
    draw: Draw::without_font(),
  };
  let mut screen = Screen::create(
    "replay",
    model,
    config,
    Latest::default(),
    Silent,
    CancelToken::new(),
  )
  .unwrap();

  let original = RgbImage::from_pixel(40, 40, Rgb([1, 2, 3]));
  screen.on_picker_result(kanjian::input::PickerResult {
    request_code: 200,
    image: kanjian::input::PickedImage::Captured(original.clone()),
  });
  assert_eq!(screen.await_detection(), Outcome::Annotated { detections: 0 });
  assert_eq!(screen.display().0.as_ref(), Some(&original));
}
