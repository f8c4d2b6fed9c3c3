// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use kanjian::{
  FromUrl,
  input::{UrlPicker, camera_device_path},
  labels::LabelTable,
  model::ModelWrapper,
  output::{
    OutputWrapper,
    draw::{Draw, OverlaySettings, Palette},
  },
  permission::{ConsoleNotifier, DevicePermission},
  screen::{Outcome, Screen, ScreenConfig},
  selector::SourceChoice,
  task::CancelToken,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("标签文件: {}", args.labels.display());
  info!("显示输出: {}", args.output);
  info!("相机: {}", args.camera);
  info!("置信度阈值: {}", args.confidence);
  info!("检测上界: {:?}", args.bound);

  let cancel = CancelToken::new();
  // 等待终端输入时没有进行中的推理，中断可以立即退出
  let prompting = Arc::new(AtomicBool::new(false));
  {
    let cancel = cancel.clone();
    let prompting = prompting.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      cancel.cancel();
      if prompting.load(Ordering::SeqCst) {
        info!("退出");
        std::process::exit(0);
      }
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理函数")?;
  }

  let labels = LabelTable::load(&args.labels).context("无法加载标签文件")?;
  let model = ModelWrapper::from_url(&args.model).context("无法加载模型")?;
  let display = OutputWrapper::from_url(&args.output).context("无法创建显示输出")?;

  let config = ScreenConfig {
    labels,
    palette: Palette::default(),
    settings: OverlaySettings {
      threshold: args.confidence,
      bound: args.bound,
    },
    draw: Draw::load(args.font.as_deref()),
  };
  let mut screen = Screen::create(
    args.model.as_str(),
    model,
    config,
    display,
    ConsoleNotifier,
    cancel.clone(),
  )?;

  let device = camera_device_path(&args.camera);
  info!("相机设备节点: {}", device);
  let mut permission = DevicePermission::new(device);
  screen.check_permissions(&mut permission);

  let mut picker = UrlPicker::new(args.camera.clone(), args.input.clone());
  let interactive = args.source.is_none();

  while !cancel.is_cancelled() {
    let choice = match args.source {
      Some(choice) => choice,
      None => {
        let stdin = std::io::stdin();
        prompting.store(true, Ordering::SeqCst);
        let choice = SourceChoice::prompt(&mut stdin.lock(), &mut std::io::stdout());
        prompting.store(false, Ordering::SeqCst);
        choice?
      }
    };

    let outcome = screen.run_choice(choice, &mut picker);
    match &outcome {
      Outcome::Annotated { detections } => println!("检测到 {} 个对象", detections),
      Outcome::Dismissed | Outcome::Cancelled => break,
      _ => {}
    }
    info!("本次操作结果: {:?}", outcome);

    if !interactive {
      break;
    }
  }

  info!("退出");
  Ok(())
}
