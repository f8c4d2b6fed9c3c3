// 该文件是 Kanjian （看见） 项目的一部分。
// src/permission.rs - 相机权限检查与通知
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

use tracing::{debug, info, warn};

use crate::input::RequestCode;

pub const PERMISSION_GRANTED_MESSAGE: &str = "Camera permission is granted";
pub const PERMISSION_DENIED_MESSAGE: &str = "Camera permission is denied";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
  Granted,
  Denied,
}

/// 短暂提示，相当于移动端的 toast
pub trait Notifier {
  fn notify(&self, message: &str);
}

/// 输出到终端，同时写日志
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, message: &str) {
    info!("提示: {}", message);
    println!("{}", message);
  }
}

pub trait PermissionProvider {
  fn check(&self) -> PermissionStatus;
  /// 发起一次请求，返回用户的答复
  fn request(&mut self, code: RequestCode) -> PermissionStatus;
}

/// 以能否打开相机设备节点作为权限判断
pub struct DevicePermission {
  device_path: PathBuf,
}

impl DevicePermission {
  pub fn new(device_path: impl Into<PathBuf>) -> Self {
    Self {
      device_path: device_path.into(),
    }
  }
}

impl PermissionProvider for DevicePermission {
  fn check(&self) -> PermissionStatus {
    match std::fs::File::open(&self.device_path) {
      Ok(_) => PermissionStatus::Granted,
      Err(e) => {
        debug!("无法打开 {}: {}", self.device_path.display(), e);
        PermissionStatus::Denied
      }
    }
  }

  // 桌面系统没有权限对话框，重新检查一次
  fn request(&mut self, code: RequestCode) -> PermissionStatus {
    info!(
      "请求相机权限 ({}): {}",
      code.code(),
      self.device_path.display()
    );
    self.check()
  }
}

/// 检查一次相机权限，拒绝时发起一次请求；结果都会通知用户
pub fn check_and_grant<P, N>(provider: &mut P, notifier: &N) -> PermissionStatus
where
  P: PermissionProvider + ?Sized,
  N: Notifier + ?Sized,
{
  if provider.check() == PermissionStatus::Granted {
    notifier.notify(PERMISSION_GRANTED_MESSAGE);
    return PermissionStatus::Granted;
  }

  let status = provider.request(RequestCode::CameraPermission);
  match status {
    PermissionStatus::Granted => notifier.notify(PERMISSION_GRANTED_MESSAGE),
    PermissionStatus::Denied => {
      warn!("相机权限被拒绝");
      notifier.notify(PERMISSION_DENIED_MESSAGE)
    }
  }
  status
}
