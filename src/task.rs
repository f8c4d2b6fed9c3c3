// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 后台推理任务
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::ModelFrame,
  model::{DetectionResult, Model},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 与界面生命周期绑定的取消标记
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
  #[error("推理失败: {0}")]
  Model(String),
  #[error("推理已取消")]
  Cancelled,
  #[error("推理线程已退出")]
  WorkerGone,
}

/// 一次推理的完成通知
#[derive(Debug, PartialEq)]
pub struct Completion {
  pub job: JobId,
  pub result: Result<DetectionResult, InferenceError>,
}

struct Job {
  id: JobId,
  frame: ModelFrame,
}

/// 独占模型的推理线程；析构时取消并等待线程退出
pub struct InferenceWorker {
  jobs: Option<Sender<Job>>,
  done: Receiver<Completion>,
  cancel: CancelToken,
  handle: Option<JoinHandle<()>>,
  next_job: u64,
}

impl InferenceWorker {
  pub fn spawn<M>(model: M, cancel: CancelToken) -> Result<Self, std::io::Error>
  where
    M: Model<Input = ModelFrame, Output = DetectionResult> + Send + 'static,
    M::Error: std::fmt::Display,
  {
    let (job_tx, job_rx) = mpsc::channel::<Job>();
    let (done_tx, done_rx) = mpsc::channel::<Completion>();
    let token = cancel.clone();

    let handle = thread::Builder::new()
      .name("inference".to_string())
      .spawn(move || run_worker(model, job_rx, done_tx, token))?;

    Ok(Self {
      jobs: Some(job_tx),
      done: done_rx,
      cancel,
      handle: Some(handle),
      next_job: 0,
    })
  }

  pub fn cancel_token(&self) -> &CancelToken {
    &self.cancel
  }

  pub fn submit(&mut self, frame: ModelFrame) -> Result<JobId, InferenceError> {
    if self.cancel.is_cancelled() {
      return Err(InferenceError::Cancelled);
    }
    self.next_job += 1;
    let id = JobId(self.next_job);
    let jobs = self.jobs.as_ref().ok_or(InferenceError::WorkerGone)?;
    jobs
      .send(Job { id, frame })
      .map_err(|_| InferenceError::WorkerGone)?;
    debug!("提交推理任务 {:?}", id);
    Ok(id)
  }

  /// 非阻塞地取一个完成通知；推理线程已退出时返回 `WorkerGone`
  pub fn try_completion(&self) -> Result<Option<Completion>, InferenceError> {
    match self.done.try_recv() {
      Ok(completion) => Ok(Some(completion)),
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Disconnected) => Err(InferenceError::WorkerGone),
    }
  }

  /// 等待指定任务完成，期间响应取消；其他任务的结果被丢弃
  pub fn wait(&self, job: JobId) -> Result<DetectionResult, InferenceError> {
    loop {
      if self.cancel.is_cancelled() {
        return Err(InferenceError::Cancelled);
      }
      match self.done.recv_timeout(POLL_INTERVAL) {
        Ok(completion) if completion.job == job => return completion.result,
        Ok(completion) => debug!("丢弃过期的推理结果 {:?}", completion.job),
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => return Err(InferenceError::WorkerGone),
      }
    }
  }
}

impl Drop for InferenceWorker {
  fn drop(&mut self) {
    self.cancel.cancel();
    self.jobs.take();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("推理线程异常退出");
    }
  }
}

fn run_worker<M>(
  mut model: M,
  jobs: Receiver<Job>,
  done: Sender<Completion>,
  cancel: CancelToken,
) where
  M: Model<Input = ModelFrame, Output = DetectionResult>,
  M::Error: std::fmt::Display,
{
  info!("推理线程已启动");
  for Job { id, frame } in jobs {
    if cancel.is_cancelled() {
      break;
    }
    let now = Instant::now();
    let result = model
      .infer(&frame)
      .map_err(|e| InferenceError::Model(e.to_string()));
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    if cancel.is_cancelled() {
      break;
    }
    if done.send(Completion { job: id, result }).is_err() {
      break;
    }
  }
  info!("推理线程退出");
}
