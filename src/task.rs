// 该文件是 Huiyan （慧眼） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver},
  },
  thread,
  time::{Duration, Instant},
};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::{model::Model, output::Render};

/// 收到中断信号后等待任务退出的最长时间
const FORCE_EXIT_TIMEOUT: Duration = Duration::from_secs(30);

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 安装 Ctrl-C 处理函数，返回停止标志
///
/// 任务在帧之间检查该标志；超时仍未退出时强制结束进程。
pub fn install_interrupt_handler() -> anyhow::Result<Arc<AtomicBool>> {
  let stop = Arc::new(AtomicBool::new(false));
  let flag = stop.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    flag.store(true, Ordering::SeqCst);
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_TIMEOUT);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(stop)
}

/// 只处理第一帧
pub struct OneShotTask;

impl<F, I, M, O, ME, RE> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = F>,
  F: AsRef<M::Input>,
  M: Model<Error = ME>,
  O: Render<F, M::Output, Error = RE>,
  ME: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(frame.as_ref())?;
    let elapsed_a = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed_a);
    output.render_result(&frame, &result)?;
    let elapsed_b = now.elapsed();
    info!("渲染完成，耗时: {:.2?}", elapsed_b - elapsed_a);

    Ok(())
  }
}

/// 连续处理输入帧
///
/// 推理在独立的检测线程中进行，每帧的结果连同帧本身作为一个不可变快照
/// 经容量为 1 的通道交给调用线程渲染。帧严格按顺序处理，不丢帧。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn stopped(&self) -> bool {
    self
      .stop
      .as_ref()
      .is_some_and(|stop| stop.load(Ordering::SeqCst))
  }

  fn reached_limit(&self, processed: usize) -> bool {
    self.frame_number.is_some_and(|n| processed >= n)
  }
}

fn render_loop<F, D, O>(output: &O, rx: Receiver<(F, D)>) -> Result<usize, O::Error>
where
  O: Render<F, D>,
{
  let mut rendered = 0;
  for (frame, result) in rx {
    let now = Instant::now();
    output.render_result(&frame, &result)?;
    rendered += 1;
    debug!("第 {} 帧渲染完成，耗时: {:.2?}", rendered, now.elapsed());
  }
  Ok(rendered)
}

impl<F, I, M, O, ME, RE> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = F> + Send,
  F: AsRef<M::Input> + Send,
  M: Model<Error = ME> + Send,
  M::Output: Send,
  O: Render<F, M::Output, Error = RE>,
  ME: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let task = &self;

    thread::scope(|scope| -> anyhow::Result<()> {
      let (tx, rx) = mpsc::sync_channel::<(F, M::Output)>(1);

      let worker = thread::Builder::new()
        .name("detector".into())
        .spawn_scoped(scope, move || -> anyhow::Result<usize> {
          let mut processed = 0;
          for frame in input {
            if task.stopped() {
              warn!("中断信号接收，退出任务循环");
              break;
            }

            info!("处理第 {} 帧图像", processed + 1);
            let now = Instant::now();
            let result = model.infer(frame.as_ref())?;
            info!("推理完成，耗时: {:.2?}", now.elapsed());
            processed += 1;

            if tx.send((frame, result)).is_err() {
              debug!("渲染端已关闭，退出任务循环");
              break;
            }
            if task.reached_limit(processed) {
              info!("达到指定帧数 {}, 退出任务循环", processed);
              break;
            }
          }
          Ok(processed)
        })?;

      let rendered = render_loop(&output, rx);
      let processed = worker
        .join()
        .map_err(|_| anyhow!("检测线程异常退出"))??;
      let rendered = rendered?;

      info!("任务完成，推理 {} 帧，渲染 {} 帧", processed, rendered);
      Ok(())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("模拟错误")]
  struct MockError;

  struct Frame(u32);

  impl AsRef<u32> for Frame {
    fn as_ref(&self) -> &u32 {
      &self.0
    }
  }

  /// 输入值乘 10，遇到 `fail_on` 时失败
  struct Times10 {
    fail_on: Option<u32>,
  }

  impl Model for Times10 {
    type Input = u32;
    type Output = u32;
    type Error = MockError;

    fn infer(&self, input: &u32) -> Result<u32, MockError> {
      match self.fail_on {
        Some(n) if n == *input => Err(MockError),
        _ => Ok(input * 10),
      }
    }
  }

  #[derive(Default)]
  struct Recorder {
    seen: RefCell<Vec<(u32, u32)>>,
    fail_after: Option<usize>,
  }

  impl Render<Frame, u32> for Recorder {
    type Error = MockError;

    fn render_result(&self, frame: &Frame, result: &u32) -> Result<(), MockError> {
      let mut seen = self.seen.borrow_mut();
      if self.fail_after.is_some_and(|n| seen.len() >= n) {
        return Err(MockError);
      }
      seen.push((frame.0, *result));
      Ok(())
    }
  }

  fn frames(n: u32) -> impl Iterator<Item = Frame> + Send {
    (1..=n).map(Frame)
  }

  fn run(task: ContinuousTask, n: u32, model: Times10, output: &Recorder) -> anyhow::Result<()> {
    task.run_task(frames(n), model, output)
  }

  impl Render<Frame, u32> for &Recorder {
    type Error = MockError;

    fn render_result(&self, frame: &Frame, result: &u32) -> Result<(), MockError> {
      (**self).render_result(frame, result)
    }
  }

  #[test]
  fn one_shot_uses_first_frame() {
    let output = Recorder::default();
    OneShotTask
      .run_task(frames(3), Times10 { fail_on: None }, &output)
      .unwrap();
    assert_eq!(*output.seen.borrow(), vec![(1, 10)]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let output = Recorder::default();
    assert!(
      OneShotTask
        .run_task(frames(0), Times10 { fail_on: None }, &output)
        .is_err()
    );
  }

  #[test]
  fn continuous_renders_every_frame_in_order() {
    let output = Recorder::default();
    run(ContinuousTask::default(), 5, Times10 { fail_on: None }, &output).unwrap();
    assert_eq!(
      *output.seen.borrow(),
      vec![(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)]
    );
  }

  #[test]
  fn continuous_stops_at_frame_number() {
    let output = Recorder::default();
    let task = ContinuousTask::default().with_frame_number(Some(2));
    run(task, 5, Times10 { fail_on: None }, &output).unwrap();
    assert_eq!(*output.seen.borrow(), vec![(1, 10), (2, 20)]);
  }

  #[test]
  fn continuous_observes_stop_flag() {
    let output = Recorder::default();
    let task = ContinuousTask::default().with_stop_flag(Arc::new(AtomicBool::new(true)));
    run(task, 5, Times10 { fail_on: None }, &output).unwrap();
    assert!(output.seen.borrow().is_empty());
  }

  #[test]
  fn inference_error_is_fatal() {
    let output = Recorder::default();
    let result = run(ContinuousTask::default(), 5, Times10 { fail_on: Some(3) }, &output);
    assert!(result.is_err());
    assert_eq!(*output.seen.borrow(), vec![(1, 10), (2, 20)]);
  }

  #[test]
  fn render_error_stops_the_worker() {
    let output = Recorder {
      fail_after: Some(1),
      ..Default::default()
    };
    let result = run(ContinuousTask::default(), 100, Times10 { fail_on: None }, &output);
    assert!(result.is_err());
    assert_eq!(*output.seen.borrow(), vec![(1, 10)]);
  }
}
