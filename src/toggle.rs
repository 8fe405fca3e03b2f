// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 启停开关 (Toggle Shell)
//!
//! 第一次切换: 在后台线程启动监控循环; 第二次切换: 发送停止信号并等待线程退出.
//! 任何时刻最多只有一个存活的监控循环.

use std::io;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::monitor::StopToken;

pub const START_LABEL: &str = "🟢 START";
pub const STOP_LABEL: &str = "🔴 STOP";

/// 开关状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    /// 未运行, 显示 START
    Stopped,
    /// 运行中, 显示 STOP
    Running,
}

impl ToggleState {
    pub fn label(&self) -> &'static str {
        match self {
            ToggleState::Stopped => START_LABEL,
            ToggleState::Running => STOP_LABEL,
        }
    }
}

struct Worker {
    stop: StopToken,
    handle: JoinHandle<()>,
}

/// 启停开关
///
/// `spawn` 接收新的停止信号, 启动监控线程并返回其句柄.
pub struct ToggleShell<F>
where
    F: FnMut(StopToken) -> io::Result<JoinHandle<()>>,
{
    spawn: F,
    worker: Option<Worker>,
}

impl<F> ToggleShell<F>
where
    F: FnMut(StopToken) -> io::Result<JoinHandle<()>>,
{
    pub fn new(spawn: F) -> Self {
        Self {
            spawn,
            worker: None,
        }
    }

    /// 当前状态 (线程已意外退出时仍显示 STOP, 下一次切换会重新启动)
    pub fn state(&self) -> ToggleState {
        if self.worker.is_some() {
            ToggleState::Running
        } else {
            ToggleState::Stopped
        }
    }

    pub fn label(&self) -> &'static str {
        self.state().label()
    }

    /// 监控线程是否存活
    pub fn is_alive(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// 切换: 未运行(或线程已退出)则启动, 运行中则停止并等待退出
    pub fn toggle(&mut self) -> io::Result<ToggleState> {
        if self.is_alive() {
            self.stop();
            return Ok(self.state());
        }

        // 回收已退出的线程
        if let Some(dead) = self.worker.take() {
            warn!("⚠️ 监控线程已退出, 重新启动");
            let _ = dead.handle.join();
        }

        let stop = StopToken::new();
        let handle = (self.spawn)(stop.clone())?;
        self.worker = Some(Worker { stop, handle });
        info!("▶️ 监控已启动");
        Ok(self.state())
    }

    /// 停止监控线程 (阻塞直到线程退出)
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            info!("⏹️ 正在停止监控...");
            worker.stop.stop();
            if worker.handle.join().is_err() {
                warn!("⚠️ 监控线程异常退出 (panic)");
            }
            info!("✅ 监控已停止");
        }
    }

    /// 进程退出前调用
    pub fn shutdown(&mut self) {
        self.stop();
    }
}

impl<F> Drop for ToggleShell<F>
where
    F: FnMut(StopToken) -> io::Result<JoinHandle<()>>,
{
    fn drop(&mut self) {
        self.stop();
    }
}
