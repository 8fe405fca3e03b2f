// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 监控主循环 (Monitor Loop)
//!
//! 单线程顺序执行: 读帧 → 缩放 → 检测 → (录制中) 写帧 → 超时收尾并发邮件.
//!
//! ```text
//!   Idle ──检测到人──▶ Recording ──时长到──▶ 关闭片段 → 通知 → Idle
//!                        │
//!                        └──停止信号──▶ 关闭片段 (默认不通知)
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::capture::{Camera, CaptureError};
use crate::detector::PersonDetector;
use crate::frame::Frame;
use crate::notifier::Notifier;
use crate::recorder::{ClipWriter, SinkFactory};

/// 停止信号 (跨线程, 每轮循环检查一次)
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 时间源
pub trait Clock: Send {
    /// 单调时间 (自任意起点)
    fn now(&self) -> Duration;

    /// Unix 时间戳 (秒), 用于片段文件名
    fn unix_timestamp(&self) -> i64;

    fn sleep(&self, duration: Duration);
}

/// 系统时钟
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn unix_timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// 监控循环参数
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub frame_size: (u32, u32),
    pub snippet_duration: Duration,
    pub read_retry: Duration,
    pub fallback_fps: f64,
    pub recordings_dir: PathBuf,
    /// 手动停止时关闭的片段是否也发送
    pub notify_on_stop: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            frame_size: (640, 480),
            snippet_duration: Duration::from_secs(30),
            read_retry: Duration::from_millis(500),
            fallback_fps: 10.0,
            recordings_dir: PathBuf::from("recordings"),
            notify_on_stop: false,
        }
    }
}

/// 监控循环错误
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("摄像头打开失败: {0}")]
    CameraOpen(#[source] CaptureError),

    #[error("视频流不可恢复: {0}")]
    CameraLost(#[source] CaptureError),
}

/// 一次运行的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    pub fps: f64,
    pub frames: u64,
    pub read_failures: u64,
    pub clips: Vec<PathBuf>,
    pub notified: Vec<PathBuf>,
}

/// 录制会话: 只存在于 Recording 状态中
pub struct RecordingSession {
    started_at: Duration,
    writer: ClipWriter,
}

impl RecordingSession {
    pub fn path(&self) -> &Path {
        self.writer.path()
    }
}

/// 监控状态
pub enum MonitorState {
    Idle,
    Recording(RecordingSession),
}

impl MonitorState {
    pub fn is_recording(&self) -> bool {
        matches!(self, MonitorState::Recording(_))
    }
}

/// 片段结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinishReason {
    Elapsed,
    Stopped,
}

/// 监控循环
pub struct Monitor<C, D, S, N, K = SystemClock> {
    camera: C,
    detector: D,
    sinks: S,
    notifier: N,
    clock: K,
    settings: MonitorSettings,
    state: MonitorState,
    fps: f64,
    report: MonitorReport,
}

impl<C, D, S, N> Monitor<C, D, S, N, SystemClock>
where
    C: Camera,
    D: PersonDetector,
    S: SinkFactory,
    N: Notifier,
{
    pub fn new(camera: C, detector: D, sinks: S, notifier: N, settings: MonitorSettings) -> Self {
        Self::with_clock(
            camera,
            detector,
            sinks,
            notifier,
            SystemClock::default(),
            settings,
        )
    }
}

impl<C, D, S, N, K> Monitor<C, D, S, N, K>
where
    C: Camera,
    D: PersonDetector,
    S: SinkFactory,
    N: Notifier,
    K: Clock,
{
    pub fn with_clock(
        camera: C,
        detector: D,
        sinks: S,
        notifier: N,
        clock: K,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            camera,
            detector,
            sinks,
            notifier,
            clock,
            settings,
            state: MonitorState::Idle,
            fps: 0.0,
            report: MonitorReport::default(),
        }
    }

    /// 运行直到收到停止信号; 摄像头打开失败时立即返回错误,
    /// 读帧遇到不可恢复的错误时收尾当前片段后返回错误
    pub fn run(mut self, stop: &StopToken) -> Result<MonitorReport, MonitorError> {
        info!("🚀 监控循环启动");

        let reported = match self.camera.open() {
            Ok(fps) => fps,
            Err(e) => {
                error!("❌ 无法访问视频流: {}", e);
                return Err(MonitorError::CameraOpen(e));
            }
        };
        if reported <= 0.0 || !reported.is_finite() {
            warn!(
                "⚠️ 摄像头帧率无效 ({}), 使用默认帧率 {}",
                reported, self.settings.fallback_fps
            );
        }
        self.fps = effective_fps(reported, self.settings.fallback_fps);
        self.report.fps = self.fps;

        let mut outcome = Ok(());
        while !stop.is_stopped() {
            if let Err(e) = self.step() {
                error!("❌ {}", e);
                outcome = Err(e);
                break;
            }
        }

        // 停止: 收尾未完成的片段
        self.finish_session(FinishReason::Stopped);
        self.camera.close();
        outcome?;

        info!(
            "🛑 监控循环结束: {}帧, 读帧失败{}次, 片段{}个",
            self.report.frames,
            self.report.read_failures,
            self.report.clips.len()
        );
        Ok(self.report)
    }

    /// 处理一帧; 可重试的读帧失败等待后返回, 不可恢复的返回错误
    fn step(&mut self) -> Result<(), MonitorError> {
        let frame = match self.camera.read() {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                self.report.read_failures += 1;
                warn!("⚠️ 读取帧失败: {}", e);
                self.clock.sleep(self.settings.read_retry);
                return Ok(());
            }
            Err(e) => return Err(MonitorError::CameraLost(e)),
        };
        self.report.frames += 1;

        let (width, height) = self.settings.frame_size;
        let frame = match frame.resize(width, height) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("⚠️ 帧缩放失败: {}", e);
                return Ok(());
            }
        };

        let person = match self.detector.detect(&frame) {
            Ok(person) => person,
            Err(e) => {
                warn!("⚠️ 检测失败, 按无人处理: {}", e);
                false
            }
        };

        if person && !self.state.is_recording() {
            self.start_session();
        }

        if let MonitorState::Recording(session) = &mut self.state {
            write_frame(session, &frame);
            let elapsed = self.clock.now().saturating_sub(session.started_at);
            if elapsed >= self.settings.snippet_duration {
                self.finish_session(FinishReason::Elapsed);
            }
        }
        Ok(())
    }

    fn start_session(&mut self) {
        let dir = &self.settings.recordings_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("❌ 无法创建录像目录 {}: {}", dir.display(), e);
            return;
        }
        let path = dir.join(format!("snippet_{}.mp4", self.clock.unix_timestamp()));

        match ClipWriter::start(&self.sinks, &path, self.fps, self.settings.frame_size) {
            Ok(writer) => {
                info!("🔴 开始录制: {}", path.display());
                self.state = MonitorState::Recording(RecordingSession {
                    started_at: self.clock.now(),
                    writer,
                });
            }
            Err(e) => error!("❌ 无法开始录制 {}: {}", path.display(), e),
        }
    }

    fn finish_session(&mut self, reason: FinishReason) {
        let MonitorState::Recording(mut session) =
            std::mem::replace(&mut self.state, MonitorState::Idle)
        else {
            return;
        };

        let path = session.writer.path().to_path_buf();
        if let Err(e) = session.writer.stop() {
            error!("❌ 片段关闭失败 {}: {}", path.display(), e);
            return;
        }
        let frames = session.writer.frames_written();
        match reason {
            FinishReason::Elapsed => info!("💾 片段已保存: {} ({}帧)", path.display(), frames),
            FinishReason::Stopped => {
                info!("💾 片段已保存 (停止时): {} ({}帧)", path.display(), frames)
            }
        }
        self.report.clips.push(path.clone());

        if reason == FinishReason::Stopped && !self.settings.notify_on_stop {
            debug!("停止时关闭的片段不发送邮件");
            return;
        }
        match self.notifier.notify(&path) {
            Ok(()) => self.report.notified.push(path),
            Err(e) => error!("❌ 邮件发送失败: {}", e),
        }
    }
}

fn write_frame(session: &mut RecordingSession, frame: &Frame) {
    if let Err(e) = session.writer.write(frame) {
        warn!("⚠️ 写入片段失败 {}: {}", session.path().display(), e);
    }
}

/// 帧率 <= 0 (或非有限值) 时使用默认帧率
fn effective_fps(reported: f64, fallback: f64) -> f64 {
    if reported > 0.0 && reported.is_finite() {
        reported
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_fallback() {
        assert_eq!(effective_fps(25.0, 10.0), 25.0);
        assert_eq!(effective_fps(0.0, 10.0), 10.0);
        assert_eq!(effective_fps(-1.0, 10.0), 10.0);
        assert_eq!(effective_fps(f64::NAN, 10.0), 10.0);
    }

    #[test]
    fn test_stop_token_shared() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!clone.is_stopped());
        token.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::default();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(clock.unix_timestamp() > 1_600_000_000);
    }
}
