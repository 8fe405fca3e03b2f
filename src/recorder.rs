// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 片段录制 (Clip Writer)
//!
//! 原始RGB帧通过管道写入 ffmpeg 子进程编码为 mp4,
//! 关闭 stdin 并等待进程退出即完成封装.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use tracing::{debug, info, warn};

use crate::frame::Frame;

/// 录制错误
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("启动编码器失败 (ffmpeg 是否已安装?): {0}")]
    Spawn(#[source] std::io::Error),

    #[error("写入帧失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("帧尺寸 {actual:?} 与片段尺寸 {expected:?} 不一致")]
    FrameSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("编码器异常退出: {0}")]
    Encoder(ExitStatus),
}

/// 已打开的输出端, 按顺序接收帧
pub trait ClipSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ClipError>;

    /// 完成封装并关闭
    fn finish(self: Box<Self>) -> Result<(), ClipError>;
}

/// 按路径/帧率/尺寸创建输出端
pub trait SinkFactory: Send {
    fn create(&self, path: &Path, fps: f64, size: (u32, u32))
        -> Result<Box<dyn ClipSink>, ClipError>;
}

impl<F: SinkFactory + Sync> SinkFactory for std::sync::Arc<F> {
    fn create(
        &self,
        path: &Path,
        fps: f64,
        size: (u32, u32),
    ) -> Result<Box<dyn ClipSink>, ClipError> {
        (**self).create(path, fps, size)
    }
}

/// 片段写入器
///
/// `write` 在关闭后是空操作, `stop` 可重复调用.
pub struct ClipWriter {
    path: PathBuf,
    size: (u32, u32),
    sink: Option<Box<dyn ClipSink>>,
    frames: u64,
}

impl ClipWriter {
    pub fn start(
        factory: &dyn SinkFactory,
        path: impl Into<PathBuf>,
        fps: f64,
        size: (u32, u32),
    ) -> Result<Self, ClipError> {
        let path = path.into();
        let sink = factory.create(&path, fps, size)?;
        debug!("🎞️ 片段写入器已打开: {} ({}x{} @ {:.1}fps)", path.display(), size.0, size.1, fps);
        Ok(Self {
            path,
            size,
            sink: Some(sink),
            frames: 0,
        })
    }

    pub fn write(&mut self, frame: &Frame) -> Result<(), ClipError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        if frame.size() != self.size {
            return Err(ClipError::FrameSize {
                expected: self.size,
                actual: frame.size(),
            });
        }
        sink.write_frame(frame)?;
        self.frames += 1;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ClipError> {
        match self.sink.take() {
            Some(sink) => sink.finish(),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl Drop for ClipWriter {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("⚠️ 片段关闭失败 {}: {}", self.path.display(), e);
        }
    }
}

/// ffmpeg 子进程输出端工厂
#[derive(Debug, Clone)]
pub struct FfmpegSinkFactory {
    program: String,
    codec: String,
}

impl FfmpegSinkFactory {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            codec: codec.into(),
        }
    }

    /// 指定 ffmpeg 可执行文件路径
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, path: &Path, fps: f64, size: (u32, u32)) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", size.0, size.1),
            "-r".into(),
            format!("{:.3}", fps),
            "-i".into(),
            "pipe:0".into(),
            "-c:v".into(),
            self.codec.clone(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
            path.to_string_lossy().into_owned(),
        ]
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn create(
        &self,
        path: &Path,
        fps: f64,
        size: (u32, u32),
    ) -> Result<Box<dyn ClipSink>, ClipError> {
        let mut child = Command::new(&self.program)
            .args(self.args(path, fps, size))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ClipError::Spawn)?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ClipError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "无法获取 ffmpeg stdin",
                )));
            }
        };

        Ok(Box::new(FfmpegSink {
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
        }))
    }
}

/// ffmpeg 子进程输出端
struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
}

impl ClipSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ClipError> {
        if let Some(stdin) = self.stdin.as_mut() {
            stdin.write_all(frame.data())?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), ClipError> {
        // 关闭stdin => ffmpeg 收到EOF后写入 moov 并退出
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if !status.success() {
            return Err(ClipError::Encoder(status));
        }
        info!("✅ 片段编码完成");
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
