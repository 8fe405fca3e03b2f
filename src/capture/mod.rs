// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频采集系统 (Video Capture)
///
/// 监控循环按需拉取帧:
/// - Camera:     采集源统一接口 (open / read / close)
/// - RtspCamera: FFmpeg RTSP 拉流解码, 帧经有界队列交给监控循环
/// - RgbFilter:  解码帧 → RGB24 Frame
pub mod filter;
pub mod rtsp;

pub use filter::RgbFilter;
pub use rtsp::RtspCamera;

use crate::frame::Frame;

/// 采集错误
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// 无法打开视频流 (致命, 监控循环退出)
    #[error("无法打开视频流: {0}")]
    Open(String),

    /// 单帧读取失败 (可重试)
    #[error("读取帧失败: {0}")]
    Read(String),
}

impl CaptureError {
    /// 是否可以重试
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Read(_))
    }
}

/// 采集源统一接口
pub trait Camera: Send {
    /// 打开视频流, 返回流报告的帧率 (可能 <= 0)
    fn open(&mut self) -> Result<f64, CaptureError>;

    /// 读取一帧
    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// 释放视频流
    fn close(&mut self);
}
