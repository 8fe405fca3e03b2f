// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod capture; // 视频采集 (RTSP拉流)
pub mod config; // 运行配置 (环境变量 + 命令行)
pub mod detector; // 人体检测
pub mod frame; // 帧数据与缩放
pub mod keep_awake; // 防休眠辅助进程
pub mod monitor; // 监控主循环
pub mod notifier; // 邮件通知
pub mod recorder; // 片段录制
pub mod toggle; // 启停开关

pub use crate::capture::{Camera, CaptureError, RtspCamera};
pub use crate::config::Config;
pub use crate::detector::{Detection, DetectError, PersonDetector, YoloDetector};
pub use crate::frame::{Frame, FrameError};
pub use crate::monitor::{
    Clock, Monitor, MonitorError, MonitorReport, MonitorSettings, StopToken, SystemClock,
};
pub use crate::notifier::{MailNotifier, NotifyError, Notifier};
pub use crate::recorder::{ClipError, ClipSink, ClipWriter, FfmpegSinkFactory, SinkFactory};
pub use crate::toggle::{ToggleShell, ToggleState};
