// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// RTSP主动拉流解码器
/// RTSP pulling decoder (CPU software decoding) feeding a bounded frame queue
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::core::scheduler::ffmpeg_scheduler::Running;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, FfmpegScheduler, Input};
use tracing::{info, warn};

use super::filter::RgbFilter;
use super::{Camera, CaptureError};
use crate::frame::Frame;

/// 解码帧队列长度 (满了就丢帧, 不积压)
const FRAME_QUEUE: usize = 2;
/// RTSP 套接字读写超时 (断流时解复用线程据此退出)
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
/// 单次读帧的等待时间
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// 正在运行的解码管线
struct Pipeline {
    scheduler: FfmpegScheduler<Running>,
    rx: Receiver<Frame>,
    closed: Arc<AtomicBool>,
}

impl Pipeline {
    /// 通知过滤器与调度器结束, 释放 RTSP 会话
    fn shutdown(self) {
        self.closed.store(true, Ordering::Relaxed);
        if !self.scheduler.is_ended() {
            self.scheduler.abort();
        }
    }
}

/// RTSP摄像头
pub struct RtspCamera {
    url: String,
    display_url: String,
    frame_size: (u32, u32),
    read_timeout: Duration,
    pipeline: Option<Pipeline>,
    opened: bool,
}

impl RtspCamera {
    /// 创建RTSP摄像头
    ///
    /// `display_url` 用于日志 (不含密码)
    pub fn new(url: String, display_url: String, frame_size: (u32, u32)) -> Self {
        Self {
            url,
            display_url,
            frame_size,
            read_timeout: READ_TIMEOUT,
            pipeline: None,
            opened: false,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// 探测流帧率, 失败返回0 (由监控循环使用默认帧率)
    fn probe_fps(&self) -> f64 {
        match find_video_stream_info(self.url.as_str()) {
            Ok(Some(StreamInfo::Video { fps, .. })) => fps,
            Ok(_) => {
                warn!("⚠️ 未找到视频流信息: {}", self.display_url);
                0.0
            }
            Err(e) => {
                warn!("⚠️ 帧率探测失败: {}", e);
                0.0
            }
        }
    }

    /// 构建并启动解码管线 (连接失败或超时时返回错误)
    fn start_pipeline(&mut self) -> Result<(), CaptureError> {
        let (tx, rx) = crossbeam_channel::bounded(FRAME_QUEUE);
        let closed = Arc::new(AtomicBool::new(false));
        let filter = RgbFilter::new(tx, closed.clone());

        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("rgb", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let input = Input::new(self.url.as_str()).set_input_opts(input_options(SOCKET_TIMEOUT));

        // 缩放到配置尺寸并输出 rgb24
        let (width, height) = self.frame_size;
        let scheduler = FfmpegContext::builder()
            .input(input)
            .filter_desc(format!("scale={}:{},format=rgb24", width, height))
            .output(out)
            .build()
            .map_err(|e| CaptureError::Open(format!("构建失败: {}", e)))?
            .start()
            .map_err(|e| CaptureError::Open(format!("启动失败: {}", e)))?;

        self.pipeline = Some(Pipeline {
            scheduler,
            rx,
            closed,
        });
        Ok(())
    }

    fn stop_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown();
        }
    }
}

/// RTSP 输入参数: TCP 传输, 大缓冲, 套接字超时 (微秒)
fn input_options(socket_timeout: Duration) -> Vec<(&'static str, String)> {
    vec![
        ("rtsp_transport", "tcp".to_string()),
        ("rtsp_flags", "prefer_tcp".to_string()),
        ("buffer_size", "67108864".to_string()),
        ("timeout", socket_timeout.as_micros().to_string()),
    ]
}

impl Camera for RtspCamera {
    fn open(&mut self) -> Result<f64, CaptureError> {
        info!("🎬 RTSP解码器启动");
        info!("📹 流地址: {}", self.display_url);

        let fps = self.probe_fps();
        self.start_pipeline()?;
        self.opened = true;

        info!("✅ RTSP连接成功 (报告帧率 {:.1})", fps);
        Ok(fps)
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        if !self.opened {
            return Err(CaptureError::Read("视频流未打开".to_string()));
        }
        if self.pipeline.is_none() {
            // 管线已结束 (断流), 尝试重新拉流
            warn!("🔄 解码管线已结束, 重新连接...");
            self.start_pipeline()
                .map_err(|e| CaptureError::Read(format!("重连失败: {}", e)))?;
        }

        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(CaptureError::Read("视频流未打开".to_string()));
        };
        match pipeline.rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) if pipeline.scheduler.is_ended() => {
                self.stop_pipeline();
                Err(CaptureError::Read("解码管线已结束".to_string()))
            }
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Read("等待帧超时".to_string())),
            Err(RecvTimeoutError::Disconnected) => {
                self.stop_pipeline();
                Err(CaptureError::Read("解码管线已结束".to_string()))
            }
        }
    }

    fn close(&mut self) {
        if self.opened {
            info!("📴 关闭RTSP视频流");
        }
        self.stop_pipeline();
        self.opened = false;
    }
}

impl Drop for RtspCamera {
    fn drop(&mut self) {
        self.close();
    }
}
