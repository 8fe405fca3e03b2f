// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg解码过滤器: RTSP流 → RGB24 Frame
/// FFmpeg frame filter that hands decoded RGB frames to the monitor loop
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame as AvFrame};
use tracing::{debug, info, warn};

use crate::frame::Frame;

#[derive(Clone)]
pub struct RgbFilter {
    tx: Sender<Frame>,
    closed: Arc<AtomicBool>,
    count: usize,
    last: Instant,
    pub dropped_frames: usize, // 队列满或损坏而丢弃的帧
    pub total_frames: usize,
}

impl RgbFilter {
    pub fn new(tx: Sender<Frame>, closed: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            closed,
            count: 0,
            last: Instant::now(),
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }
}

/// 按行拷贝 RGB24 数据 (去掉每行末尾的对齐填充)
pub fn copy_rgb_rows(src: &[u8], stride: usize, width: usize, height: usize) -> Option<Vec<u8>> {
    let row = width * 3;
    if stride < row || src.len() < stride * (height.saturating_sub(1)) + row {
        return None;
    }
    let mut out = Vec::with_capacity(row * height);
    for y in 0..height {
        out.extend_from_slice(&src[y * stride..y * stride + row]);
    }
    Some(out)
}

/// 读取第0平面的宽、高、步长与数据指针; 空帧或损坏帧返回 None
fn raw_layout(frame: &AvFrame) -> Option<(usize, usize, usize, *const u8)> {
    unsafe {
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            return None;
        }
        let raw = &*frame.as_ptr();
        if raw.linesize[0] <= 0 {
            return None;
        }
        Some((
            raw.width as usize,
            raw.height as usize,
            raw.linesize[0] as usize,
            raw.data[0] as *const u8,
        ))
    }
}

impl FrameFilter for RgbFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<AvFrame>, String> {
        // 摄像头已关闭 → 结束解码
        if self.closed.load(Ordering::Relaxed) {
            return Err("camera closed".to_string());
        }

        self.total_frames += 1;

        let Some((w, h, stride, plane)) = raw_layout(&frame) else {
            self.drop_frame("空帧/损坏帧");
            return Ok(None);
        };

        if w == 0 || h == 0 || w > 4096 || h > 4096 || plane.is_null() {
            self.drop_frame("非法分辨率或数据指针为空");
            return Ok(None);
        }
        if stride < w * 3 {
            self.drop_frame("步长异常 (非rgb24帧)");
            return Ok(None);
        }

        // 滤镜链已输出 rgb24, 第0平面即完整图像
        let src = unsafe { std::slice::from_raw_parts(plane, stride * (h - 1) + w * 3) };
        let Some(data) = copy_rgb_rows(src, stride, w, h) else {
            self.drop_frame("步长异常");
            return Ok(None);
        };
        let decoded = match Frame::new(w as u32, h as u32, data) {
            Ok(f) => f,
            Err(e) => {
                self.drop_frame(&e.to_string());
                return Ok(None);
            }
        };

        match self.tx.try_send(decoded) {
            Ok(()) => self.count += 1,
            // 监控循环处理不过来 → 丢弃最新帧
            Err(TrySendError::Full(_)) => self.dropped_frames += 1,
            Err(TrySendError::Disconnected(_)) => {
                return Err("frame receiver dropped".to_string());
            }
        }

        if self.last.elapsed().as_secs_f64() >= 5.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            debug!(
                "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{}",
                self.count as f64 / elapsed,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        Ok(Some(frame))
    }
}
