// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLO 人体检测器
// 包含: 模型加载、预处理(letterbox)、推理、后处理(解码 + NMS)

use std::path::Path;
use std::time::Instant;

use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::{non_max_suppression, person_present, DetectError, Detection, PersonDetector};
use crate::frame::Frame;

/// NMS IOU阈值
const IOU_THRESHOLD: f32 = 0.45;
/// 最小输入尺寸: 保证 anchor 数大于每个 anchor 的通道数, 据此区分 v5/v8 输出格式
pub const MIN_INPUT_SIZE: u32 = 64;
/// letterbox 填充灰度
const PAD_VALUE: f32 = 114.0 / 255.0;

/// YOLO 检测器 (ONNX Runtime)
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    conf: f32,
    iou: f32,
    count: u64,
}

impl YoloDetector {
    /// 加载 ONNX 模型
    ///
    /// # Arguments
    /// * `model` - 模型路径 (yolov5s.onnx / yolov8n.onnx / yolo11n.onnx ...)
    /// * `input_size` - 模型输入尺寸 (正方形)
    /// * `conf` - 模型置信度阈值
    pub fn new(model: &str, input_size: u32, conf: f32) -> Result<Self, DetectError> {
        if input_size < MIN_INPUT_SIZE {
            return Err(DetectError::Load(format!(
                "模型输入尺寸 {} 小于 {}",
                input_size, MIN_INPUT_SIZE
            )));
        }
        if !Path::new(model).exists() {
            return Err(DetectError::Load(format!("模型文件不存在: {}", model)));
        }

        let threads = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(1);

        let session = Session::builder()
            .map_err(|e| DetectError::Load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectError::Load(e.to_string()))?
            .with_intra_threads(threads)
            .map_err(|e| DetectError::Load(e.to_string()))?
            .commit_from_file(model)
            .map_err(|e| DetectError::Load(e.to_string()))?;

        info!(
            "✅ 检测模型加载成功: {} (输入 {}x{}, conf {:.2})",
            model, input_size, input_size, conf
        );

        Ok(Self {
            session,
            input_size,
            conf,
            iou: IOU_THRESHOLD,
            count: 0,
        })
    }

    /// 完整的推理流程: preprocess → run → postprocess
    pub fn detections(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let start = Instant::now();
        let image = frame.to_image();
        let (xs, ratio) = letterbox(&image, self.input_size);

        let input = Tensor::from_array(xs)?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| DetectError::Shape("模型没有输出".to_string()))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let mut ys = decode_output(
            &shape,
            data,
            self.conf,
            ratio,
            (frame.width() as f32, frame.height() as f32),
        )?;
        non_max_suppression(&mut ys, self.iou);

        self.count += 1;
        if self.count % 30 == 0 {
            debug!(
                "🎯 检测: {}个目标 | {}人 | {:.1}ms/帧",
                ys.len(),
                ys.iter().filter(|d| d.is_person()).count(),
                start.elapsed().as_secs_f64() * 1000.0
            );
        }

        Ok(ys)
    }
}

impl PersonDetector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<bool, DetectError> {
        let ys = self.detections(frame)?;
        Ok(person_present(&ys))
    }
}

/// 预处理: 等比缩放到 size×size (左上对齐, 其余填充灰色), 输出 NCHW 张量与缩放比例
pub fn letterbox(image: &RgbImage, size: u32) -> (Array<f32, IxDyn>, f32) {
    let (w0, h0) = image.dimensions();
    let ratio = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
    let w1 = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
    let h1 = ((h0 as f32 * ratio).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(image, w1, h1, FilterType::Triangle);

    let mut ys = Array::ones((1, 3, size as usize, size as usize)).into_dyn();
    ys.fill(PAD_VALUE);
    for (x, y, rgb) in resized.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = rgb.0;
        ys[[0, 0, y, x]] = (r as f32) / 255.0;
        ys[[0, 1, y, x]] = (g as f32) / 255.0;
        ys[[0, 2, y, x]] = (b as f32) / 255.0;
    }

    (ys, ratio)
}

/// 后处理: 解码模型原始输出, 坐标还原到原图
///
/// 支持两种输出格式 (输入尺寸 >= MIN_INPUT_SIZE 时 anchor 数 N 总大于通道数):
/// - YOLOv8/v11: `[1, 4 + nc, N]`, 分数 = 类别最大分
/// - YOLOv5:     `[1, N, 5 + nc]`, 分数 = objectness × 类别分
pub fn decode_output(
    shape: &[usize],
    data: &[f32],
    conf: f32,
    ratio: f32,
    original: (f32, f32),
) -> Result<Vec<Detection>, DetectError> {
    if shape.len() != 3 || shape[0] == 0 {
        return Err(DetectError::Shape(format!("不支持的输出形状 {:?}", shape)));
    }
    let (rows, cols) = (shape[1], shape[2]);
    if data.len() < rows * cols {
        return Err(DetectError::Shape(format!(
            "输出数据长度 {} 小于形状 {:?}",
            data.len(),
            shape
        )));
    }

    let to_detection = |cx: f32, cy: f32, w: f32, h: f32, id: usize, confidence: f32| {
        let (width_original, height_original) = original;
        let cx = cx / ratio;
        let cy = cy / ratio;
        let w = w / ratio;
        let h = h / ratio;
        Detection::new(
            (cx - w / 2.).max(0.0).min(width_original),
            (cy - h / 2.).max(0.0).min(height_original),
            w,
            h,
            id,
            confidence,
        )
    };

    let mut ys = Vec::new();
    if rows < cols {
        // YOLOv8: 每列一个anchor
        if rows <= 4 {
            return Err(DetectError::Shape(format!("类别数为0: {:?}", shape)));
        }
        let nc = rows - 4;
        let n = cols;
        for j in 0..n {
            let (id, confidence) = (0..nc)
                .map(|c| (c, data[(4 + c) * n + j]))
                .fold((0, f32::MIN), |max, x| if x.1 > max.1 { x } else { max });
            if confidence < conf {
                continue;
            }
            ys.push(to_detection(
                data[j],
                data[n + j],
                data[2 * n + j],
                data[3 * n + j],
                id,
                confidence,
            ));
        }
    } else {
        // YOLOv5: 每行一个anchor
        if cols <= 5 {
            return Err(DetectError::Shape(format!("类别数为0: {:?}", shape)));
        }
        for pred in data.chunks_exact(cols).take(rows) {
            let objectness = pred[4];
            if objectness < conf {
                continue;
            }
            let (id, cls) = pred[5..]
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::MIN), |max, x| if x.1 > max.1 { x } else { max });
            let confidence = objectness * cls;
            if confidence < conf {
                continue;
            }
            ys.push(to_detection(pred[0], pred[1], pred[2], pred[3], id, confidence));
        }
    }

    Ok(ys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_pads_and_scales() {
        let image = RgbImage::from_pixel(64, 32, image::Rgb([255, 0, 0]));
        let (xs, ratio) = letterbox(&image, 32);
        assert_eq!(xs.shape(), &[1, 3, 32, 32]);
        assert!((ratio - 0.5).abs() < 1e-6);
        // 图像区域
        assert!((xs[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(xs[[0, 1, 0, 0]].abs() < 1e-6);
        // 填充区域
        assert!((xs[[0, 0, 20, 5]] - PAD_VALUE).abs() < 1e-6);
    }

    #[test]
    fn test_decode_v8_layout() {
        // nc = 2, N = 8 → shape [1, 6, 8]
        let n = 8;
        let mut data = vec![0.0f32; 6 * n];
        // anchor 1: person 0.9 at (50, 40) 20x10
        data[1] = 50.;
        data[n + 1] = 40.;
        data[2 * n + 1] = 20.;
        data[3 * n + 1] = 10.;
        data[4 * n + 1] = 0.9;
        // anchor 2: class 1 低于阈值
        data[5 * n + 2] = 0.1;

        let ys = decode_output(&[1, 6, n], &data, 0.25, 0.5, (640., 480.)).unwrap();
        assert_eq!(ys.len(), 1);
        assert!(ys[0].is_person());
        assert!((ys[0].xmin() - 80.).abs() < 1e-4);
        assert!((ys[0].ymin() - 70.).abs() < 1e-4);
        assert!((ys[0].width() - 40.).abs() < 1e-4);
    }

    #[test]
    fn test_decode_v5_layout() {
        // N = 10, nc = 3 → shape [1, 10, 8]
        let mut data = vec![
            10., 10., 4., 4., 0.9, 0.1, 0.2, 0.8, // objectness 0.9 × class2 0.8
            10., 10., 4., 4., 0.2, 0.9, 0.0, 0.0, // objectness 过低
        ];
        data.resize(10 * 8, 0.0);
        let ys = decode_output(&[1, 10, 8], &data, 0.25, 1.0, (100., 100.)).unwrap();
        assert_eq!(ys.len(), 1);
        assert_eq!(ys[0].class_id(), 2);
        assert!((ys[0].confidence() - 0.72).abs() < 1e-5);
        assert!(!person_present(&ys));
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode_output(&[1, 4], &[0.; 4], 0.25, 1.0, (1., 1.)).is_err());
        assert!(decode_output(&[1, 4, 10], &[0.; 40], 0.25, 1.0, (1., 1.)).is_err());
        assert!(decode_output(&[1, 6, 3], &[0.; 5], 0.25, 1.0, (1., 1.)).is_err());
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let err = YoloDetector::new("models/does-not-exist.onnx", 640, 0.25)
            .err()
            .unwrap();
        assert!(matches!(err, DetectError::Load(_)));
    }

    #[test]
    fn test_small_input_size_is_load_error() {
        let err = YoloDetector::new("models/yolov5s.onnx", 32, 0.25).err().unwrap();
        assert!(matches!(err, DetectError::Load(msg) if msg.contains("32")));
    }

    #[test]
    fn test_decode_v5_at_min_input_size() {
        // 64x64 输入: 3 × (8² + 4² + 2²) = 252 个 anchor, 80 类
        let (n, cols) = (252, 85);
        let mut data = vec![0.0f32; n * cols];
        let pred = &mut data[7 * cols..8 * cols];
        pred[..5].copy_from_slice(&[32., 32., 10., 20., 0.9]);
        pred[5] = 0.8;

        let ys = decode_output(&[1, n, cols], &data, 0.25, 1.0, (64., 64.)).unwrap();
        assert_eq!(ys.len(), 1);
        assert!(ys[0].is_person());
        assert!((ys[0].confidence() - 0.72).abs() < 1e-5);
    }
}
