// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 人体检测 (Person Detection)
///
/// 检测器只回答一个问题: 当前帧里有没有人
/// - PersonDetector: 检测器统一接口
/// - YoloDetector:   基于 ONNX Runtime 的 YOLO 模型 (v5 / v8 / v11 输出格式)
use std::sync::{Arc, Mutex};

use crate::frame::Frame;

pub mod yolo;

pub use yolo::YoloDetector;

/// COCO 类别: 0 = person
pub const PERSON_CLASS_ID: usize = 0;

/// 检测错误
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("模型加载失败: {0}")]
    Load(String),

    #[error("推理失败: {0}")]
    Inference(#[from] ort::Error),

    #[error("张量形状错误: {0}")]
    Shape(String),

    #[error("检测器锁已中毒")]
    Poisoned,
}

/// 统一的人体检测接口
pub trait PersonDetector: Send {
    /// 帧中是否存在人 (置信度阈值由模型自身决定)
    fn detect(&mut self, frame: &Frame) -> Result<bool, DetectError>;
}

/// 共享检测器: 模型只加载一次, 监控循环多次启停复用
impl<D: PersonDetector> PersonDetector for Arc<Mutex<D>> {
    fn detect(&mut self, frame: &Frame) -> Result<bool, DetectError> {
        let mut detector = self.lock().map_err(|_| DetectError::Poisoned)?;
        detector.detect(frame)
    }
}

/// 检测框 (帧坐标系)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    class_id: usize,
    confidence: f32,
}

impl Detection {
    pub fn new(
        xmin: f32,
        ymin: f32,
        width: f32,
        height: f32,
        class_id: usize,
        confidence: f32,
    ) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            class_id,
            confidence,
        }
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Detection) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &Detection) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union <= 0. {
            0.
        } else {
            inter / union
        }
    }
}

/// 是否包含人: 任意一个检测框类别为 person 即可, 不再额外过滤置信度
pub fn person_present(detections: &[Detection]) -> bool {
    detections.iter().any(Detection::is_person)
}

/// 非极大值抑制 (按类别)
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id == xs[index].class_id
                && xs[prev_index].iou(&xs[index]) > iou_threshold
            {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_present_ignores_other_classes() {
        let dets = vec![
            Detection::new(0., 0., 10., 10., 2, 0.9),
            Detection::new(0., 0., 10., 10., 16, 0.8),
        ];
        assert!(!person_present(&dets));
        assert!(!person_present(&[]));
    }

    #[test]
    fn test_person_present_any_confidence() {
        // 低置信度的人同样算 (阈值在模型侧)
        let dets = vec![
            Detection::new(0., 0., 10., 10., 2, 0.9),
            Detection::new(5., 5., 10., 10., PERSON_CLASS_ID, 0.01),
        ];
        assert!(person_present(&dets));
    }

    #[test]
    fn test_iou() {
        let a = Detection::new(0., 0., 10., 10., 0, 0.9);
        let b = Detection::new(5., 0., 10., 10., 0, 0.8);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-5);
        assert_eq!(a.iou(&Detection::new(20., 20., 5., 5., 0, 0.5)), 0.);
    }

    #[test]
    fn test_nms_keeps_best_per_class() {
        let mut dets = vec![
            Detection::new(0., 0., 10., 10., 0, 0.6),
            Detection::new(1., 1., 10., 10., 0, 0.9),
            Detection::new(1., 1., 10., 10., 2, 0.7),
            Detection::new(50., 50., 10., 10., 0, 0.5),
        ];
        non_max_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 3);
        assert_eq!(dets[0].confidence(), 0.9);
        assert!(dets.iter().any(|d| d.class_id() == 2));
        assert!(dets.iter().any(|d| d.xmin() == 50.));
    }
}
