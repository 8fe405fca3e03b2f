// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 帧数据 (Frame)
/// RGB24 frame buffer shared by capture, detection and recording
use fast_image_resize as fr;
use image::RgbImage;

/// 帧相关错误
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("帧数据长度不匹配: {width}x{height} 需要 {expected} 字节, 实际 {actual}")]
    Size {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("帧尺寸非法: {0}x{1}")]
    Dimensions(u32, u32),

    #[error("缩放失败: {0}")]
    Resize(String),
}

/// RGB24 帧 (width × height × 3)
#[derive(Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Dimensions(width, height));
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::Size {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// 纯色帧 (测试与占位)
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, FrameError> {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 缩放到目标尺寸; 尺寸一致时直接返回
    pub fn resize(self, width: u32, height: u32) -> Result<Self, FrameError> {
        if (self.width, self.height) == (width, height) {
            return Ok(self);
        }
        if width == 0 || height == 0 {
            return Err(FrameError::Dimensions(width, height));
        }

        let src = fr::images::Image::from_vec_u8(
            self.width,
            self.height,
            self.data,
            fr::PixelType::U8x3,
        )
        .map_err(|e| FrameError::Resize(e.to_string()))?;
        let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);

        let mut resizer = fr::Resizer::new();
        resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| FrameError::Resize(e.to_string()))?;

        Self::new(width, height, dst.into_vec())
    }

    /// 转换为 image::RgbImage (供检测器预处理)
    pub fn to_image(&self) -> RgbImage {
        // 长度已在构造时校验
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_length() {
        let err = Frame::new(4, 2, vec![0; 10]).unwrap_err();
        assert!(matches!(err, FrameError::Size { expected: 24, actual: 10, .. }));
        assert!(Frame::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_resize_same_size_is_identity() {
        let frame = Frame::filled(8, 6, [1, 2, 3]).unwrap();
        let resized = frame.clone().resize(8, 6).unwrap();
        assert_eq!(frame, resized);
    }

    #[test]
    fn test_resize_changes_dimensions() {
        let frame = Frame::filled(64, 48, [200, 100, 50]).unwrap();
        let resized = frame.resize(32, 24).unwrap();
        assert_eq!(resized.size(), (32, 24));
        assert_eq!(resized.data().len(), 32 * 24 * 3);
        // 纯色图缩放后颜色不变
        assert_eq!(&resized.data()[..3], &[200, 100, 50]);
    }

    #[test]
    fn test_to_image() {
        let frame = Frame::filled(3, 2, [9, 8, 7]).unwrap();
        let img = frame.to_image();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [9, 8, 7]);
    }
}
