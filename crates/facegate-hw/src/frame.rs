//! Frame type and pixel-format conversion to grayscale.

use image::GrayImage;

/// A captured grayscale camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: GrayImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Wrap raw grayscale bytes (`width * height` of them).
    pub fn from_gray(
        data: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u32,
    ) -> Result<Self, FrameError> {
        let expected = (width * height) as usize;
        let actual = data.len();
        let image = GrayImage::from_raw(width, height, data)
            .ok_or(FrameError::InvalidLength { expected, actual })?;
        Ok(Self {
            image,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Convert packed 24-bit RGB to grayscale using BT.601 luma weights.
pub fn rgb_to_grayscale(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 3) as usize;
    if rgb.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: rgb.len(),
        });
    }
    Ok(rgb[..expected]
        .chunks_exact(3)
        .map(|p| {
            let y = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
            y.round().clamp(0.0, 255.0) as u8
        })
        .collect())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
