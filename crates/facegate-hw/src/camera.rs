//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera {0} is not accessible")]
    Unavailable(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported by {0}")]
    StreamingNotSupported(String),
}

/// Source of camera frames for the recognition loop.
///
/// `None` means no frame was available this time; callers decide whether
/// that matters.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, Y channel extracted).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// Packed 24-bit RGB.
    Rgb3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"RGB3") {
            Some(PixelFormat::Rgb3)
        } else {
            None
        }
    }
}

/// Resolve the `--camera` argument: a bare index `N` means `/dev/videoN`.
pub fn device_path(camera: &str) -> String {
    if !camera.is_empty() && camera.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{camera}")
    } else {
        camera.to_string()
    }
}

/// V4L2 camera with a persistent mmap capture stream.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a camera by index ("0") or device path ("/dev/video2").
    pub fn open(camera: &str) -> Result<Self, CameraError> {
        let device_path = device_path(camera);
        if !Path::new(&device_path).exists() {
            return Err(CameraError::Unavailable(device_path));
        }

        let device = Device::with_path(&device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) {
                CameraError::DeviceBusy(device_path.clone())
            } else {
                CameraError::Unavailable(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::Unavailable(format!("{device_path}: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported(device_path));
        }

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or RGB3)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            format = ?pixel_format,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::Unavailable(format!("failed to create mmap stream: {e}")))?;

        Ok(Self {
            stream,
            width: negotiated.width,
            height: negotiated.height,
            device_path,
            pixel_format,
        })
    }

    fn to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, frame::FrameError> {
        match self.pixel_format {
            PixelFormat::Grey => {
                let pixels = (self.width * self.height) as usize;
                if buf.len() < pixels {
                    return Err(frame::FrameError::InvalidLength {
                        expected: pixels,
                        actual: buf.len(),
                    });
                }
                Ok(buf[..pixels].to_vec())
            }
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
            PixelFormat::Rgb3 => frame::rgb_to_grayscale(buf, self.width, self.height),
        }
    }
}

impl FrameSource for Camera {
    /// Blocks until the driver hands over the next buffer.
    fn next_frame(&mut self) -> Option<Frame> {
        let (data, sequence) = match self.stream.next() {
            Ok((buf, meta)) => (buf.to_vec(), meta.sequence),
            Err(e) => {
                tracing::warn!(device = %self.device_path, error = %e, "failed to dequeue frame");
                return None;
            }
        };

        let gray = match self.to_grayscale(&data) {
            Ok(gray) => gray,
            Err(e) => {
                tracing::warn!(device = %self.device_path, error = %e, "dropping malformed frame");
                return None;
            }
        };

        match Frame::from_gray(gray, self.width, self.height, sequence) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                None
            }
        }
    }
}
