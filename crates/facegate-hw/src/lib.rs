//! facegate-hw: Hardware abstraction for camera capture and GPIO lines.
//!
//! Provides V4L2-based camera access, the grayscale [`Frame`] type, and
//! the lock/indicator/switch lines of the door controller.

pub mod camera;
pub mod frame;
pub mod gpio;

pub use camera::{Camera, CameraError, FrameSource};
pub use frame::Frame;
pub use gpio::{AccessLines, DigitalLine, Direction, GpioError, MemoryLine, SysfsLine};
