//! moodcam-hw — Webcam capture for the annotation pipeline.
//!
//! Provides V4L2-based camera access and conversion of the negotiated pixel
//! format (MJPG or YUYV) to RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::{Frame, FrameError};
