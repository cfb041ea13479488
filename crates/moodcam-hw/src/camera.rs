//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// Motion JPEG, one JPEG image per buffer (most USB webcams).
    Mjpg,
    /// YUYV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"MJPG") {
            Some(Self::Mjpg)
        } else if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else {
            None
        }
    }
}

/// An open V4L2 capture device with a running mmap stream.
///
/// The device is released when the camera is dropped.
pub struct Camera {
    // Declared before `device` so the stream is torn down first.
    stream: MmapStream<'static>,
    #[allow(dead_code)]
    device: Device,
    pub width: u32,
    pub height: u32,
    device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera (e.g. "/dev/video0") and start streaming at the
    /// requested size, or whatever size the driver negotiates instead.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for MJPG; drivers without it usually fall back to YUYV.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"MJPG");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need MJPG or YUYV)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, CAPTURE_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        Ok(Self {
            stream,
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Capture the next frame as RGB. Blocks until the driver delivers one.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (width, height, pixel_format) = (self.width, self.height, self.pixel_format);

        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let sequence = meta.sequence;

        let image = match pixel_format {
            PixelFormat::Mjpg => frame::mjpeg_to_rgb(&buf[..used], width, height),
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
        }
        .map_err(|e| CameraError::CaptureFailed(format!("{pixel_format:?} conversion failed: {e}")))?;

        Ok(Frame { image, sequence })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let result = Camera::open("/dev/nonexistent-video", 640, 480);
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }
}
