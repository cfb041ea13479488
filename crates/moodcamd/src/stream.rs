//! Pull-based frame pump: capture, annotate, encode, frame for multipart delivery.

use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use moodcam_core::{FrameAnnotator, Painter};
use moodcam_hw::{Camera, CameraError};
use std::iter::FusedIterator;

/// Response content type for the multipart stream.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// A capture device the pump can pull frames from.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage, CameraError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        (**self).next_frame()
    }
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        let frame = self.capture_frame()?;
        tracing::trace!(seq = frame.sequence, "captured frame");
        Ok(frame.image)
    }
}

/// Unbounded sequence of multipart-framed JPEG parts from one capture device.
///
/// The pump owns the device. It is released on the first capture failure, on
/// [`close`](Self::close), or when the pump is dropped, whichever comes first.
/// Once released the pump only yields `None`.
pub struct StreamPump<S: FrameSource, P: Painter> {
    source: Option<S>,
    annotator: FrameAnnotator<P>,
    jpeg_quality: u8,
    frames_sent: u64,
}

impl<S: FrameSource, P: Painter> StreamPump<S, P> {
    pub fn new(source: S, annotator: FrameAnnotator<P>, jpeg_quality: u8) -> Self {
        Self {
            source: Some(source),
            annotator,
            jpeg_quality,
            frames_sent: 0,
        }
    }

    /// Release the capture device. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            tracing::info!(frames = self.frames_sent, "stream closed; capture device released");
        }
    }
}

impl<S: FrameSource, P: Painter> Iterator for StreamPump<S, P> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        loop {
            let source = self.source.as_mut()?;

            let mut frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::info!(error = %e, "frame capture failed; ending stream");
                    self.close();
                    return None;
                }
            };

            self.annotator.annotate(&mut frame);

            match encode_jpeg(&frame, self.jpeg_quality) {
                Ok(jpeg) => {
                    self.frames_sent += 1;
                    return Some(multipart_part(&jpeg));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "JPEG encoding failed; skipping frame");
                }
            }
        }
    }
}

impl<S: FrameSource, P: Painter> FusedIterator for StreamPump<S, P> {}

impl<S: FrameSource, P: Painter> Drop for StreamPump<S, P> {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(frame)?;
    Ok(jpeg)
}

/// Wrap one JPEG image as a `--frame` multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    part.put_slice(PART_HEADER);
    part.put_slice(jpeg);
    part.put_slice(PART_TRAILER);
    part.freeze()
}
