// src/video.rs - Camera acquisition
use image::DynamicImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use tracing::{debug, info, warn};

use crate::error::AcquisitionError;

/// A decoded camera frame; landmark coordinates are in its pixel space.
pub type VideoFrame = DynamicImage;

pub trait FrameSource {
    fn read_frame(&mut self) -> Result<VideoFrame, AcquisitionError>;

    fn resolution(&self) -> (u32, u32);
}

pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self, AcquisitionError> {
        debug!(index, width, height, "opening camera");

        let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let camera = Camera::new(CameraIndex::Index(index), requested).map_err(|e| {
            AcquisitionError::Open {
                index,
                reason: e.to_string(),
            }
        })?;

        let resolution = camera.resolution();
        info!(
            index,
            width = resolution.width(),
            height = resolution.height(),
            "camera opened"
        );
        Ok(Self { camera })
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<VideoFrame, AcquisitionError> {
        if !self.camera.is_stream_open() {
            self.camera
                .open_stream()
                .map_err(|e| AcquisitionError::Capture(e.to_string()))?;
        }

        let frame = self
            .camera
            .frame()
            .map_err(|e| AcquisitionError::Capture(e.to_string()))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| AcquisitionError::Decode(e.to_string()))?;

        // Unflipped: the overlay surface does the selfie mirroring.
        Ok(DynamicImage::ImageRgb8(decoded))
    }

    fn resolution(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width(), resolution.height())
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if self.camera.is_stream_open() {
            if let Err(e) = self.camera.stop_stream() {
                warn!(error = %e, "failed to stop camera stream");
            }
        }
    }
}

/// Human-readable names of the cameras the platform reports.
pub fn list_cameras() -> Vec<String> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras.iter().map(|c| c.human_name()).collect(),
        Err(e) => {
            warn!(error = %e, "failed to query cameras");
            Vec::new()
        }
    }
}
