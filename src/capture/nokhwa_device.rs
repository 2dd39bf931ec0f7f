//! Native webcams through nokhwa.

use nokhwa::{
    Camera, NokhwaError,
    pixel_format::RgbAFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
};

use super::{CaptureDevice, FrameStream, RawFrame, spawn_capture};
use crate::error::DeviceError;

/// A system camera by index, 0 being the default one.
#[derive(Clone, Copy, Debug, Default)]
pub struct NokhwaDevice {
    index: u32,
}

impl NokhwaDevice {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl CaptureDevice for NokhwaDevice {
    /// Asks for the format closest to `width`x`height`; the stream reports what the camera chose.
    fn open(&self, width: u32, height: u32) -> Result<Box<dyn FrameStream>, DeviceError> {
        let index = self.index;
        spawn_capture(&format!("camera {index}"), move || {
            let wanted = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30);
            let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(wanted));
            let mut camera = Camera::new(CameraIndex::Index(index), format).map_err(unavailable)?;
            camera.open_stream().map_err(unavailable)?;
            let resolution = camera.resolution();
            log::info!(
                "camera {} streaming at {}x{}",
                index,
                resolution.width(),
                resolution.height()
            );
            let grab = move || -> Result<RawFrame, DeviceError> {
                let buffer = camera.frame().map_err(stream_failed)?;
                let image = buffer.decode_image::<RgbAFormat>().map_err(stream_failed)?;
                Ok(RawFrame {
                    width: image.width(),
                    height: image.height(),
                    pixels: image.into_raw(),
                })
            };
            Ok(((resolution.width(), resolution.height()), grab))
        })
    }
}

fn unavailable(e: NokhwaError) -> DeviceError {
    DeviceError::Unavailable(e.to_string())
}

fn stream_failed(e: NokhwaError) -> DeviceError {
    DeviceError::Stream(e.to_string())
}
