//! Video capture devices feeding textures.
//!
//! With the `webcam` feature, native builds capture from the system camera
//! through nokhwa. Otherwise the default device is a [`TestPattern`].

use instant::Instant;

use crate::{data_structures::texture::TextureData, error::DeviceError};

#[cfg(not(target_arch = "wasm32"))]
mod threaded;

#[cfg(not(target_arch = "wasm32"))]
pub use threaded::{RawFrame, spawn_capture};

#[cfg(all(feature = "webcam", not(target_arch = "wasm32")))]
mod nokhwa_device;

#[cfg(all(feature = "webcam", not(target_arch = "wasm32")))]
pub use nokhwa_device::NokhwaDevice;

/// A running capture; frames are polled once per rendered frame.
pub trait FrameStream {
    fn size(&self) -> (u32, u32);

    /// The newest frame if one arrived since the last call.
    fn poll_frame(&mut self) -> Option<Result<TextureData, DeviceError>>;
}

pub trait CaptureDevice {
    fn open(&self, width: u32, height: u32) -> Result<Box<dyn FrameStream>, DeviceError>;
}

/// The first system camera.
#[cfg(all(feature = "webcam", not(target_arch = "wasm32")))]
pub fn default_device() -> Box<dyn CaptureDevice> {
    Box::new(NokhwaDevice::new(0))
}

/// The synthetic [`TestPattern`]; build with the `webcam` feature for a real camera.
#[cfg(not(all(feature = "webcam", not(target_arch = "wasm32"))))]
pub fn default_device() -> Box<dyn CaptureDevice> {
    Box::new(TestPattern)
}

/// Stand-in used when the platform offers no capture backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCaptureDevice;

impl CaptureDevice for NoCaptureDevice {
    fn open(&self, _width: u32, _height: u32) -> Result<Box<dyn FrameStream>, DeviceError> {
        Err(DeviceError::Unavailable(
            "no video capture backend on this platform".to_string(),
        ))
    }
}

/// Synthetic device producing scrolling colour bars.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestPattern;

impl CaptureDevice for TestPattern {
    fn open(&self, width: u32, height: u32) -> Result<Box<dyn FrameStream>, DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::Stream(format!("cannot capture at {width}x{height}")));
        }
        Ok(Box::new(TestPatternStream {
            width,
            height,
            started: Instant::now(),
            last: None,
        }))
    }
}

struct TestPatternStream {
    width: u32,
    height: u32,
    started: Instant,
    last: Option<TextureData>,
}

const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 192, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [192, 0, 0, 255],
    [0, 0, 192, 255],
];

impl TestPatternStream {
    fn render(&self, shift: u32) -> Vec<u8> {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let mut pixels = Vec::with_capacity((self.width * self.height * 4) as usize);
        for _ in 0..self.height {
            for x in 0..self.width {
                let bar = ((x + shift) / bar_width) as usize % BARS.len();
                pixels.extend(BARS[bar]);
            }
        }
        pixels
    }
}

impl FrameStream for TestPatternStream {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn poll_frame(&mut self) -> Option<Result<TextureData, DeviceError>> {
        let shift = (self.started.elapsed().as_millis() / 10) as u32 % self.width;
        let pixels = self.render(shift);
        let frame = match &self.last {
            Some(previous) => previous.successor(pixels),
            None => TextureData::new("test pattern", self.width, self.height, pixels, true),
        };
        self.last = Some(frame.clone());
        Some(Ok(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_backend_reports_unavailable() {
        let err = NoCaptureDevice.open(1280, 720).err();
        assert!(matches!(err, Some(DeviceError::Unavailable(_))));
    }

    #[test]
    fn test_pattern_frames_share_a_texture_id() {
        let mut stream = TestPattern.open(14, 2).expect("stream");
        assert_eq!(stream.size(), (14, 2));
        let first = stream.poll_frame().expect("frame").expect("ok");
        let second = stream.poll_frame().expect("frame").expect("ok");
        assert_eq!(first.id(), second.id());
        assert_eq!(second.revision(), first.revision() + 1);
        assert_eq!(first.pixels.len(), 14 * 2 * 4);
    }
}
