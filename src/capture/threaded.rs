//! Blocking capture backends driven from their own thread.

use futures::channel::{mpsc, oneshot};

use super::FrameStream;
use crate::{data_structures::texture::TextureData, error::DeviceError};

/// One captured image as tightly packed RGBA8 rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

// frames waiting for the renderer; the grabber skips frames while it is full
const QUEUE: usize = 2;

type Frames = mpsc::Receiver<Result<RawFrame, DeviceError>>;

/// Runs a blocking grabber on a capture thread.
///
/// `open` runs on that thread and returns the stream size and a function that
/// blocks until the next frame. Opening errors are returned from this call.
/// Grab errors arrive through [`FrameStream::poll_frame`] and end the stream.
/// The thread exits after the stream is dropped.
pub fn spawn_capture<O, G>(label: &str, open: O) -> Result<Box<dyn FrameStream>, DeviceError>
where
    O: FnOnce() -> Result<((u32, u32), G), DeviceError> + Send + 'static,
    G: FnMut() -> Result<RawFrame, DeviceError> + 'static,
{
    let (ready_tx, ready_rx) = oneshot::channel();
    let (mut frame_tx, frame_rx) = mpsc::channel(QUEUE);
    std::thread::Builder::new()
        .name(format!("capture {label}"))
        .spawn(move || {
            let mut grab = match open() {
                Ok((size, grab)) => {
                    let _ = ready_tx.send(Ok(size));
                    grab
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            loop {
                let frame = grab();
                let failed = frame.is_err();
                if let Err(e) = frame_tx.try_send(frame) {
                    if e.is_disconnected() {
                        break;
                    }
                }
                if failed {
                    break;
                }
            }
            log::debug!("capture thread finished");
        })
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

    let size = futures::executor::block_on(ready_rx)
        .map_err(|_| DeviceError::Unavailable("capture thread exited while opening".to_string()))??;
    Ok(Box::new(ThreadedStream {
        label: label.to_string(),
        size,
        frames: Some(frame_rx),
        last: None,
    }))
}

struct ThreadedStream {
    label: String,
    size: (u32, u32),
    frames: Option<Frames>,
    last: Option<TextureData>,
}

impl ThreadedStream {
    fn texture(&mut self, frame: RawFrame) -> Result<TextureData, DeviceError> {
        let RawFrame {
            width,
            height,
            pixels,
        } = frame;
        if pixels.len() != (width * height * 4) as usize {
            return Err(DeviceError::Stream(format!(
                "{} bytes for a {}x{} frame",
                pixels.len(),
                width,
                height
            )));
        }
        let texture = match &self.last {
            Some(last) if (last.width, last.height) == (width, height) => last.successor(pixels),
            _ => TextureData::new(self.label.as_str(), width, height, pixels, true),
        };
        self.last = Some(texture.clone());
        Ok(texture)
    }
}

impl FrameStream for ThreadedStream {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn poll_frame(&mut self) -> Option<Result<TextureData, DeviceError>> {
        let frames = self.frames.as_mut()?;
        let mut newest = None;
        let mut closed = false;
        loop {
            match frames.try_next() {
                Ok(Some(frame)) => newest = Some(frame),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }
        if closed {
            self.frames = None;
        }
        match newest {
            Some(Ok(frame)) => Some(self.texture(frame)),
            Some(Err(e)) => Some(Err(e)),
            None if closed => Some(Err(DeviceError::Stream(format!("{} stopped", self.label)))),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use instant::{Duration, Instant};

    use super::*;

    fn solid(width: u32, height: u32, shade: u8) -> RawFrame {
        RawFrame {
            width,
            height,
            pixels: [shade, shade, shade, 255].repeat((width * height) as usize),
        }
    }

    fn next_frame(stream: &mut dyn FrameStream) -> Result<TextureData, DeviceError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(frame) = stream.poll_frame() {
                return frame;
            }
            assert!(Instant::now() < deadline, "no frame arrived");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn opening_errors_come_back_from_the_call() {
        let result = spawn_capture("broken", || {
            Err::<((u32, u32), fn() -> Result<RawFrame, DeviceError>), _>(DeviceError::PermissionDenied)
        });
        assert!(matches!(result, Err(DeviceError::PermissionDenied)));
    }

    #[test]
    fn frames_become_revisions_of_one_texture() {
        let mut stream = spawn_capture("fake", || {
            let mut shade = 0u8;
            let grab = move || -> Result<RawFrame, DeviceError> {
                std::thread::sleep(Duration::from_millis(1));
                shade = shade.wrapping_add(1);
                Ok(solid(4, 2, shade))
            };
            Ok(((4, 2), grab))
        })
        .expect("stream");
        assert_eq!(stream.size(), (4, 2));

        let first = next_frame(stream.as_mut()).expect("frame");
        let second = next_frame(stream.as_mut()).expect("frame");
        assert_eq!((first.width, first.height, first.label.as_str()), (4, 2, "fake"));
        assert_eq!(first.id(), second.id());
        assert!(second.revision() > first.revision());
    }

    #[test]
    fn a_failed_grab_ends_the_stream() {
        let mut stream = spawn_capture("flaky", || {
            let mut frames = vec![Err(DeviceError::Stream("unplugged".to_string())), Ok(solid(2, 2, 9))];
            let grab = move || frames.pop().unwrap_or(Err(DeviceError::Stream("empty".to_string())));
            Ok(((2, 2), grab))
        })
        .expect("stream");

        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.last().is_none_or(|r: &Result<TextureData, DeviceError>| r.is_ok()) {
            assert!(Instant::now() < deadline, "stream never failed");
            if let Some(frame) = stream.poll_frame() {
                seen.push(frame);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(matches!(seen.last(), Some(Err(DeviceError::Stream(_)))));
        // nothing but the closing notice may follow
        for _ in 0..3 {
            assert!(!matches!(stream.poll_frame(), Some(Ok(_))));
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(stream.poll_frame().is_none());
    }

    #[test]
    fn short_frames_are_rejected() {
        let mut stream = spawn_capture("short", || {
            let grab = move || -> Result<RawFrame, DeviceError> {
                std::thread::sleep(Duration::from_millis(1));
                Ok(RawFrame {
                    width: 4,
                    height: 4,
                    pixels: vec![0; 8],
                })
            };
            Ok(((4, 4), grab))
        })
        .expect("stream");
        assert!(matches!(next_frame(stream.as_mut()), Err(DeviceError::Stream(_))));
    }
}
