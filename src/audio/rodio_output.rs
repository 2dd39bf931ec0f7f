//! Speaker output through rodio.

use std::io::Cursor;

use instant::Duration;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::{AudioBuffer, AudioOutput, Voice};
use crate::error::DeviceError;

/// The system's default output device. Sound stops when this is dropped.
pub struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl std::fmt::Debug for RodioOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioOutput").finish_non_exhaustive()
    }
}

impl RodioOutput {
    pub fn open_default() -> Result<Self, DeviceError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn play(&mut self, buffer: &AudioBuffer, offset: f32) -> Result<Box<dyn Voice>, DeviceError> {
        let source = Decoder::new(Cursor::new(buffer.bytes.clone()))
            .map_err(|e| DeviceError::Stream(format!("{}: {}", buffer.name, e)))?;
        let sink = Sink::try_new(&self.handle).map_err(|e| DeviceError::Stream(e.to_string()))?;
        sink.append(source.skip_duration(Duration::from_secs_f32(offset.max(0.0))));
        log::info!("{} started on the default output", buffer.name);
        Ok(Box::new(RodioVoice { sink }))
    }
}

struct RodioVoice {
    sink: Sink,
}

impl Voice for RodioVoice {
    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn volume(&self) -> f32 {
        self.sink.volume()
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}
