//! Sample tap
//!
//! `TapSource` wraps any iterator of interleaved `f32` samples (e.g. a
//! decoder feeding the output device), passes every sample through
//! unchanged, and hands a downmixed `AudioFrame` to a `FrameSink` each time
//! `frame_len` mono samples have accumulated.

use super::buffer::FrameSink;
use super::types::AudioFrame;

/// Pass-through iterator that feeds the spectrum pipeline
pub struct TapSource<I> {
    inner: I,
    sink: FrameSink,
    channels: u16,
    sample_rate: u32,
    frame_len: usize,
    interleaved: Vec<f32>,
}

impl<I> TapSource<I>
where
    I: Iterator<Item = f32>,
{
    /// Tap `inner`, emitting one frame per `frame_len` mono samples.
    pub fn new(inner: I, sink: FrameSink, channels: u16, sample_rate: u32, frame_len: usize) -> Self {
        let channels = channels.max(1);
        let frame_len = frame_len.max(1);
        Self {
            inner,
            sink,
            channels,
            sample_rate,
            frame_len,
            interleaved: Vec::with_capacity(frame_len * channels as usize),
        }
    }

    fn flush(&mut self) {
        if self.interleaved.is_empty() {
            return;
        }
        let frame = AudioFrame::from_interleaved(&self.interleaved, self.sample_rate, self.channels);
        self.interleaved.clear();
        if !frame.is_empty() {
            self.sink.submit(frame);
        }
    }
}

impl<I> Iterator for TapSource<I>
where
    I: Iterator<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = match self.inner.next() {
            Some(s) => s,
            None => {
                // End of stream: hand over the trailing partial frame
                self.flush();
                return None;
            }
        };

        self.interleaved.push(sample);
        if self.interleaved.len() >= self.frame_len * self.channels as usize {
            self.flush();
        }

        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
