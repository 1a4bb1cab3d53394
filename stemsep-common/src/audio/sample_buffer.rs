//! Decoded multi-channel sample buffer
//!
//! A `SampleBuffer` is what an engine produces for one stem. It is consumed by
//! value by a [`SampleWriter`](crate::codec::SampleWriter), so two concurrent
//! encodes never share the same sample memory.

use crate::{Error, Result};

/// Memory layout of a multi-channel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// Time-major: `[l0, r0, l1, r1, ...]`
    Interleaved,
    /// One contiguous block per channel: `[l0, l1, ..., r0, r1, ...]`
    Planar,
}

/// Sample storage in the engine's native numeric format
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Integer PCM, full-scale at `i16::MAX`
    I16(Vec<i16>),
    /// Integer PCM, full-scale at `i32::MAX`
    I32(Vec<i32>),
}

impl SampleData {
    /// Total number of samples across all channels
    pub fn len(&self) -> usize {
        match self {
            SampleData::F32(v) => v.len(),
            SampleData::F64(v) => v.len(),
            SampleData::I16(v) => v.len(),
            SampleData::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at flat index `i`, cast to f32
    fn get_f32(&self, i: usize) -> f32 {
        match self {
            SampleData::F32(v) => v[i],
            SampleData::F64(v) => v[i] as f32,
            SampleData::I16(v) => v[i] as f32 / i16::MAX as f32,
            SampleData::I32(v) => (v[i] as f64 / i32::MAX as f64) as f32,
        }
    }
}

/// Decoded audio for one stem
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    channels: u16,
    sample_rate: u32,
    layout: SampleLayout,
    data: SampleData,
}

impl SampleBuffer {
    /// Create a buffer, validating that the declared channel count matches the data
    ///
    /// # Errors
    /// * `InvalidInput` if channels or sample rate is zero, or if the sample
    ///   count is not a whole number of frames
    pub fn new(
        channels: u16,
        sample_rate: u32,
        layout: SampleLayout,
        data: SampleData,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidInput("channel count must be nonzero".to_string()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidInput("sample rate must be nonzero".to_string()));
        }
        if data.len() % channels as usize != 0 {
            return Err(Error::InvalidInput(format!(
                "{} samples is not a whole number of {}-channel frames",
                data.len(),
                channels
            )));
        }

        Ok(Self {
            channels,
            sample_rate,
            layout,
            data,
        })
    }

    /// Single-channel buffer (layout is irrelevant for one column)
    pub fn mono(sample_rate: u32, data: SampleData) -> Result<Self> {
        Self::new(1, sample_rate, SampleLayout::Interleaved, data)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Normalize to time-major interleaved f32
    ///
    /// Planar buffers are transposed; mono buffers are already one column.
    pub fn to_interleaved_f32(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        let frames = self.frames();
        let mut out = Vec::with_capacity(self.data.len());

        match self.layout {
            SampleLayout::Planar if channels > 1 => {
                for frame in 0..frames {
                    for ch in 0..channels {
                        out.push(self.data.get_f32(ch * frames + frame));
                    }
                }
            }
            _ => {
                for i in 0..self.data.len() {
                    out.push(self.data.get_f32(i));
                }
            }
        }

        out
    }

    /// Serialize as raw little-endian 32-bit float PCM (`f32le`)
    pub fn to_f32le_bytes(&self) -> Vec<u8> {
        let samples = self.to_interleaved_f32();
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_channels() {
        let result = SampleBuffer::new(0, 44100, SampleLayout::Interleaved, SampleData::F32(vec![]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_partial_frame() {
        let result = SampleBuffer::new(
            2,
            44100,
            SampleLayout::Interleaved,
            SampleData::F32(vec![0.0, 0.1, 0.2]),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_planar_is_transposed_to_interleaved() {
        // Two channels, three frames: L = 1,2,3  R = -1,-2,-3
        let buffer = SampleBuffer::new(
            2,
            48000,
            SampleLayout::Planar,
            SampleData::F32(vec![1.0, 2.0, 3.0, -1.0, -2.0, -3.0]),
        )
        .unwrap();

        assert_eq!(buffer.frames(), 3);
        assert_eq!(
            buffer.to_interleaved_f32(),
            vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]
        );
    }

    #[test]
    fn test_interleaved_passes_through() {
        let samples = vec![0.5, -0.5, 0.25, -0.25];
        let buffer = SampleBuffer::new(
            2,
            44100,
            SampleLayout::Interleaved,
            SampleData::F32(samples.clone()),
        )
        .unwrap();
        assert_eq!(buffer.to_interleaved_f32(), samples);
    }

    #[test]
    fn test_mono_planar_is_single_column() {
        let buffer = SampleBuffer::new(
            1,
            22050,
            SampleLayout::Planar,
            SampleData::F64(vec![0.5, 0.25]),
        )
        .unwrap();
        assert_eq!(buffer.to_interleaved_f32(), vec![0.5, 0.25]);
    }

    #[test]
    fn test_integer_samples_are_scaled() {
        let buffer = SampleBuffer::mono(8000, SampleData::I16(vec![i16::MAX, 0])).unwrap();
        let out = buffer.to_interleaved_f32();
        assert!((out[0] - 1.0).abs() < f32::EPSILON);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_f32le_serialization() {
        let buffer = SampleBuffer::mono(8000, SampleData::F32(vec![1.0, -2.0])).unwrap();
        let bytes = buffer.to_f32le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn test_duration() {
        let buffer = SampleBuffer::new(
            2,
            44100,
            SampleLayout::Interleaved,
            SampleData::F32(vec![0.0; 88200]),
        )
        .unwrap();
        assert_eq!(buffer.frames(), 44100);
        assert!((buffer.duration_seconds() - 1.0).abs() < 1e-9);
    }
}
