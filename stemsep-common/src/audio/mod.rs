//! In-memory audio handed from a separation engine to a sample writer

mod sample_buffer;

pub use sample_buffer::{SampleBuffer, SampleData, SampleLayout};
