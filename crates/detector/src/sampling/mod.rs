#![forbid(unsafe_code)]

mod buffer;
mod hardware;
pub mod msr;

pub use buffer::SampleBuffer;
pub use hardware::{BufferDescriptor, NoopHardware, SamplingHardware};
