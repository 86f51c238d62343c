//! GPU buffer layouts and the write path
//!
//! `buffer_layouts` fixes the byte layout of every managed buffer,
//! `buffer_sink` is the backend-agnostic write primitive and `wgpu_sink`
//! implements it on a wgpu device.

pub mod buffer_layouts;
pub mod buffer_sink;
pub mod wgpu_sink;

pub use buffer_sink::{BufferKind, BufferLock, BufferSink, BufferTarget, RecordingSink};
pub use wgpu_sink::WgpuBufferSink;
