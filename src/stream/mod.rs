pub mod frame_buffer;
pub mod sse;

pub use frame_buffer::{frame_stream, FrameBuffer};
pub use sse::{data_frame, done_frame, is_done_sentinel, DONE_SENTINEL};
