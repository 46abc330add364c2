pub mod decoder;

pub use decoder::{classify_frame, decode_frame, DecodedFrame, WireFrame};
