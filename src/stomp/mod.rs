//! STOMP wire protocol
//!
//! The race server exposes a STOMP broker over WebSocket; each WebSocket text
//! message carries one or more NUL-terminated frames.

mod frame;

pub use frame::{Command, Frame, Version, parse_frames, parse_frames_as};
