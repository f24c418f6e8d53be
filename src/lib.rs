//! HDLC-like framing over a serial line.
//!
//! [`HdlcSerial`] keeps a background thread in sync with the incoming byte stream and hands
//! decoded frames to callers through a single slot inbox. [`FrameCodec`] runs the same
//! framing on async streams.

pub mod codec;
pub mod error;
pub mod framed;
pub mod hdlc;
pub mod inbox;
pub mod serial;
pub mod statistics;
pub mod transport;

pub use codec::Codec;
pub use error::{Error, FormatError, Result, TransportError};
pub use framed::FrameCodec;
pub use hdlc::{Framer, HdlcCodec, CONTROL_ESCAPE, FLAG};
pub use serial::HdlcSerial;
pub use statistics::StatisticsSnapshot;
pub use transport::{SerialConfig, SerialTransport, Transport};
