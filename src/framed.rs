use bytes::{Buf, BytesMut};
use log::{debug, warn};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::Codec;
use crate::error::Error;
use crate::hdlc::Framer;
use crate::statistics::{Statistics, StatisticsSnapshot};

/// Runs a [`Codec`] over async streams, e.g. `FramedRead<SerialStream, FrameCodec<_>>`.
///
/// Frames that fail to decode are counted and skipped; the stream only yields payloads.
/// Transmit counters count frames handed to the sink, not frames the port accepted.
pub struct FrameCodec<C> {
    framer: Framer,
    codec: C,
    statistics: Statistics,
}

impl<C: Codec> FrameCodec<C> {
    pub fn new(codec: C) -> Self {
        FrameCodec {
            framer: Framer::new(C::FRAME_DELIMITER),
            codec,
            statistics: Statistics::new(),
        }
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }
}

impl<C: Codec> Decoder for FrameCodec<C> {
    type Item = Vec<u8>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            let Some(raw) = self.framer.find_frame(byte) else {
                continue;
            };
            match self.codec.decode(&raw) {
                Ok(frame) => {
                    self.statistics.record_rx(true);
                    debug!("Decoded a frame of {} bytes.", frame.len());
                    return Ok(Some(frame));
                }
                Err(e) => {
                    self.statistics.record_rx(false);
                    warn!("Dropping a received frame of {} bytes: {e}", raw.len());
                }
            }
        }
        Ok(None)
    }
}

impl<C: Codec> Encoder<&[u8]> for FrameCodec<C> {
    type Error = Error;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self.codec.encode(payload) {
            Ok(raw) => {
                self.statistics.record_tx(true);
                dst.extend_from_slice(&raw);
                Ok(())
            }
            Err(e) => {
                self.statistics.record_tx(false);
                Err(Error::Encode(e))
            }
        }
    }
}
