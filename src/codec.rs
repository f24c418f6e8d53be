use crate::error::FormatError;

/// Turns one payload into one delimited raw frame and back.
///
/// Implementations are stateless: the same codec is shared by the receive thread and
/// any number of transmitting threads.
pub trait Codec {
    /// The byte marking frame boundaries on the wire.
    const FRAME_DELIMITER: u8;

    /// Build the raw frame for `payload`, delimiters included.
    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, FormatError>;

    /// Recover the payload from a raw frame, delimiters included.
    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, FormatError>;
}
