/// Reasons a payload could not be framed, or a raw frame could not be unframed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The raw frame does not begin and end with the flag byte.
    #[error("frame is not enclosed in flag bytes")]
    MissingDelimiter,

    /// Too few bytes between the flags to hold a checksum.
    #[error("frame too short ({len} bytes after unstuffing)")]
    TooShort { len: usize },

    /// The frame ended straight after a control escape.
    #[error("frame ends with a dangling control escape")]
    DanglingEscape,

    /// The frame check sequence did not verify.
    #[error("bad frame check sequence (computed {computed:#06x}, received {received:#06x})")]
    BadChecksum { computed: u16, received: u16 },

    /// Nothing to send.
    #[error("empty payload")]
    EmptyPayload,

    /// The payload exceeds the codec's maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Failures of the underlying byte stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The port could not be opened.
    #[error("failed to open serial port {name}: {source}")]
    Open {
        name: String,
        source: tokio_serial::Error,
    },

    /// The serial driver reported an error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// An I/O error occurred on the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has already been closed.
    #[error("transport closed")]
    Closed,
}

/// Errors surfaced by the public `HdlcSerial` API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The payload could not be encoded; nothing was written.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] FormatError),

    /// The encoded frame could not be written.
    #[error("failed to write frame: {0}")]
    Write(#[source] TransportError),

    /// `start` was called on a running engine.
    #[error("receive loop already started")]
    AlreadyStarted,

    /// `start` was called after `stop`; engines are not restartable.
    #[error("receive loop has been stopped")]
    Stopped,

    /// The receive thread could not be spawned.
    #[error("failed to spawn receive thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Framing or stream failure inside the async frame codec.
    #[error("frame codec I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
