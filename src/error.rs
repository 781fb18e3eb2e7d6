use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by the frame pipeline.
///
/// Frame buffer overflow is not an error: the assembler recovers from it
/// locally and only counts it (see [`crate::StreamStats::overflows`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffered bytes do not start with a decodable frame header.
    Header(String),
    /// The decoder failed after the header was parsed.
    Decode(String),
    /// The block consumer asked the decoder to stop.
    Interrupted,
    /// The surface driver rejected a window or a pixel write.
    Surface(String),
    /// A decoded tile is taller than the row buffers.
    BandOverflow { rows: u16, capacity: u16 },
    /// Invalid player configuration.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Header(msg) => write!(f, "frame header: {msg}"),
            Error::Decode(msg) => write!(f, "frame decode: {msg}"),
            Error::Interrupted => write!(f, "decode interrupted"),
            Error::Surface(msg) => write!(f, "surface write: {msg}"),
            Error::BandOverflow { rows, capacity } => {
                write!(f, "tile of {rows} rows exceeds row buffer of {capacity} rows")
            }
            Error::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
