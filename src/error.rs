use thiserror::Error;

/// Errors surfaced by the library. The CLI wraps these in `anyhow` at the
/// boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid symbol selector term: {0:?}")]
    InvalidSelector(String),

    #[error("bad canvas geometry {0}x{1}")]
    BadGeometry(i32, i32),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("control sequence would exceed {limit} bytes when formatted")]
    SeqTooLong { limit: usize },

    #[error("control sequence template: {0}")]
    BadSeqTemplate(String),

    #[error("token exceeds maximum length of {0} bytes")]
    OversizedToken(usize),

    #[error("unsupported pixel buffer: {0}")]
    BadPixelBuffer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("decode failed: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
