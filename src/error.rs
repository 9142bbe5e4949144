use std::io::{Error as IoError, ErrorKind as IoErrorKind};

/// Status returned by loopback reads and channel construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackError {
    /// Nothing is buffered right now. Not sticky: a later write makes data
    /// readable again.
    EndOfData,
    /// The requested option is not supported.
    NotImplemented(String),
}

impl LoopbackError {
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfData)
    }
}

impl std::fmt::Display for LoopbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfData => write!(f, "end of data"),
            Self::NotImplemented(what) => write!(f, "unimplemented: {}", what),
        }
    }
}

impl std::error::Error for LoopbackError {}

impl From<LoopbackError> for IoError {
    fn from(e: LoopbackError) -> Self {
        match e {
            LoopbackError::EndOfData => IoError::new(IoErrorKind::UnexpectedEof, e),
            LoopbackError::NotImplemented(_) => IoError::new(IoErrorKind::Unsupported, e),
        }
    }
}

/// Map a loopback read result onto the std::io convention, where "nothing
/// available" is a zero-length read.
pub(crate) fn read_result_to_io(r: Result<usize, LoopbackError>) -> std::io::Result<usize> {
    match r {
        Ok(n) => Ok(n),
        Err(LoopbackError::EndOfData) => Ok(0),
        Err(e) => Err(e.into()),
    }
}
