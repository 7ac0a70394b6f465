/// Errors produced by the OKVS solver and the protocols built on it.
#[derive(Debug)]
pub enum Error {
    /// The dense linear system of a bin was singular; retrying with a fresh
    /// seed is the only remedy.
    EncodeFailed,
    /// A bin received more items than its capacity.
    BinOverflow {
        /// The offending bin.
        bin: usize,
        /// The number of items hashed to the bin.
        size: usize,
        /// The bin capacity.
        capacity: usize,
    },
    /// Two equal keys were passed to a single encoding.
    DuplicateKey,
    /// Mismatched input/output lengths.
    ShapeMismatch {
        /// The expected length.
        expected: usize,
        /// The length actually passed.
        got: usize,
    },
    /// The requested solver parameters are invalid.
    InvalidParameters {
        /// Number of items.
        nitems: usize,
        /// Row weight.
        weight: usize,
    },
    /// An input/output error occurred.
    IoError(std::io::Error),
    /// The coin-tossing commitment check failed.
    CommitmentCheckFailed,
    /// The OPRF transcript digests of the two parties disagree.
    MaliciousCheckFailed,
    /// An error occurred in the protocol state machine.
    ProtocolError(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(e: std::io::Error) -> Error {
        Error::IoError(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::EncodeFailed => "encoding failed: dense system is singular".fmt(f),
            Error::BinOverflow {
                bin,
                size,
                capacity,
            } => write!(
                f,
                "bin {} overflowed: {} items with capacity {}",
                bin, size, capacity
            ),
            Error::DuplicateKey => "duplicate key in encoding".fmt(f),
            Error::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected length {}, got {}", expected, got)
            }
            Error::InvalidParameters { nitems, weight } => write!(
                f,
                "invalid solver parameters: {} items with row weight {}",
                nitems, weight
            ),
            Error::IoError(e) => write!(f, "IO error: {}", e),
            Error::CommitmentCheckFailed => "commitment check failed".fmt(f),
            Error::MaliciousCheckFailed => "transcript digest check failed".fmt(f),
            Error::ProtocolError(s) => write!(f, "protocol error: {}", s),
        }
    }
}
