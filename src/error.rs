//! Crate-wide error type and call-site trace accumulation.
//!
//! Every fallible operation in this crate eventually returns [`Error`], a sum
//! type over five kinds (`InvalidArgument`, `NotFound`, `Unimplemented`,
//! `Internal`, `FailedPrecondition`). As an error bubbles up through `?`, call
//! sites can attach a [`Frame`] describing where it passed through using
//! [`Context::context`]; the accumulated trace renders as
//! `root\n  at f (file:line) [kind] - msg`, mirroring how this codebase has
//! always reported layered failures, just without a macro preprocessor to
//! capture `__FILE__`/`__LINE__` for us — `#[track_caller]` does that instead.
//!
//! Leaf subsystems (`tiff`, `mrxs`, the INI parser, the cache, the handle
//! pool) keep their own small `thiserror` enums and convert into `Error` via
//! `From`, the same layering `IoError -> FormatError -> TiffError` already
//! used elsewhere in this codebase.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// The five-way classification every [`Error`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unimplemented,
    Internal,
    FailedPrecondition,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unimplemented => "UNIMPLEMENTED",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::FailedPrecondition => "FAILED_PRECONDITION",
        };
        f.write_str(s)
    }
}

/// One call-site trace entry, formatted as `  at f (file:line) [kind] - msg`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub message: Option<String>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  at {} ({}:{})", self.function, self.file, self.line)
    }
}

/// The crate-wide error type: a root message, a kind, and zero or more
/// accumulated call-site frames.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    root: String,
    frames: Vec<Frame>,
}

impl Error {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let loc = Location::caller();
        Error {
            kind,
            root: message.into(),
            frames: vec![Frame {
                function: "new",
                file: loc.file(),
                line: loc.line(),
                message: None,
            }],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn root_message(&self) -> &str {
        &self.root
    }

    #[track_caller]
    fn add_frame(mut self, message: Option<String>) -> Self {
        let loc = Location::caller();
        self.frames.push(Frame {
            function: "context",
            file: loc.file(),
            line: loc.line(),
            message,
        });
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for frame in &self.frames {
            write!(f, "\n{} [{}]", frame, self.kind)?;
            if let Some(msg) = &frame.message {
                write!(f, " - {msg}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Attaches a call-site frame to a `Result`'s error, the way `RETURN_IF_ERROR`
/// / `ASSIGN_OR_RETURN` did in the codebase this crate's error design is
/// modeled on — except there is no preprocessor here, so `#[track_caller]`
/// records the call site instead of a macro expanding `__FILE__`/`__LINE__`.
pub trait Context<T> {
    fn context(self, message: impl Into<String>) -> Result<T, Error>;
}

impl<T, E: Into<Error>> Context<T> for Result<T, E> {
    #[track_caller]
    fn context(self, message: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| e.into().add_frame(Some(message.into())))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Leaf subsystem errors
// ---------------------------------------------------------------------------

/// Errors from the local random-access file source.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    #[error("range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },
    #[error("read error on {path}: {message}")]
    Read { path: String, message: String },
    #[error("object not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum TiffError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    #[error("invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),
    #[error("invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),
    #[error("invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),
    #[error("file too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },
    #[error("invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),
    #[error("missing required tag: {0}")]
    MissingTag(&'static str),
    #[error("invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),
    #[error("operation requires {expected} organization but file is {actual}")]
    StripOrganization { expected: &'static str, actual: &'static str },
    #[error("unknown field type: {0}")]
    UnknownFieldType(u16),
    #[error("tile index out of range: ({0}, {1})")]
    InvalidTileCoord(u32, u32),
}

#[derive(Debug, Clone, Error)]
pub enum IniError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    #[error("missing section [{0}]")]
    MissingSection(String),
    #[error("missing key {key} in section [{section}]")]
    MissingKey { section: String, key: String },
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Error)]
pub enum MrxsError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    #[error("INI error: {0}")]
    Ini(#[from] IniError),
    #[error("unsupported index version: expected \"01.02\", got {0:?}")]
    UnsupportedIndexVersion(String),
    #[error("truncated index record at offset {0}")]
    TruncatedRecord(u64),
    #[error("record length {length} exceeds maximum {max}")]
    RecordTooLarge { length: i64, max: i64 },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("zlib inflate failed: {0}")]
    Inflate(String),
    #[error("codec error decoding stored image: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
}

#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("pool is shutting down")]
    ShuttingDown,
    #[error("timed out waiting for a handle")]
    TimedOut,
    #[error("failed to open handle: {0}")]
    Open(String),
}

macro_rules! impl_into_error {
    ($leaf:ty, $kind_fn:expr) => {
        impl From<$leaf> for Error {
            #[track_caller]
            fn from(e: $leaf) -> Error {
                let kind = ($kind_fn)(&e);
                Error::new(kind, e.to_string())
            }
        }
    };
}

impl_into_error!(IoError, |e: &IoError| match e {
    IoError::RangeOutOfBounds { .. } => ErrorKind::InvalidArgument,
    IoError::NotFound(_) => ErrorKind::NotFound,
    IoError::Open { .. } | IoError::Read { .. } => ErrorKind::Internal,
});

impl_into_error!(TiffError, |e: &TiffError| match e {
    TiffError::Io(inner) => match inner {
        IoError::NotFound(_) => ErrorKind::NotFound,
        IoError::RangeOutOfBounds { .. } => ErrorKind::InvalidArgument,
        _ => ErrorKind::Internal,
    },
    TiffError::MissingTag(_) => ErrorKind::NotFound,
    TiffError::UnsupportedCompression(_) => ErrorKind::Unimplemented,
    TiffError::StripOrganization { .. } => ErrorKind::FailedPrecondition,
    TiffError::InvalidMagic(_)
    | TiffError::InvalidVersion(_)
    | TiffError::InvalidBigTiffOffsetSize(_)
    | TiffError::FileTooSmall { .. }
    | TiffError::InvalidIfdOffset(_)
    | TiffError::InvalidTagValue { .. }
    | TiffError::UnknownFieldType(_)
    | TiffError::InvalidTileCoord(..) => ErrorKind::InvalidArgument,
});

impl_into_error!(IniError, |e: &IniError| match e {
    IniError::Io(_) => ErrorKind::Internal,
    IniError::MissingSection(_) | IniError::MissingKey { .. } => ErrorKind::NotFound,
    IniError::InvalidValue { .. } => ErrorKind::InvalidArgument,
});

impl_into_error!(MrxsError, |e: &MrxsError| match e {
    MrxsError::Io(_) => ErrorKind::Internal,
    MrxsError::Ini(inner) => match inner {
        IniError::MissingSection(_) | IniError::MissingKey { .. } => ErrorKind::NotFound,
        _ => ErrorKind::Internal,
    },
    MrxsError::UnsupportedIndexVersion(_) => ErrorKind::InvalidArgument,
    MrxsError::TruncatedRecord(_) | MrxsError::RecordTooLarge { .. } | MrxsError::InvalidRecord(_) => {
        ErrorKind::Internal
    }
    MrxsError::Inflate(_) | MrxsError::Codec(_) => ErrorKind::Internal,
});

impl_into_error!(CacheError, |_: &CacheError| ErrorKind::InvalidArgument);

impl_into_error!(PoolError, |e: &PoolError| match e {
    PoolError::ShuttingDown => ErrorKind::FailedPrecondition,
    PoolError::TimedOut => ErrorKind::Internal,
    PoolError::Open(_) => ErrorKind::Internal,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_root_and_frame() {
        let e = Error::new(ErrorKind::NotFound, "slide missing");
        let s = e.to_string();
        assert!(s.starts_with("slide missing"));
        assert!(s.contains("[NOT_FOUND]"));
    }

    #[test]
    fn context_preserves_root_and_appends_frame() {
        fn inner() -> Result<()> {
            Err(IoError::NotFound("x.svs".into())).context("opening slide")
        }
        let err = inner().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.root_message(), "object not found: x.svs");
        assert!(err.to_string().contains("opening slide"));
    }

    #[test]
    fn multiple_contexts_stack_frames() {
        fn level0() -> Result<()> {
            Err(IoError::NotFound("x".into())).context("level0")
        }
        fn level1() -> Result<()> {
            level0().context("level1")
        }
        let err = level1().unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("level0"));
        assert!(rendered.contains("level1"));
        assert_eq!(rendered.matches("\n  at").count(), 2);
    }
}
