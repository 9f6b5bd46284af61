#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Entry(#[from] replog_entry::Error),
    #[error(transparent)]
    Keystore(#[from] replog_keys::Error),
    #[error("log has no heads to append from")]
    NoHeads,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single entry in a `join` batch did not make it into the log.
/// Matches §4.2's failure semantics: rejections don't propagate beyond a
/// log message, only `Timeout`/`NotALeader`/etc. (handled a layer up, in
/// `replog-shared`) are surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    SignatureInvalid,
    AccessDenied,
    ClockNotMonotonic,
    GidMismatch { expected: String, found: String },
    /// A next-reference resolved to an entry rejected earlier in the same
    /// `join` batch; this entry cannot be accepted either.
    ParentRejected(replog_proto::Hash),
}
