//! Classification of a finished playback attempt.
//!
//! [`Error`]/[`ErrorKind`] answer "what went wrong and why"; `PlaybackOutcome` answers
//! "what should the caller do about it" — retry from the last known position, give up, or
//! nothing at all because playback finished cleanly. Keeping the two separate means `ErrorKind`
//! doesn't need to grow playback-specific variants, and the worker's retry loop has exactly
//! three cases to match on.

/// Result of one playback attempt, as returned by the session worker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaybackOutcome {
    /// The stream was opened, played to completion, and drained cleanly, or the user
    /// skipped/quit before that happened. Either way there is nothing left to retry.
    Ok,
    /// The decoder or demuxer could not be brought up, or playback self-corrupted mid-stream.
    /// The caller may retry with `last_timestamp` preserved; the core enforces no retry limit.
    SoftFail,
    /// The output device or filter chain could not be constructed. Retrying would fail the
    /// same way, so the worker gives up.
    HardFail,
}
