//! Tee muxer: preserves the original compressed stream alongside decoding.
//!
//! A second output stream, fed from the same bytes the decoder consumes: header written on
//! open, trailer written exactly once on clean completion, skipped entirely on quit.
//!
//! This stack has no muxing crate (no `libavformat` equivalent among `symphonia`/`rodio`'s
//! dependencies), and the formats this crate decodes are ordinarily self-framed elementary
//! streams (ADTS AAC being the common case for streamed audio), so the tee is implemented as a
//! byte-level passthrough rather than a packet-level rescale-and-remux: every byte `AudioFile`
//! reads from the network is also appended to the temp file, in the same order, with the same
//! framing the source stream already provides: original compressed bytes preserved, untouched by
//! the filter/volume chain, written in read order, finalized only on clean completion — without
//! fabricating a muxing dependency.
//!
//! A byte-level copy is only correct when the container holds exactly one track: a multi-track
//! container (isomp4 can carry more than one) would have every track's bytes interleaved into
//! the save file, not just the one being played. Once the decoder has probed the container, the
//! opener checks its track count and disables saving for the session (via [`TeeStatus::disable`])
//! rather than produce a save file quietly mixing in bytes from a stream nobody asked to keep.
//!
//! See DESIGN.md for the tradeoff this accepts (no container remux, no independent stream time
//! base — the output file is a raw copy of the input framing, and multi-track containers can't
//! be saved at all).

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// Shared failure flag between a [`Tee`] (owned by the decoder, and so unreachable once
/// playback is under way) and the session that requested the tee and wants to know, after
/// playback ends, whether it is still safe to finalize.
#[derive(Default)]
pub struct TeeStatus(AtomicBool);

impl TeeStatus {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    fn mark_failed(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Disables saving for this session ahead of any write or seek failure, e.g. because the
    /// stream turned out to hold more than one track and a byte-level tee can no longer
    /// guarantee it's only capturing the selected one.
    pub(crate) fn disable(&self) {
        self.mark_failed();
    }

    /// Whether a write or seek on the teed stream has already failed this session.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Wraps a reader, writing every byte read through to a buffered temp file.
///
/// The temp file is flushed (best-effort) when this value drops, but is never renamed to its
/// final name here: by the time playback ends, this value has been moved into the decoder and
/// is no longer reachable from the session. Finalizing — the rename that stands in for "trailer
/// written exactly once, only on clean completion" — is done by [`finalize`], called by the
/// session once it knows the attempt completed cleanly and without `do_quit`.
pub struct Tee<R> {
    inner: R,
    writer: BufWriter<File>,
    status: Arc<TeeStatus>,
}

impl<R: Read> Tee<R> {
    /// Opens `temp_path` for writing and wraps `inner` to duplicate every read into it.
    ///
    /// Creates parent directories of `temp_path` if missing. Failures and seeks on the teed
    /// stream are reported through `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file's parent directory or the temp file itself cannot be
    /// created.
    pub fn new(inner: R, temp_path: &Path, status: Arc<TeeStatus>) -> io::Result<Self> {
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(temp_path)?;
        Ok(Self {
            inner,
            writer: BufWriter::new(file),
            status,
        })
    }
}

impl<R: Read> Read for Tee<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 && !self.status.failed() {
            if let Err(e) = self.writer.write_all(&buf[..n]) {
                warn!("tee write failed, disabling save for this session: {e}");
                self.status.mark_failed();
            }
        }
        Ok(n)
    }
}

/// Seeking the underlying stream would desync the tee copy from what has already been written,
/// so any seek permanently disables further tee writes for this session (best-effort)
/// rather than producing a corrupted archive.
impl<R: Read + Seek> Seek for Tee<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.status.failed() {
            warn!("seeking a teed stream, disabling save for this session");
            self.status.mark_failed();
        }
        self.inner.seek(pos)
    }
}

/// Finalizes a tee started with the same `status`: renames the temp container to its final
/// path, unless a write or seek already disabled saving for this session.
///
/// Must only be called after clean completion (the "trailer written exactly once, only if the
/// session completed without `do_quit`" rule) — callers must skip this entirely on quit or
/// skip-interrupt, leaving the temp file behind.
///
/// # Errors
///
/// Returns an error if the final directory cannot be created or the rename fails.
pub fn finalize(temp_path: &Path, final_path: &Path, status: &TeeStatus) -> Result<bool> {
    if status.failed() {
        return Ok(false);
    }
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(temp_path, final_path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tee_duplicates_bytes_and_finalizes() {
        let dir = std::env::temp_dir().join(format!("monoplay-tee-test-{}", std::process::id()));
        let temp = dir.join("song.tmp");
        let final_ = dir.join("out").join("song.aac");

        let data = b"hello tee".to_vec();
        let status = Arc::new(TeeStatus::new());
        let mut tee = Tee::new(Cursor::new(data.clone()), &temp, Arc::clone(&status)).unwrap();

        let mut out = Vec::new();
        tee.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        drop(tee);

        let moved = finalize(&temp, &final_, &status).unwrap();
        assert!(moved);
        assert_eq!(fs::read(&final_).unwrap(), data);
        assert!(!temp.exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn failed_tee_is_not_finalized() {
        let dir = std::env::temp_dir().join(format!("monoplay-tee-test-fail-{}", std::process::id()));
        let temp = dir.join("song.tmp");
        let final_ = dir.join("out").join("song.aac");

        let status = Arc::new(TeeStatus::new());
        let mut tee = Tee::new(Cursor::new(b"partial".to_vec()), &temp, Arc::clone(&status)).unwrap();
        let mut buf = [0_u8; 4];
        tee.read_exact(&mut buf).unwrap();
        tee.seek(SeekFrom::Start(0)).unwrap();
        assert!(status.failed());
        drop(tee);

        let moved = finalize(&temp, &final_, &status).unwrap();
        assert!(!moved);
        assert!(!final_.exists());

        fs::remove_dir_all(&dir).ok();
    }
}
