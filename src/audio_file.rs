//! Provides the `AudioFile` abstraction for handling audio stream playback.
//!
//! This module implements a buffered `Read + Seek` wrapper around a [`StreamDownload`],
//! optionally teeing every byte read to a temp file for later use as the save path.
//!
//! # Examples
//!
//! ```no_run
//! use monoplay::audio_file::AudioFile;
//! use std::io::{Read, Seek, SeekFrom};
//!
//! let mut audio = AudioFile::try_from_download(download, true, None, None)?;
//!
//! if audio.is_seekable() {
//!     audio.seek(SeekFrom::Start(1000))?;
//! }
//!
//! let mut buf = vec![0; 1024];
//! match audio.read(&mut buf) {
//!     Ok(n) => println!("Read {n} bytes"),
//!     Err(e) => eprintln!("Read error: {e}"),
//! }
//! ```

use std::io::{BufReader, Read, Seek};
use std::path::PathBuf;
use std::sync::Arc;

use stream_download::{storage::StorageProvider, StreamDownload};
use symphonia::core::io::MediaSource;

use crate::error::Result;
use crate::tee::{Tee, TeeStatus};

/// Combines Read and Seek traits for audio stream handling.
///
/// This trait requires thread-safety (Send + Sync) to enable:
/// * Concurrent playback and downloading
/// * Safe sharing between threads
/// * Integration with async runtimes
pub trait ReadSeek: Read + Seek + Send + Sync {}

/// Blanket implementation for any type that implements both Read and Seek
impl<T: Read + Seek + Send + Sync> ReadSeek for T {}

/// Default buffer size for audio stream reads (32 KiB).
///
/// This size is chosen to match Symphonia's read pattern, which reads
/// sequentially in increasing chunks up to 32 KiB.
pub const BUFFER_LEN: usize = 32 * 1024;

/// A buffered, optionally-teed stream presented to the decoder as a `MediaSource`.
pub struct AudioFile {
    /// The underlying stream implementation, either a direct buffered download or a tee over it
    inner: Box<dyn ReadSeek>,

    /// Indicates if seeking operations are supported (false for livestreams)
    is_seekable: bool,

    /// The total size of the audio file in bytes, if known
    byte_len: Option<u64>,
}

impl AudioFile {
    /// Wraps a download stream in a 32 KiB buffer, presenting it as a [`MediaSource`].
    ///
    /// When `tee` is given (a temp path to write to, and the status handle the session will
    /// later consult), every byte read is additionally written to that temp path; the session
    /// finalizes it (renames it to the final path) once playback completes cleanly, via
    /// [`crate::tee::finalize`].
    ///
    /// # Errors
    ///
    /// Returns an error if the tee's temp file cannot be created.
    pub fn try_from_download<P>(
        download: StreamDownload<P>,
        is_seekable: bool,
        byte_len: Option<u64>,
        tee: Option<(PathBuf, Arc<TeeStatus>)>,
    ) -> Result<Self>
    where
        P: StorageProvider + Sync + 'static,
        P::Reader: Sync,
    {
        let buffered = BufReader::with_capacity(BUFFER_LEN, download);

        let inner: Box<dyn ReadSeek> = if let Some((temp_path, status)) = tee {
            Box::new(Tee::new(buffered, &temp_path, status)?)
        } else {
            Box::new(buffered)
        };

        Ok(Self {
            inner,
            is_seekable,
            byte_len,
        })
    }

    /// Wraps an already in-memory (or otherwise local) reader directly, with no network stream
    /// or buffering layer underneath it.
    ///
    /// Used by tests that exercise the decoder against a synthetic stream without a network
    /// round trip, and equally suitable for an embedder that wants to play a local file.
    ///
    /// A byte-level tee is only faithful to the selected stream when the container holds a
    /// single track; callers combining this with `tee` should check
    /// [`crate::decoder::Decoder::track_count`] after construction and call
    /// [`TeeStatus::disable`] if it's more than one, the way `opener::open` does for the network
    /// path.
    ///
    /// # Errors
    ///
    /// Returns an error if the tee's temp file cannot be created.
    pub fn from_reader<R>(
        reader: R,
        is_seekable: bool,
        byte_len: Option<u64>,
        tee: Option<(PathBuf, Arc<TeeStatus>)>,
    ) -> Result<Self>
    where
        R: ReadSeek + 'static,
    {
        let inner: Box<dyn ReadSeek> = if let Some((temp_path, status)) = tee {
            Box::new(Tee::new(reader, &temp_path, status)?)
        } else {
            Box::new(reader)
        };

        Ok(Self {
            inner,
            is_seekable,
            byte_len,
        })
    }
}

/// Implements reading from the audio stream.
impl Read for AudioFile {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Implements seeking within the audio stream.
impl Seek for AudioFile {
    #[inline]
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Implements the `MediaSource` trait required by Symphonia for media playback.
impl MediaSource for AudioFile {
    /// Returns whether seeking is supported in this audio stream.
    #[inline]
    fn is_seekable(&self) -> bool {
        self.is_seekable
    }

    /// Returns the total size of the audio stream in bytes, if known.
    #[inline]
    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}
