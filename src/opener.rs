//! Stream Opener: turns a URL into a decoder ready to produce samples.
//!
//! Builds an HTTP stream, feeds it through a progress-tracked `StreamDownload`, and hands the
//! result to a [`Decoder`]. Duration isn't known ahead of the HTTP response the way a catalog
//! API's metadata would provide it, so the prefetch size falls back to a fixed default rather
//! than a bitrate-derived estimate.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stream_download::{
    http::HttpStream, source::SourceStream, storage::temp::TempStorageProvider, StreamDownload,
};
use url::Url;

use crate::{
    audio_file::AudioFile,
    decoder::Decoder,
    error::{Error, Result},
    tee::TeeStatus,
};

/// Number of bytes to prefetch before handing the stream to the decoder, when the response
/// doesn't give enough information to size this more precisely.
const PREFETCH_DEFAULT: u64 = 64 * 1024;

/// Where to save a tee'd copy of the compressed stream, computed by the caller from sanitized
/// tag strings.
pub struct TeeTarget {
    /// Temporary container path, written to while streaming.
    pub temp_path: PathBuf,
    /// Final path the temp file is renamed to once playback completes cleanly.
    pub final_path: PathBuf,
    /// Shared failure flag, written by the [`crate::tee::Tee`] and read back by the session
    /// after playback ends to decide whether finalizing (the rename) is still safe.
    pub status: Arc<TeeStatus>,
}

/// Opens `url`, starts streaming it to local storage, and constructs a decoder over it.
///
/// `resume_from` is the demuxer position (in the stream's time base) to seek to once the
/// decoder is open — used by the session worker's soft-fail retry to resume playback
/// just past the point of failure rather than restarting at 0
///
/// # Errors
///
/// All failure modes here are soft-fail: the caller can retry. Returns an error if the
/// URL cannot be opened, the stream cannot be probed, or no default audio track is found.
pub async fn open(
    client: &reqwest::Client,
    url: &Url,
    tee: Option<TeeTarget>,
    resume_from: Option<Duration>,
) -> Result<Decoder> {
    let stream = HttpStream::new(client.clone(), url.clone())
        .await
        .map_err(|e| Error::unavailable(e.to_string()))?;

    let content_length = stream.content_length();
    if let Some(len) = content_length {
        info!("opened stream: {len} bytes from {url}");
    } else {
        info!("opened stream of unknown length from {url}");
    }

    let buffered = Arc::new(Mutex::new(Duration::ZERO));
    let progress_state = Arc::clone(&buffered);
    let callback = move |_stream: &HttpStream<_>,
                          state: stream_download::StreamState,
                          _: &tokio_util::sync::CancellationToken| {
        if let Ok(mut buffered) = progress_state.lock() {
            *buffered = Duration::from_millis(
                u64::try_from(state.current_position).unwrap_or(u64::MAX),
            );
        }
    };

    let download = StreamDownload::from_stream(
        stream,
        TempStorageProvider::default(),
        stream_download::Settings::default()
            .on_progress(callback)
            .prefetch_bytes(PREFETCH_DEFAULT)
            .cancel_on_drop(true),
    )
    .await?;

    let tee_status = tee.as_ref().map(|t| Arc::clone(&t.status));
    let tee_info = tee.map(|t| (t.temp_path, t.status));
    let file = AudioFile::try_from_download(download, true, content_length, tee_info)?;
    let mut decoder = Decoder::new(file)?;

    if decoder.track_count() > 1 {
        if let Some(status) = &tee_status {
            warn!(
                "stream has {} tracks, a byte-level tee can't isolate just the selected one; \
                 disabling save for this session",
                decoder.track_count()
            );
            status.disable();
        }
    }

    if let Some(pos) = resume_from {
        if pos > Duration::ZERO {
            use rodio::Source;
            if let Err(e) = decoder.try_seek(pos) {
                warn!("could not resume at {pos:?}, starting from 0: {e}");
            }
        }
    }

    Ok(decoder)
}
