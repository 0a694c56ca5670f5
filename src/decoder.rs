//! Audio decoder implementation using Symphonia.
//!
//! This module provides a decoder that directly uses Symphonia's capabilities to:
//! * Probe and support multiple formats (AAC/ADTS, FLAC, MP3, MP4, WAV)
//! * Enable seeking with proper error recovery
//! * Process audio in floating point format
//!
//! # Audio Parameters
//!
//! The decoder detects and provides:
//! * Sample rate (defaults to 44.1 kHz if unspecified)
//! * Bits per sample (codec-dependent)
//! * Channel count (mono/stereo/multi-channel)
//!
//! # Error Handling
//!
//! The decoder implements robust error recovery:
//! * Skips corrupted packets (up to 3 consecutive)
//! * Handles codec reset requests
//! * Recovers from seekable I/O errors
//! * Gracefully handles end of stream
//! * Ensures clean state by clearing buffers after any decoder error
//!
//! # Performance
//!
//! The decoder is optimized for:
//! * Memory efficient buffering (64 KiB minimum, matching Symphonia's requirements)
//! * Coordinated with `AudioFile` buffer sizes (32 KiB)
//! * Low allocation overhead (reuses sample buffers)

use std::{io, time::Duration};

use rodio::source::SeekError;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CodecParameters, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions},
    meta::{MetadataOptions, StandardTagKey, Value},
    probe::Hint,
};

use crate::{
    audio_file::{AudioFile, BUFFER_LEN},
    error::{Error, Result},
    normalize::{self, Normalize},
    util::ToF32,
};

/// A single audio sample as 32-bit floating point, normalized to `[-1.0, 1.0]`.
pub type SampleFormat = f32;

/// Sample rate assumed when a stream doesn't report one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Audio decoder supporting multiple formats through Symphonia.
///
/// Probes the container format and selects a decoder automatically, then exposes the decoded
/// audio as both a [`rodio::Source`] and a plain [`Iterator`] of samples.
///
/// # Example
/// ```no_run
/// use monoplay::decoder::Decoder;
/// use monoplay::audio_file::AudioFile;
///
/// let file = /* AudioFile instance ... */;
/// let mut decoder = Decoder::new(file)?;
///
/// decoder.try_seek(std::time::Duration::from_secs(60))?;
///
/// for sample in decoder {
///     // Process f32 sample...
/// }
/// ```
pub struct Decoder {
    /// Format reader (demuxer) for extracting encoded audio packets
    demuxer: Box<dyn FormatReader>,

    /// Codec decoder for converting encoded packets to PCM samples
    decoder: Box<dyn symphonia::core::codecs::Decoder>,

    /// Seeking strategy (Coarse when the byte length is known, Accurate otherwise)
    seek_mode: SeekMode,

    /// Reusable sample buffer to minimize allocations
    buffer: Option<SampleBuffer<SampleFormat>>,

    /// Current position in the sample buffer
    position: usize,

    /// Number of audio channels in the stream
    channels: u16,

    /// Sample rate of the audio stream in Hz
    sample_rate: u32,

    /// Total duration of the audio stream
    total_duration: Option<Duration>,

    /// Total number of samples in the stream
    total_samples: Option<usize>,

    /// Timestamp of the most recently demuxed packet, in the stream's time base
    last_ts: u64,

    /// Track id of the selected audio stream. Packets belonging to any other track (possible in
    /// a multi-track container such as isomp4) are released without being handed to the decoder
    /// or counted against the corrupted-packet retry budget.
    track_id: u32,

    /// Set once the stream has ended via an unrecoverable decode/demux error rather than a clean
    /// end of stream. Distinguishes a corrupted stream from a track that simply finished, since
    /// both end the sample iterator the same way.
    unrecoverable: bool,
}

/// Maximum number of consecutive corrupted packets to skip before giving up.
const MAX_RETRIES: usize = 3;

impl Decoder {
    /// Creates a new decoder by probing `file` for its container format.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * Format detection fails
    /// * No default track is found
    /// * Codec initialization fails
    pub fn new(file: AudioFile) -> Result<Self> {
        // Twice the buffer length to allow for Symphonia's read-ahead behavior,
        // and 64 kB minimum that Symphonia asserts for its ring buffer.
        let buffer_len = usize::max(64 * 1024, BUFFER_LEN * 2);
        let stream =
            MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions { buffer_len });

        // The stream's actual codec is unknown ahead of time, so probe all registered formats.
        let codecs = symphonia::default::get_codecs();
        let probe = symphonia::default::get_probe();

        // Coarse seeking without a known byte length causes a panic, and it isn't reliable
        // for variable bitrate streams anyway, so only use it when the length is known.
        let seek_mode = if stream.byte_len().is_some() {
            SeekMode::Coarse
        } else {
            SeekMode::Accurate
        };

        let demuxer = probe
            .format(
                &Hint::new(),
                stream,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )?
            .format;
        let default_track = demuxer
            .default_track()
            .ok_or_else(|| Error::not_found("default track not found"))?;
        let track_id = default_track.id;

        let codec_params = &default_track.codec_params;
        let decoder = codecs.make(codec_params, &DecoderOptions::default())?;

        // Update the codec parameters with the actual decoder parameters.
        // This may yield information not available before decoder initialization.
        let codec_params = decoder.codec_params();
        let total_duration = Self::calc_total_duration(codec_params);
        let channels = Self::calc_channels(codec_params).unwrap_or(2);
        let sample_rate = Self::calc_sample_rate(codec_params);
        let total_samples = Self::calc_total_samples(codec_params);

        Ok(Self {
            demuxer,
            decoder,
            seek_mode,

            buffer: None,
            position: 0,

            channels,
            sample_rate,
            total_duration,
            total_samples,
            last_ts: 0,
            track_id,
            unrecoverable: false,
        })
    }

    /// Returns the number of tracks the probed container holds.
    ///
    /// Callers that tee the raw byte stream to a save file use this to tell whether a byte-level
    /// copy is still faithful: it only is when the container holds exactly the one track being
    /// decoded.
    #[must_use]
    pub fn track_count(&self) -> usize {
        self.demuxer.tracks().len()
    }

    /// Returns `true` if the stream ended because of an unrecoverable decode or demux error,
    /// as opposed to a clean end of stream.
    ///
    /// Only meaningful once the decoder's sample iterator has been exhausted.
    #[must_use]
    pub fn ended_in_error(&self) -> bool {
        self.unrecoverable
    }

    /// Creates a normalized version of this decoder's output.
    ///
    /// Applies a feedforward limiter in the log domain to prevent clipping
    /// while maintaining perceived loudness. Works uniformly across all
    /// sample rates and channel configurations.
    ///
    /// # Arguments
    ///
    /// * `ratio` - Basic gain ratio to apply before limiting
    /// * `threshold` - Level in dB above which limiting begins
    /// * `knee_width` - Softening range around threshold in dB
    /// * `attack` - Time for limiter to respond to level increases
    /// * `release` - Time for limiter to recover after level decreases
    #[must_use]
    pub fn normalize(
        self,
        ratio: f32,
        threshold: f32,
        knee_width: f32,
        attack: Duration,
        release: Duration,
    ) -> Normalize<Self>
    where
        Self: Sized,
    {
        normalize::normalize(self, ratio, threshold, knee_width, attack, release)
    }

    /// Returns the track's `ReplayGain` value in dB, if available.
    ///
    /// Used as a fallback gain source when the caller supplies none of its own.
    pub fn replay_gain(&mut self) -> Option<f32> {
        self.demuxer.metadata().skip_to_latest().and_then(|metadata| {
            for tag in metadata.tags() {
                if tag
                    .std_key
                    .is_some_and(|key| key == StandardTagKey::ReplayGainTrackGain)
                {
                    if let Value::Float(gain) = tag.value {
                        return Some(gain.to_f32_lossy());
                    }
                }
            }
            None
        })
    }

    /// Returns the number of bits per sample used by the audio codec, if known.
    #[must_use]
    pub fn bits_per_sample(&self) -> Option<u32> {
        // Not cached because it is called infrequently.
        self.decoder.codec_params().bits_per_sample
    }

    /// Extracts channel count from codec parameters, converting to `u16`.
    ///
    /// # Panics
    ///
    /// Panics if the channel count exceeds the maximum value for `u16`.
    #[must_use]
    fn calc_channels(codec_params: &CodecParameters) -> Option<u16> {
        codec_params
            .channels
            .map(|channels| channels.count().try_into().expect("channel count overflow"))
    }

    /// Gets sample rate from codec parameters, defaulting to 44.1 kHz if unspecified.
    #[must_use]
    fn calc_sample_rate(codec_params: &CodecParameters) -> u32 {
        codec_params.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Calculates total samples in the stream from frame count and channel count.
    #[must_use]
    fn calc_total_samples(codec_params: &CodecParameters) -> Option<usize> {
        let n_frames = codec_params.n_frames?;
        let channels = codec_params.channels?.count();
        usize::try_from(n_frames)
            .ok()
            .and_then(|frames| frames.checked_mul(channels))
    }

    /// Extracts total duration from codec parameters if both time base and frame count are
    /// available.
    #[must_use]
    fn calc_total_duration(codec_params: &CodecParameters) -> Option<Duration> {
        if let (Some(time_base), Some(frames)) = (codec_params.time_base, codec_params.n_frames) {
            Some(time_base.calc_time(frames).into())
        } else {
            None
        }
    }

    /// Updates decoder specifications after a codec reset.
    fn reload_spec(&mut self) {
        let codec_params = self.decoder.codec_params();

        self.sample_rate = Self::calc_sample_rate(codec_params);
        self.total_samples = Self::calc_total_samples(codec_params);
        self.total_duration = Self::calc_total_duration(codec_params);

        if let Some(channels) = Self::calc_channels(codec_params) {
            self.channels = channels;
        }

        // Drop the buffer to force reinitialization with the new parameters.
        self.buffer = None;

        debug!(
            "decoder reloaded with sample rate: {} kHz; channels: {}",
            self.sample_rate, self.channels,
        );
    }

    /// Returns the presentation timestamp of the most recently decoded packet, if any, in the
    /// demuxer's time base.
    #[must_use]
    pub fn position(&mut self) -> Option<(u64, symphonia::core::units::TimeBase)> {
        let track = self.demuxer.default_track()?;
        Some((self.last_ts, track.codec_params.time_base?))
    }

    /// Gets the next decodable packet from the stream.
    ///
    /// Handles error recovery by:
    /// * Skipping corrupted packets (up to `MAX_RETRIES`)
    /// * Resetting decoder state when required
    /// * Clearing internal buffer on unrecoverable errors
    ///
    /// # Returns
    ///
    /// The duration of the decoded packet in codec timebase units.
    ///
    /// # Errors
    ///
    /// Returns error if too many consecutive packets are corrupted, an unrecoverable decoder
    /// error occurs, or end of stream is reached.
    fn get_next_packet(&mut self) -> Result<u64> {
        let mut discarded = 0;
        loop {
            if discarded > MAX_RETRIES {
                self.unrecoverable = true;
                break Err(Error::cancelled("discarded too many packets, giving up"));
            }
            if discarded > 0 {
                if let Some(buffer) = self.buffer.as_mut() {
                    // Internal buffer *must* be cleared if an error occurs.
                    buffer.clear();
                }
            }

            // Assume failure until a packet is successfully decoded.
            discarded = discarded.saturating_add(1);

            match self.demuxer.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != self.track_id {
                        // Not our selected stream: release without decoding, and without
                        // spending any of the corrupted-packet retry budget on it.
                        discarded = discarded.saturating_sub(1);
                        continue;
                    }

                    self.last_ts = packet.ts();

                    let decoded = match self.decoder.decode(&packet) {
                        Ok(decoded) => decoded,

                        // If a `DecodeError` or `IoError` is returned, the packet is
                        // undecodeable and should be discarded. Decoding may be continued
                        // with the next packet.
                        Err(SymphoniaError::DecodeError(e)) => {
                            warn!("discarding malformed packet: {e}");
                            continue;
                        }
                        Err(SymphoniaError::IoError(e)) => {
                            warn!("discarding unreadable packet: {e}");
                            continue;
                        }

                        // If `ResetRequired` is returned, consumers of the decoded audio data
                        // should expect the duration and `SignalSpec` of the decoded audio
                        // buffer to change.
                        Err(SymphoniaError::ResetRequired) => {
                            self.decoder.reset();
                            self.reload_spec();
                            continue;
                        }

                        // All other errors are unrecoverable.
                        Err(e) => {
                            self.unrecoverable = true;
                            break Err(e.into());
                        }
                    };

                    let buffer = match self.buffer.as_mut() {
                        Some(buffer) => buffer,
                        None => {
                            // Although packet sizes are not guaranteed to be constant, the buffer
                            // size is based on the decoded frame's capacity, so we can allocate
                            // once and reuse it for as long as the codec specifications remain
                            // the same.
                            self.buffer.insert(SampleBuffer::new(
                                decoded.capacity() as u64,
                                *decoded.spec(),
                            ))
                        }
                    };
                    buffer.copy_interleaved_ref(decoded);
                    self.position = 0;
                    break Ok(packet.dur());
                }

                // If `ResetRequired` is returned, then the track list must be re-examined and
                // all `Decoder`s re-created.
                Err(SymphoniaError::ResetRequired) => {
                    trace!("re-creating decoder");
                    let track = self
                        .demuxer
                        .default_track()
                        .ok_or_else(|| Error::not_found("default track not found"))?;
                    let codecs = symphonia::default::get_codecs();
                    self.decoder = codecs.make(&track.codec_params, &DecoderOptions::default())?;
                    self.track_id = track.id;
                    self.reload_spec();
                    continue;
                }

                // All other errors are unrecoverable. `UnexpectedEof` is the normal, clean end
                // of stream rather than a decode failure, so it alone is excluded.
                Err(e) => {
                    let e: Error = e.into();
                    if e.downcast::<io::Error>()
                        .is_none_or(|e| e.kind() != io::ErrorKind::UnexpectedEof)
                    {
                        self.unrecoverable = true;
                    }
                    break Err(e);
                }
            }
        }
    }
}

impl rodio::Source for Decoder {
    /// Returns the number of samples left in the current decoded frame.
    #[inline]
    fn current_frame_len(&self) -> Option<usize> {
        self.buffer.as_ref().map(SampleBuffer::len)
    }

    /// Returns the number of channels in the audio stream.
    #[inline]
    fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the sample rate of the audio stream in Hz.
    #[inline]
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the total duration of the audio stream, if known.
    #[inline]
    fn total_duration(&self) -> Option<Duration> {
        self.total_duration
    }

    /// Attempts to seek to the specified position in the audio stream.
    ///
    /// Also resets the decoder state to prevent audio glitches that could occur
    /// from seeking to a position that requires different decoding parameters.
    ///
    /// # Errors
    ///
    /// Returns error if seeking fails, the position is beyond the stream end, or the format
    /// doesn't support seeking.
    fn try_seek(&mut self, pos: Duration) -> std::result::Result<(), SeekError> {
        self.demuxer
            .seek(
                self.seek_mode,
                SeekTo::Time {
                    track_id: None, // implies the default or first track
                    time: pos.into(),
                },
            )
            .map_err(|e| SeekError::Other(Box::new(e)))?;

        // Seeking is a demuxer operation, so the decoder cannot reliably
        // know when a seek took place. Reset it to avoid audio glitches.
        self.decoder.reset();

        Ok(())
    }
}

impl Iterator for Decoder {
    type Item = SampleFormat;

    /// Provides the next audio sample.
    ///
    /// Returns `None` when the stream ends, an unrecoverable error occurs, or too many
    /// consecutive packets are corrupt.
    fn next(&mut self) -> Option<Self::Item> {
        // Fill the buffer if it's empty or we've reached its end.
        if self
            .buffer
            .as_ref()
            .is_none_or(|buffer| self.position >= buffer.len())
        {
            if let Err(e) = self.get_next_packet() {
                // Internal buffer *must* be cleared if an error occurs.
                self.buffer = None;

                // `UnexpectedEof` is not an error, just the end of the stream.
                if e.downcast::<io::Error>()
                    .is_none_or(|e| e.kind() != std::io::ErrorKind::UnexpectedEof)
                {
                    error!("{e}");
                }

                return None;
            }
        }

        let sample = *self
            .buffer
            .as_ref()
            .and_then(|buf| buf.samples().get(self.position))?;
        self.position = self.position.checked_add(1)?;

        Some(sample)
    }

    /// Provides size hints for the number of samples.
    ///
    /// The lower bound is always 0 because the decoder cannot reliably predict how many samples
    /// will be successfully decoded. The upper bound is known only when the container reports a
    /// frame count.
    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.total_samples)
    }
}
