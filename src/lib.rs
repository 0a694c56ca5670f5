//! Single-song streaming audio player core.
//!
//! Given a network URL for one encoded audio stream, this crate opens the stream, decodes it
//! into raw samples, applies a volume/format filter chain, and writes the result to an audio
//! output device in real time — optionally teeing the un-decoded compressed packets to a
//! temporary file for later use. Playback cooperates with external control (pause/resume,
//! skip, quit, volume change) while in flight, and survives transient stream errors by
//! retrying from the last known timestamp.
//!
//! # Architecture
//!
//! The library is organized around the pipeline stages and the session that drives them:
//!
//! * **Opening a stream**
//!   - [`opener`]: turns a URL into an opened, probed [`decoder::Decoder`]
//!   - [`audio_file`]: buffered, optionally-teed `Read + Seek` adapter over the network stream
//!   - [`decoder`]: demuxes and decodes with Symphonia, recovering from corrupt packets
//!
//! * **Playback**
//!   - [`player`]: opens the output device and runs the Play Loop (decode → gain → limiter → sink)
//!   - [`volume`]: lock-free gain control, updatable concurrently with playback
//!   - [`normalize`]: feedforward limiter protecting the output from clipping
//!
//! * **Session and control**
//!   - [`session`]: the shared playback session, its pause gate, and the worker thread
//!   - [`outcome`]: classifies a finished attempt as clean, soft-fail, or hard-fail
//!   - [`signal`]: OS signal handling, bridged to the session's quit request
//!
//! * **Saving a compressed copy**
//!   - [`tee`]: duplicates the compressed stream to a temp file as it is read
//!   - [`sanitize`]: turns tag strings into filesystem-safe path components
//!
//! * **Configuration and errors**
//!   - [`config`]: command-line/environment configuration for the CLI binary
//!   - [`error`]: unified error type and conversions from every dependency's error type
//!   - [`util`]: small numeric/conversion helpers shared across modules
//!
//! # Example
//!
//! ```rust,no_run
//! use monoplay::{
//!     config::Config,
//!     session::{Session, SongInfo},
//! };
//!
//! # async fn example() -> monoplay::error::Result<()> {
//! let config = Config::parse()?;
//! let song = SongInfo {
//!     url: config.url.clone(),
//!     artist: config.artist.clone(),
//!     album: config.album.clone(),
//!     title: config.title.clone(),
//!     album_art_url: None,
//! };
//!
//! let session = Session::new(
//!     song,
//!     config.save_dir.clone(),
//!     config.device.clone(),
//!     config.volume_db,
//!     config.gain_db,
//!     config.gain_mul,
//! );
//!
//! let client = reqwest::Client::new();
//! let handle = session.spawn(client, tokio::runtime::Handle::current());
//! let outcome = handle.join();
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Errors are handled through the types in the [`error`] module, with most functions returning
//! [`Result`](error::Result).
//!
//! # Concurrency
//!
//! One dedicated worker thread drives playback synchronously per [`session::Session`]; a
//! separate control thread (or async task) mutates a handful of atomic fields and a pause
//! condition variable to steer it. See [`session`] for the full concurrency contract.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod audio_file;
pub mod config;
pub mod decoder;
pub mod error;
pub mod normalize;
pub mod opener;
pub mod outcome;
pub mod player;
pub mod sanitize;
pub mod session;
pub mod signal;
pub mod tee;
pub mod util;
pub mod volume;
