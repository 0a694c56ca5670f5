//! Command-line entry point: plays one audio stream, start to finish.
//!
//! # Runtime behavior
//!
//! 1. Parses [`Config`] from the command line/environment.
//! 2. Initializes logging.
//! 3. Builds a [`Session`] and spawns its worker thread.
//! 4. Bridges OS signals (Ctrl-C, SIGTERM, SIGHUP) to [`Session::request_quit`], while the
//!    worker is running, and waits for it to finish so resources are released cleanly.
//! 5. Retries the whole session with exponential backoff on [`PlaybackOutcome::SoftFail`] — the
//!    core itself enforces no retry limit, so this wrapper picks one; a [`PlaybackOutcome::HardFail`]
//!    is never retried.

use std::process;
use std::time::Duration;

use exponential_backoff::Backoff;
use log::{error, info, warn, LevelFilter};

use monoplay::{
    config::Config,
    error::{Error, Result},
    outcome::PlaybackOutcome,
    player,
    session::{Session, SongInfo},
    signal::Handler,
};

/// Number of whole-session retry attempts before giving up on a soft-fail.
const BACKOFF_ATTEMPTS: u32 = 10;

/// Minimum duration to wait between session retry attempts.
const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Maximum duration to wait between session retry attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

fn init_logger(level: LevelFilter) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    logger.filter_module(module_path!(), level);
    logger.filter_module("monoplay", level);

    let external_level = if level == LevelFilter::Trace {
        LevelFilter::max()
    } else {
        LevelFilter::Error
    };
    for external_module in [
        "symphonia",
        "symphonia_bundle_flac",
        "symphonia_bundle_mp3",
        "symphonia_codec_aac",
        "symphonia_codec_pcm",
        "symphonia_core",
        "symphonia_format_isomp4",
        "symphonia_format_riff",
        "symphonia_metadata",
        "symphonia_utils_xiph",
    ] {
        logger.filter_module(external_module, external_level);
    }

    logger.init();
}

/// Spawns one session's worker, forwards the first shutdown signal it sees to
/// [`Session::request_quit`], and waits for the worker to finish either way so every owned
/// resource (decoder, output stream, tee file) is released before returning.
async fn run_once(
    config: &Config,
    client: reqwest::Client,
    signals: &mut Handler,
) -> Result<PlaybackOutcome> {
    let song = SongInfo {
        url: config.url.clone(),
        artist: config.artist.clone(),
        album: config.album.clone(),
        title: config.title.clone(),
        album_art_url: None,
    };

    let session = Session::new(
        song,
        config.save_dir.clone(),
        config.device.clone(),
        config.volume_db,
        config.gain_db,
        config.gain_mul,
    );

    let handle = session.spawn(client, tokio::runtime::Handle::current());
    let mut joined = tokio::task::spawn_blocking(move || handle.join());

    let result = tokio::select! {
        biased;

        signal = signals.recv() => {
            info!("received {signal}, stopping playback");
            session.request_quit();
            (&mut joined).await
        }

        result = &mut joined => result,
    };

    let outcome = result.map_err(Error::internal)?;
    outcome.map_err(|_| Error::internal("playback worker panicked".to_string()))
}

/// Drives `run_once` through the session-level retry loop.
///
/// A `--device "?"` prints the available output devices and returns without playing anything,
/// matching the device-spec string's own `"[<host>][|<device>][|<rate>][|<format>]"` idiom
/// rather than adding a separate flag.
async fn run(config: &Config, client: reqwest::Client) -> Result<PlaybackOutcome> {
    if config.device == "?" {
        let devices = player::enumerate_devices();
        if devices.is_empty() {
            warn!("no output devices found");
        } else {
            info!("available audio output devices:");
            for device in devices {
                info!("- {device}");
            }
        }
        return Ok(PlaybackOutcome::Ok);
    }

    let mut signals = Handler::new()?;

    for (attempt, backoff) in Backoff::new(BACKOFF_ATTEMPTS, MIN_BACKOFF, MAX_BACKOFF)
        .into_iter()
        .enumerate()
    {
        match run_once(config, client.clone(), &mut signals).await? {
            PlaybackOutcome::SoftFail => match backoff {
                Some(duration) => {
                    warn!(
                        "soft-fail; retrying in {duration:?} ({}/{BACKOFF_ATTEMPTS})",
                        attempt + 1
                    );
                    tokio::time::sleep(duration).await;
                }
                None => return Ok(PlaybackOutcome::SoftFail),
            },
            other => return Ok(other),
        }
    }
    Ok(PlaybackOutcome::SoftFail)
}

#[tokio::main]
async fn main() {
    let config = match Config::parse() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    init_logger(config.logging.level_filter());

    let mut version = env!("CARGO_PKG_VERSION").to_string();
    if let Some(hash) = option_env!("MONOPLAY_COMMIT_HASH") {
        version.push_str(&format!(".{hash}"));
    }
    if let Some(date) = option_env!("MONOPLAY_COMMIT_DATE") {
        version.push_str(&format!(" ({date})"));
    }
    info!("starting monoplay/{version}; playing {}", config.url);

    let client = reqwest::Client::new();

    match run(&config, client).await {
        Ok(PlaybackOutcome::Ok) => process::exit(0),
        Ok(PlaybackOutcome::SoftFail) => {
            error!("giving up after {BACKOFF_ATTEMPTS} attempts");
            process::exit(1);
        }
        Ok(PlaybackOutcome::HardFail) => process::exit(1),
        Err(e) => {
            error!("playback failed: {e}");
            process::exit(1);
        }
    }
}
