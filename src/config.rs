//! Configuration and CLI surface.
//!
//! This module defines the single typed [`Config`] struct the binary parses its arguments
//! into: a `clap::Parser` struct where every field also falls back to a `PLAYER_*`-prefixed
//! environment variable, so the same binary can be driven from a shell one-liner or from a
//! process supervisor's environment block.
//!
//! No credentials and no catalog-specific fields live here — this crate plays exactly one
//! stream per invocation and knows nothing about where a URL or its metadata came from.

use std::path::PathBuf;

use clap::Parser;

/// Complete configuration for a single playback run.
///
/// Every field can be set from the command line or from its `PLAYER_*` environment variable;
/// the command line takes precedence when both are present, per `clap`'s normal resolution
/// order.
#[derive(Parser, Clone, Debug)]
#[command(name = "monoplay", version, about = "Play one audio stream, start to finish")]
pub struct Config {
    /// URL of the audio stream to play.
    #[arg(env = "PLAYER_URL")]
    pub url: url::Url,

    /// Artist tag, used only for the save path when `--save-dir` is set.
    #[arg(long, env = "PLAYER_ARTIST", default_value = "")]
    pub artist: String,

    /// Album tag, used only for the save path when `--save-dir` is set.
    #[arg(long, env = "PLAYER_ALBUM", default_value = "")]
    pub album: String,

    /// Title tag, used for the save path and log messages.
    #[arg(long, env = "PLAYER_TITLE", default_value = "")]
    pub title: String,

    /// Directory to save a transcoded copy of the stream under, once playback completes.
    ///
    /// If unset, no tee file is written at all.
    #[arg(long, env = "PLAYER_SAVE_DIR")]
    pub save_dir: Option<PathBuf>,

    /// Base output volume, in decibels relative to unity gain.
    #[arg(long, env = "PLAYER_VOLUME_DB", default_value_t = 0.0)]
    pub volume_db: f32,

    /// Per-song gain adjustment, in decibels (e.g. replay-gain track gain).
    #[arg(long, env = "PLAYER_GAIN_DB", default_value_t = 0.0)]
    pub gain_db: f32,

    /// Multiplier applied to `gain_db` before it's added to `volume_db`.
    #[arg(long, env = "PLAYER_GAIN_MUL", default_value_t = 1.0)]
    pub gain_mul: f32,

    /// Audio output device, in `"[<host>][|<device>][|<sample rate>][|<sample format>]"` form.
    ///
    /// An empty string selects the platform default.
    #[arg(long, env = "PLAYER_DEVICE", default_value = "")]
    pub device: String,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

/// Logging verbosity flags, mutually exclusive in direction: a repeatable `-q`/`-v` pair.
#[derive(clap::Args, Clone, Debug)]
#[command(group(clap::ArgGroup::new("verbosity").args(["quiet", "verbose"])))]
pub struct LoggingArgs {
    /// Decrease log verbosity. Repeat for less output (e.g. `-qq`).
    #[arg(short, long, action = clap::ArgAction::Count, env = "PLAYER_QUIET")]
    pub quiet: u8,

    /// Increase log verbosity. Repeat for more output (e.g. `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count, env = "PLAYER_VERBOSE")]
    pub verbose: u8,
}

impl LoggingArgs {
    /// Resolves the configured verbosity into a base log level, starting from `info` and
    /// stepping one level per `-q`/`-v`.
    #[must_use]
    pub fn level_filter(&self) -> log::LevelFilter {
        const LEVELS: [log::LevelFilter; 6] = [
            log::LevelFilter::Off,
            log::LevelFilter::Error,
            log::LevelFilter::Warn,
            log::LevelFilter::Info,
            log::LevelFilter::Debug,
            log::LevelFilter::Trace,
        ];
        let base = 3_i32; // Info
        let shift = i32::from(self.verbose) - i32::from(self.quiet);
        let index = (base + shift).clamp(0, LEVELS.len() as i32 - 1);
        #[expect(clippy::cast_sign_loss)]
        LEVELS[index as usize]
    }
}

impl Config {
    /// Parses configuration from command-line arguments and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `clap` fails to parse the arguments (e.g. a missing required field,
    /// or an invalid URL).
    pub fn parse() -> crate::error::Result<Self> {
        <Self as Parser>::try_parse()
            .map_err(|e| crate::error::Error::invalid_argument(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_verbosity_is_info() {
        let logging = LoggingArgs {
            quiet: 0,
            verbose: 0,
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn verbose_raises_level() {
        let logging = LoggingArgs {
            quiet: 0,
            verbose: 2,
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Trace);
    }

    #[test]
    fn quiet_lowers_level() {
        let logging = LoggingArgs {
            quiet: 3,
            verbose: 0,
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Off);
    }
}
