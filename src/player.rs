//! Output Device and Play Loop: turns decoded samples into sound, under control of a
//! [`Session`](crate::session::Session).
//!
//! `get_device`/`enumerate_devices` parse a `"[<host>][|<device>][|<rate>][|<format>]"`
//! device-selector string and enumerate devices against a fixed sample-rate table: device
//! selection has no bearing on what's being played. Queueing, gapless crossfade, and a
//! logarithmic volume curve tied to a UI slider belong to a multi-track player and have no place
//! here; this is a single-song Play Loop: one decoder, one filter chain, one sink, driven until
//! the source runs out or a control thread signals it to stop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::Source;

use crate::{
    decoder::Decoder,
    error::{Error, Result},
    session::Session,
    volume::{self, GainControlled},
};

/// Common output sample rates, used to filter `enumerate_devices`'s listing down to
/// configurations a user is likely to actually want.
const SAMPLE_RATES: [u32; 8] = [
    44_100, 48_000, 88_200, 96_000, 176_400, 192_000, 352_800, 384_000,
];

/// Parses a device specification string and resolves it to a concrete device and output
/// configuration.
///
/// `device` has the form `"[<host>][|<device>][|<sample rate>][|<sample format>]"`
/// (case-insensitive); fields are optional left-to-right, each depending on the ones before it.
/// An empty string selects the platform default host, device, and configuration.
///
/// # Errors
///
/// Returns an error if the named host or device doesn't exist, the sample rate is invalid, or
/// no matching output configuration is available.
fn get_device(device: &str) -> Result<(rodio::Device, rodio::SupportedStreamConfig)> {
    let mut components = device.split('|');

    let host = match components.next() {
        Some("") | None => cpal::default_host(),
        Some(name) => {
            let host_ids = cpal::available_hosts();
            host_ids
                .into_iter()
                .find_map(|host_id| {
                    let host = cpal::host_from_id(host_id).ok()?;
                    if host.id().name().eq_ignore_ascii_case(name) {
                        Some(host)
                    } else {
                        None
                    }
                })
                .ok_or_else(|| Error::not_found(format!("audio host {name} not found")))?
        }
    };

    let output_device = match components.next() {
        Some("") | None => host.default_output_device().ok_or_else(|| {
            Error::not_found(format!(
                "default audio output device not found on {}",
                host.id().name()
            ))
        })?,
        Some(name) => {
            let mut devices = host.output_devices()?;
            devices
                .find(|device| device.name().is_ok_and(|n| n.eq_ignore_ascii_case(name)))
                .ok_or_else(|| {
                    Error::not_found(format!(
                        "audio output device {name} not found on {}",
                        host.id().name()
                    ))
                })?
        }
    };

    let config = match components.next() {
        Some("") | None => output_device.default_output_config().map_err(|e| {
            Error::unavailable(format!("default output configuration unavailable: {e}"))
        })?,
        Some(rate) => {
            let rate = rate
                .parse()
                .map_err(|_| Error::invalid_argument(format!("invalid sample rate {rate}")))?;
            let rate = cpal::SampleRate(rate);

            let format = match components.next() {
                Some("") | None => None,
                other => other,
            };

            output_device
                .supported_output_configs()?
                .find_map(|config| {
                    if format.is_none_or(|format| {
                        config
                            .sample_format()
                            .to_string()
                            .eq_ignore_ascii_case(format)
                    }) {
                        config.try_with_sample_rate(rate)
                    } else {
                        None
                    }
                })
                .ok_or_else(|| {
                    Error::unavailable(format!(
                        "audio output device {} does not support sample rate {} with {} sample format",
                        output_device.name().as_deref().unwrap_or("UNKNOWN"),
                        rate.0,
                        format.unwrap_or("default")
                    ))
                })?
        }
    };

    info!(
        "audio output device: {} on {}",
        output_device.name().as_deref().unwrap_or("UNKNOWN"),
        host.id().name()
    );
    #[expect(clippy::cast_precision_loss)]
    let sample_rate = config.sample_rate().0 as f32 / 1000.0;
    info!(
        "audio output configuration: {sample_rate:.1} kHz in {}",
        config.sample_format()
    );

    Ok((output_device, config))
}

/// Opens the audio output device named by `device` and returns a stream handle (which must be
/// kept alive for the duration of playback) together with a paused [`rodio::Sink`].
///
/// # Errors
///
/// Returns an error (always hard-fail) if the device cannot be resolved or
/// opened, or the output stream/sink cannot be created.
pub fn open_device(device: &str) -> Result<(rodio::OutputStream, rodio::Sink)> {
    let (output_device, config) = get_device(device)?;
    let (stream, handle) = rodio::OutputStream::try_from_device_config(&output_device, config)?;
    let sink = rodio::Sink::try_new(&handle)?;
    Ok((stream, sink))
}

/// Lists available audio output devices as `"<host>|<device>|<rate>|<format>"` specification
/// strings, restricted to the common sample rates in [`SAMPLE_RATES`]. The platform default is
/// suffixed with `" (default)"`.
#[must_use]
pub fn enumerate_devices() -> Vec<String> {
    let hosts = cpal::available_hosts();
    let mut result = HashSet::new();

    let default_host = cpal::default_host();
    let default_device = default_host.default_output_device();
    let default_config = default_device
        .as_ref()
        .and_then(|device| device.default_output_config().ok());

    for host in hosts
        .into_iter()
        .filter_map(|id| cpal::host_from_id(id).ok())
    {
        let Ok(devices) = host.output_devices() else {
            continue;
        };
        for device in devices {
            let Ok(configs) = device.supported_output_configs() else {
                continue;
            };
            let Ok(device_name) = device.name() else {
                continue;
            };
            for config in configs {
                for sample_rate in &SAMPLE_RATES {
                    let Some(config) = config.clone().try_with_sample_rate(cpal::SampleRate(*sample_rate)) else {
                        continue;
                    };

                    let mut line = format!(
                        "{}|{}|{}|{}",
                        host.id().name(),
                        device_name,
                        config.sample_rate().0,
                        config.sample_format(),
                    );

                    if default_host.id() == host.id()
                        && default_device
                            .as_ref()
                            .is_some_and(|d| d.name().is_ok_and(|n| n == device_name))
                        && default_config.as_ref().is_some_and(|dc| *dc == config)
                    {
                        line.push_str(" (default)");
                    }

                    result.insert(line);
                }
            }
        }
    }

    let mut result: Vec<String> = result.into_iter().collect();
    result.sort();
    result
}

/// Outcome of a single Play Loop run, distinguishing a clean finish or deliberate user
/// interrupt (both of which end the session successfully) from mid-stream corruption that
/// should be retried.
pub enum PlayResult {
    /// The source was exhausted normally.
    Completed,
    /// The user requested skip or quit partway through.
    UserInterrupted,
    /// The decoder could not keep decoding (its error-recovery budget was exhausted) and the
    /// attempt should be retried from the last known position.
    Corrupted,
}

/// A [`Decoder`] wrapped so every sample pull also runs the Play Loop's per-packet checkpoint:
/// check for quit/skip, record the new demuxer position, and block while paused. Not generic
/// over `Source`, since it needs [`Decoder::position`], which isn't part of that trait.
///
/// `interrupted` is shared with the caller of [`play`] rather than kept as a plain field: by the
/// time the source is exhausted, the caller has already handed it off to `rodio::Sink` and lost
/// direct access to this struct, but it still needs to know whether the source ran out because
/// the user interrupted it (skip or quit — both count as a clean stop, never a retry) or because
/// the stream actually ended, cleanly or corrupted.
struct Monitored<'a> {
    inner: Decoder,
    session: &'a Session,
    last_position: Option<u64>,
    interrupted: Arc<AtomicBool>,
    ended_in_error: Arc<AtomicBool>,
}

impl<'a> Monitored<'a> {
    fn new(
        inner: Decoder,
        session: &'a Session,
        interrupted: Arc<AtomicBool>,
        ended_in_error: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner,
            session,
            last_position: None,
            interrupted,
            ended_in_error,
        }
    }
}

impl Iterator for Monitored<'_> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.interrupted.load(Ordering::Relaxed) || self.session.is_quitting() {
            return None;
        }
        if matches!(
            self.session.check_interrupt(),
            crate::session::Interrupt::SkipOnce | crate::session::Interrupt::Quit
        ) {
            self.interrupted.store(true, Ordering::Relaxed);
            return None;
        }

        self.session.wait_while_paused();
        if self.session.is_quitting() {
            self.interrupted.store(true, Ordering::Relaxed);
            return None;
        }

        let Some(sample) = self.inner.next() else {
            if self.inner.ended_in_error() {
                self.ended_in_error.store(true, Ordering::Relaxed);
            }
            return None;
        };

        if let Some((ts, time_base)) = self.inner.position() {
            if self.last_position != Some(ts) {
                self.last_position = Some(ts);
                let played = time_base.calc_time(ts);
                let millis = (played.seconds as f64 * 1000.0 + played.frac * 1000.0) as u64;
                self.session.record_packet(Duration::from_millis(millis));
            }
        }

        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl Source for Monitored<'_> {
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> std::result::Result<(), rodio::source::SeekError> {
        self.inner.try_seek(pos)
    }
}

/// Runs the Play Loop: builds the filter chain (`Decoder -> Monitored -> gain -> limiter`),
/// hands it to `sink`, and blocks until the source is exhausted or the session is interrupted.
///
/// Gain is applied before the limiter so the limiter catches post-gain peaks, per the ordering
/// note in DESIGN.md; output format negotiation is handled implicitly by `rodio`/`cpal` when
/// the sink's device configuration was resolved in [`open_device`].
pub fn play(session: &Session, sink: &rodio::Sink, decoder: Decoder) -> PlayResult {
    let interrupted = Arc::new(AtomicBool::new(false));
    let ended_in_error = Arc::new(AtomicBool::new(false));
    let monitored = Monitored::new(
        decoder,
        session,
        Arc::clone(&interrupted),
        Arc::clone(&ended_in_error),
    );
    let gained = volume::gain_controlled(monitored, session.gain());
    let limited = crate::normalize::normalize(
        gained,
        1.0,
        -6.0,
        12.0,
        Duration::from_millis(5),
        Duration::from_millis(100),
    );

    sink.append(limited);
    sink.play();
    sink.sleep_until_end();

    if interrupted.load(Ordering::Relaxed) {
        // The user skipped or quit partway through: a deliberate stop, not a retry signal,
        // regardless of how far short of the reported duration playback got.
        PlayResult::UserInterrupted
    } else if ended_in_error.load(Ordering::Relaxed) {
        // The decoder itself reported it gave up (reset/decode error budget exhausted, or an
        // unrecoverable demux error), as opposed to a clean end of stream. Unknown-duration
        // streams still reach this branch correctly, since it doesn't depend on
        // `song_duration()` at all.
        PlayResult::Corrupted
    } else {
        PlayResult::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_devices_does_not_panic() {
        let _ = enumerate_devices();
    }

    #[test]
    fn rejects_unknown_host() {
        let err = get_device("not-a-real-host").unwrap_err();
        assert!(err.to_string().contains("not-a-real-host"));
    }
}
