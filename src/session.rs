//! Player Session: the unit of work for one playback attempt, and the worker that drives it.
//!
//! Applies the session-as-shared-state idiom to a single-song playback session: immutable song
//! metadata plus a handful of fields two threads touch concurrently. Every shared field that
//! isn't the pause gate is a plain atomic — no invariant spans two of them, so no lock is needed
//! outside the pause protocol.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use url::Url;

use crate::{
    opener::{self, TeeTarget},
    outcome::PlaybackOutcome,
    player, sanitize,
    tee::{self, TeeStatus},
    volume::Gain,
};

/// Playback mode. Transitions are one-way within a session
/// (`Waiting -> Playing -> Waiting -> Finished`), with at most one
/// `Playing <-> Waiting` oscillation per soft-fail retry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Mode {
    Waiting = 0,
    Playing = 1,
    Finished = 2,
}

impl Mode {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Playing,
            2 => Self::Finished,
            _ => Self::Waiting,
        }
    }
}

/// Result of reading the interrupt counter. Modeled as a tagged variant rather than a raw
/// integer, since the three states mean different things to the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interrupt {
    /// No interrupt pending; keep blocking.
    None,
    /// Abort the current blocking call and retry with the same session (used for "skip song").
    SkipOnce,
    /// Abort and quit: no retry, no trailer, no post-playback hook.
    Quit,
}

/// Song metadata and per-session settings fixed by the caller before the worker thread starts.
/// Immutable for the session's lifetime.
#[derive(Clone, Debug)]
pub struct SongInfo {
    pub url: Url,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub album_art_url: Option<Url>,
}

/// Shared, concurrently-accessed playback session state.
///
/// One dedicated worker thread drives [`Session::run`]; a separate control thread (or task)
/// mutates the flags below through the public setters.
pub struct Session {
    /// Immutable for the session's lifetime.
    pub song: SongInfo,
    pub save_dir: Option<PathBuf>,
    pub device: String,

    base_volume_db: AtomicU32,
    gain_db: AtomicU32,
    gain_mul: AtomicU32,
    gain: Gain,

    mode: AtomicU8,
    do_pause: AtomicBool,
    do_quit: AtomicBool,
    interrupted: AtomicU8,

    last_timestamp: AtomicU64,
    song_played: AtomicU64,
    song_duration: AtomicU64,

    pause_gate: (Mutex<bool>, Condvar),
}

impl Session {
    /// Creates a new session, at `Waiting` mode, unity gain, with no interrupt pending.
    #[must_use]
    pub fn new(
        song: SongInfo,
        save_dir: Option<PathBuf>,
        device: String,
        base_volume_db: f32,
        gain_db: f32,
        gain_mul: f32,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            song,
            save_dir,
            device,
            base_volume_db: AtomicU32::new(base_volume_db.to_bits()),
            gain_db: AtomicU32::new(gain_db.to_bits()),
            gain_mul: AtomicU32::new(gain_mul.to_bits()),
            gain: Gain::unity(),
            mode: AtomicU8::new(Mode::Waiting as u8),
            do_pause: AtomicBool::new(false),
            do_quit: AtomicBool::new(false),
            interrupted: AtomicU8::new(0),
            last_timestamp: AtomicU64::new(0),
            song_played: AtomicU64::new(0),
            song_duration: AtomicU64::new(0),
            pause_gate: (Mutex::new(false), Condvar::new()),
        });
        session.apply_volume();
        session
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    /// Playback position, surfaced to the UI.
    #[must_use]
    pub fn song_played(&self) -> Duration {
        Duration::from_millis(self.song_played.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn song_duration(&self) -> Duration {
        Duration::from_millis(self.song_duration.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn last_timestamp(&self) -> Duration {
        Duration::from_millis(self.last_timestamp.load(Ordering::Relaxed))
    }

    fn set_song_duration(&self, d: Duration) {
        self.song_duration
            .store(u64::try_from(d.as_millis()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Records a demuxed packet's position, checkpointed once per packet by the Play Loop.
    /// `last_timestamp` and `song_played` are kept in the same units (milliseconds) here,
    /// since the seek API (`Decoder::try_seek`) takes a `Duration` rather than a raw
    /// stream-timebase tick; see DESIGN.md for this simplification.
    pub(crate) fn record_packet(&self, played: Duration) {
        let millis = u64::try_from(played.as_millis()).unwrap_or(u64::MAX);
        self.last_timestamp.store(millis, Ordering::Relaxed);
        self.song_played.store(millis, Ordering::Relaxed);
    }

    /// Sets `do_pause` and wakes the worker's pause gate protocol. Called from the
    /// control thread.
    pub fn request_pause(&self, pause: bool) {
        let (lock, cvar) = &self.pause_gate;
        {
            let mut guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = pause;
        }
        self.do_pause.store(pause, Ordering::Relaxed);
        cvar.notify_all();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.do_pause.load(Ordering::Relaxed)
    }

    /// "Skip song": abort the current blocking call, retry with the same session
    pub fn request_skip(&self) {
        self.interrupted.store(1, Ordering::Relaxed);
    }

    /// "Quit application": abort the current blocking call and never retry
    pub fn request_quit(&self) {
        self.interrupted.store(2, Ordering::Relaxed);
        self.do_quit.store(true, Ordering::Relaxed);
        // Wake a paused worker so it observes `do_quit` without waiting for a resume.
        self.request_pause(false);
    }

    #[must_use]
    pub fn is_quitting(&self) -> bool {
        self.do_quit.load(Ordering::Relaxed)
    }

    /// Reads and, for `SkipOnce`, clears the interrupt counter. Installed as the media
    /// adapter's blocking-abort hook: every suspension point in the worker polls
    /// this between chunks of work.
    #[must_use]
    pub fn check_interrupt(&self) -> Interrupt {
        match self.interrupted.load(Ordering::Relaxed) {
            0 => Interrupt::None,
            1 => {
                self.interrupted.store(0, Ordering::Relaxed);
                Interrupt::SkipOnce
            }
            _ => {
                self.do_quit.store(true, Ordering::Relaxed);
                Interrupt::Quit
            }
        }
    }

    /// Blocks the calling thread while `do_pause` is set. Spurious-wake-safe: the predicate is
    /// re-checked on every wake. A concurrent `request_quit` also wakes this.
    pub(crate) fn wait_while_paused(&self) {
        if !self.do_pause.load(Ordering::Relaxed) {
            return;
        }
        let (lock, cvar) = &self.pause_gate;
        let guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _guard = cvar
            .wait_while(guard, |paused| *paused && !self.do_quit.load(Ordering::Relaxed))
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }

    /// Sets the base volume, in dB, and recomputes the combined gain.
    pub fn set_volume_db(&self, db: f32) {
        self.base_volume_db.store(db.to_bits(), Ordering::Relaxed);
        self.apply_volume();
    }

    /// Sets the per-song gain and gain multiplier, and recomputes the combined gain.
    pub fn set_gain(&self, gain_db: f32, gain_mul: f32) {
        self.gain_db.store(gain_db.to_bits(), Ordering::Relaxed);
        self.gain_mul.store(gain_mul.to_bits(), Ordering::Relaxed);
        self.apply_volume();
    }

    /// Computes `base_volume_dB + gain_dB * gain_mul` and writes it to the filter chain's gain
    /// control. Callable from any thread at any time; it is a no-op outside `Playing` in
    /// effect, since the gain is only ever read by a Play Loop that exists while `Playing`.
    fn apply_volume(&self) {
        let base = f32::from_bits(self.base_volume_db.load(Ordering::Relaxed));
        let gain_db = f32::from_bits(self.gain_db.load(Ordering::Relaxed));
        let gain_mul = f32::from_bits(self.gain_mul.load(Ordering::Relaxed));
        self.gain.set_db(base + gain_db * gain_mul);
    }

    pub(crate) fn gain(&self) -> Gain {
        self.gain.clone()
    }

    /// Spawns the dedicated worker thread that drives playback (with soft-fail retries) to
    /// completion. Returns a handle the caller can join for the final [`PlaybackOutcome`].
    pub fn spawn(
        self: &Arc<Self>,
        client: reqwest::Client,
        runtime: tokio::runtime::Handle,
    ) -> std::thread::JoinHandle<PlaybackOutcome> {
        let session = Arc::clone(self);
        std::thread::Builder::new()
            .name("monoplay-worker".into())
            .spawn(move || runtime.block_on(session.run(client)))
            .expect("failed to spawn playback worker thread")
    }

    /// The worker's retry loop's pseudocode:
    ///
    /// ```text
    /// loop:
    ///    if open_stream:
    ///       if open_filter and open_device:
    ///          mode = PLAYING; apply volume
    ///          retry = (play() == INVALIDDATA) and not user_interrupted
    ///       else:
    ///          result = HARDFAIL
    ///    else:
    ///       result = SOFTFAIL
    ///    mode = WAITING; finish()
    /// until not retry
    /// mode = FINISHED
    /// ```
    ///
    /// In Rust, `finish()` is not a function: every owned resource (decoder, output stream,
    /// sink) is released by its `Drop` impl when the attempt's scope exits, on every path,
    /// including error returns — see the "Packet/frame ownership" note.
    async fn run(self: Arc<Self>, client: reqwest::Client) -> PlaybackOutcome {
        let mut save_file = self.prepare_save().is_some();
        let outcome = loop {
            if self.is_quitting() {
                break PlaybackOutcome::Ok;
            }

            let tee = if save_file {
                self.prepare_save()
            } else {
                None
            };
            if save_file && tee.is_none() {
                save_file = false;
            }

            let resume_from = self.last_timestamp();
            let resume_from = if resume_from > Duration::ZERO {
                Some(resume_from)
            } else {
                None
            };

            let attempt = self.attempt(&client, tee, resume_from).await;
            self.set_mode(Mode::Waiting);

            match attempt {
                Attempt::Retry => continue,
                Attempt::Done(outcome) => break outcome,
            }
        };

        if matches!(outcome, PlaybackOutcome::Ok) && save_file && !self.is_quitting() {
            // Post-playback hook: the tee was already finalized inside `attempt` on a clean
            // finish. What's left here, out of core scope, is invoking an external transcode
            // from the finalized container to the caller's target format.
            info!("save complete for {}", self.song.title);
        }

        self.set_mode(Mode::Finished);
        info!("worker finished: {outcome:?}");
        outcome
    }

    /// One open/play attempt. Soft-fail opener/decoder errors and a mid-stream
    /// `INVALIDDATA`-equivalent (without user interrupt) both request a retry with
    /// `last_timestamp` preserved.
    async fn attempt(
        &self,
        client: &reqwest::Client,
        tee: Option<TeeTarget>,
        resume_from: Option<Duration>,
    ) -> Attempt {
        // `tee` is moved into `opener::open` below (it ends up owned by the decoder, via
        // `AudioFile`/`Tee`, and is unreachable once playback starts), so the paths and status
        // handle needed to finalize it afterward are captured here first.
        let finalize_target = tee
            .as_ref()
            .map(|t| (t.temp_path.clone(), t.final_path.clone(), Arc::clone(&t.status)));

        let decoder = match opener::open(client, &self.song.url, tee, resume_from).await {
            Ok(decoder) => decoder,
            Err(e) => {
                error!("failed to open stream: {e}");
                return Attempt::Done(PlaybackOutcome::SoftFail);
            }
        };
        self.set_song_duration(decoder.total_duration().unwrap_or(Duration::ZERO));

        let (_stream, sink) = match player::open_device(&self.device) {
            Ok(opened) => opened,
            Err(e) => {
                error!("failed to open audio output device: {e}");
                return Attempt::Done(PlaybackOutcome::HardFail);
            }
        };

        self.set_mode(Mode::Playing);
        self.apply_volume();

        match player::play(self, &sink, decoder) {
            player::PlayResult::Completed => {
                // Trailer-equivalent: finalize the tee only on a clean finish without `do_quit`.
                // A user skip that happened to land exactly at EOF also counts as `Completed`
                // here, which is fine — nothing left to retry either way.
                if let Some((temp_path, final_path, status)) = finalize_target {
                    if !self.is_quitting() {
                        match tee::finalize(&temp_path, &final_path, &status) {
                            Ok(true) => info!("saved compressed copy to {}", final_path.display()),
                            Ok(false) => {}
                            Err(e) => warn!("failed to finalize saved copy: {e}"),
                        }
                    }
                }
                Attempt::Done(PlaybackOutcome::Ok)
            }
            player::PlayResult::UserInterrupted => Attempt::Done(PlaybackOutcome::Ok),
            player::PlayResult::Corrupted => {
                warn!("stream self-corrupted, retrying from {:?}", self.last_timestamp());
                Attempt::Retry
            }
        }
    }

    /// Computes the tee target for this attempt, if saving is configured and the
    /// final file doesn't already exist. Best-effort: any failure disables saving for the rest
    /// of the session, and playback continues regardless.
    fn prepare_save(&self) -> Option<TeeTarget> {
        let save_dir = self.save_dir.as_ref()?;

        let dir = sanitize::save_dir(save_dir, &self.song.artist, &self.song.album);
        let final_path = sanitize::save_path(&dir, &self.song.title, "mp3");
        if final_path.exists() {
            return None;
        }

        let temp_dir = std::env::temp_dir().join("monoplay");
        let temp_path = sanitize::save_path(&temp_dir, &self.song.title, "aac");

        Some(TeeTarget {
            temp_path,
            final_path,
            status: Arc::new(TeeStatus::new()),
        })
    }
}

/// Outcome of one playback attempt, before the retry loop decides what to do with it.
enum Attempt {
    Retry,
    Done(PlaybackOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> Arc<Session> {
        Session::new(
            SongInfo {
                url: "https://example.invalid/song.aac".parse().unwrap(),
                artist: "Artist".into(),
                album: "Album".into(),
                title: "Title".into(),
                album_art_url: None,
            },
            None,
            String::new(),
            0.0,
            0.0,
            1.0,
        )
    }

    #[test]
    fn starts_waiting_with_unity_gain() {
        let session = new_session();
        assert_eq!(session.mode(), Mode::Waiting);
        assert!((session.gain().ratio() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn skip_is_single_shot() {
        let session = new_session();
        session.request_skip();
        assert_eq!(session.check_interrupt(), Interrupt::SkipOnce);
        assert_eq!(session.check_interrupt(), Interrupt::None);
    }

    #[test]
    fn quit_is_sticky() {
        let session = new_session();
        session.request_quit();
        assert!(session.is_quitting());
        assert_eq!(session.check_interrupt(), Interrupt::Quit);
        assert!(session.is_quitting());
    }

    #[test]
    fn volume_combines_base_and_gain() {
        let session = new_session();
        session.set_volume_db(-6.0);
        session.set_gain(3.0, 2.0);
        let expected = crate::volume::db_to_ratio(-6.0 + 3.0 * 2.0);
        assert!((session.gain().ratio() - expected).abs() < 1e-5);
    }

    #[test]
    fn pause_then_quit_wakes_waiter() {
        let session = new_session();
        session.request_pause(true);
        assert!(session.is_paused());

        let waiter = Arc::clone(&session);
        let handle = std::thread::spawn(move || waiter.wait_while_paused());

        std::thread::sleep(Duration::from_millis(20));
        session.request_quit();

        handle.join().expect("waiter thread panicked");
    }
}
