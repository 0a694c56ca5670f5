//! Exercises the demux/decode/gain/limiter chain against a synthetic in-memory stream, with no
//! network and no real audio device — the parts of the Play Loop (§4.6) that don't need one.

mod common;

use std::io::Cursor;
use std::time::Duration;

use monoplay::audio_file::AudioFile;
use monoplay::decoder::Decoder;
use monoplay::tee::{self, TeeStatus};
use monoplay::volume::Gain;
use rodio::Source;

fn open_decoder(wav: Vec<u8>) -> Decoder {
    let len = wav.len() as u64;
    let file = AudioFile::from_reader(Cursor::new(wav), true, Some(len), None)
        .expect("in-memory reader never fails to open");
    Decoder::new(file).expect("synthetic WAV should probe and decode cleanly")
}

#[test]
fn decodes_full_stream_to_completion() {
    let samples = common::sine_wave(44_100, 2, 1.0, 440.0);
    let expected_frames = samples.len() / 2;
    let wav = common::pcm16_wav(44_100, 2, &samples);

    let decoder = open_decoder(wav);
    assert_eq!(decoder.channels(), 2);
    assert_eq!(decoder.sample_rate(), 44_100);

    let total_duration = decoder.total_duration().expect("wav reports frame count");
    assert!((total_duration.as_secs_f32() - 1.0).abs() < 0.01);

    let decoded: Vec<f32> = decoder.collect();
    // Every sample must have been decoded; none dropped or duplicated by the packet loop.
    assert_eq!(decoded.len(), expected_frames * 2);
    assert!(decoded.iter().all(|s| s.is_finite()));
}

#[test]
fn gain_and_limiter_chain_stays_in_range() {
    let samples = common::sine_wave(44_100, 1, 0.25, 1_000.0);
    let wav = common::pcm16_wav(44_100, 1, &samples);
    let decoder = open_decoder(wav);

    let gain = Gain::unity();
    gain.set_db(24.0); // deliberately hot, to exercise the limiter's gain reduction
    let gained = monoplay::volume::gain_controlled(decoder, gain);
    let limited = monoplay::normalize::normalize(
        gained,
        1.0,
        -6.0,
        12.0,
        Duration::from_millis(5),
        Duration::from_millis(100),
    );

    let peak = limited.fold(0.0_f32, |acc, s| acc.max(s.abs()));
    // The limiter doesn't guarantee hard clipping never occurs (it's feedforward, not a brick
    // wall), but a 24 dB boost into a -6 dB threshold must still be pulled well below the raw
    // unity-gain peak the same input would otherwise reach.
    assert!(peak < 4.0, "limiter let an unreasonably hot signal through: {peak}");
}

#[test]
fn seek_resumes_mid_stream_without_panicking() {
    let samples = common::sine_wave(44_100, 1, 2.0, 220.0);
    let wav = common::pcm16_wav(44_100, 1, &samples);
    let mut decoder = open_decoder(wav);

    decoder.try_seek(Duration::from_millis(500)).expect("seek within a known-length stream");
    let remaining: Vec<f32> = decoder.collect();
    assert!(!remaining.is_empty());
    assert!(remaining.iter().all(|s| s.is_finite()));
}

#[test]
fn tee_captures_exact_bytes_read_and_finalizes_on_clean_completion() {
    let samples = common::sine_wave(22_050, 1, 0.2, 300.0);
    let wav = common::pcm16_wav(22_050, 1, &samples);
    let len = wav.len() as u64;

    let dir = std::env::temp_dir().join(format!("monoplay-playback-test-{}", std::process::id()));
    let temp_path = dir.join("tee.wav");
    let final_path = dir.join("out").join("final.wav");
    let status = std::sync::Arc::new(TeeStatus::new());

    {
        let file = AudioFile::from_reader(
            Cursor::new(wav.clone()),
            true,
            Some(len),
            Some((temp_path.clone(), std::sync::Arc::clone(&status))),
        )
        .unwrap();
        let decoder = Decoder::new(file).unwrap();
        // Drain the decoder so every byte of the source has been read through the tee.
        let _: Vec<f32> = decoder.collect();
    }

    assert!(!status.failed());
    let moved = tee::finalize(&temp_path, &final_path, &status).unwrap();
    assert!(moved);
    assert_eq!(std::fs::read(&final_path).unwrap(), wav);

    std::fs::remove_dir_all(&dir).ok();
}
