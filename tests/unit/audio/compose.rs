use super::*;
use crate::audio::layer::CueSpec;
use crate::capture::driver::CaptureEvent;
use crate::timeline::{NarratedUnit, NarrationClip, Timeline};

const SR: u32 = 1_000;

fn timeline() -> EstimatedTimeline {
    let units = vec![
        NarratedUnit::new("intro", 1).with_narration("Welcome"),
        NarratedUnit::new("scroll", 2),
        NarratedUnit::new("save", 3).with_narration("Save it"),
    ];
    let clip = |u: &NarratedUnit, ms: u64| NarrationClip {
        unit: u.unit_ref(),
        text: u.narration().unwrap_or_default().to_string(),
        audio: Some(PathBuf::from(format!("{}.mp3", u.id))),
        duration_ms: ms,
        words: Vec::new(),
    };
    let clips = vec![
        clip(&units[0], 1_000),
        NarrationClip::silent(units[1].unit_ref()),
        clip(&units[2], 800),
    ];
    EstimatedTimeline::new(Timeline::new(units).unwrap(), clips).unwrap()
}

fn record(first_pause_ms: u64) -> CaptureRecord {
    let ev = |id: &str, ordinal, pause_start_ms, pause_duration_ms| CaptureEvent {
        unit: crate::foundation::core::UnitRef::new(id, ordinal),
        action_start_ms: pause_start_ms,
        pause_start_ms,
        pause_duration_ms,
        settle_end_ms: pause_start_ms + pause_duration_ms + 500,
    };
    CaptureRecord {
        video: PathBuf::from("rec.webm"),
        events: vec![
            ev("intro", 1, 200, first_pause_ms),
            ev("scroll", 2, 1_700, 0),
            ev("save", 3, 2_200, 800),
        ],
        recording_ms: 4_000,
    }
}

fn store() -> AudioStore {
    let mut store = AudioStore::new(SR, 1);
    // Decoder padding: 1 200 ms decoded for a 1 000 ms estimate.
    store.insert("intro.mp3", AudioPcm { sample_rate: SR, channels: 1, interleaved_f32: vec![0.5; 1_200] }).unwrap();
    store.insert("save.mp3", AudioPcm { sample_rate: SR, channels: 1, interleaved_f32: vec![0.5; 800] }).unwrap();
    store.insert("whoosh.wav", AudioPcm { sample_rate: SR, channels: 1, interleaved_f32: vec![1.0; 100] }).unwrap();
    store
}

fn cfg() -> MixConfig {
    MixConfig {
        sample_rate: SR,
        channels: 1,
        ..MixConfig::default()
    }
}

#[test]
fn narration_starts_at_measured_pause() {
    let layer = narration_layer(&timeline(), &record(1_000), 1.0).unwrap();
    let placed: Vec<(u64, Option<u64>)> = layer
        .clips
        .iter()
        .map(|c| (c.resolved_start_ms, c.max_len_ms))
        .collect();
    assert_eq!(placed, vec![(200, Some(1_000)), (2_200, Some(800))]);
}

#[test]
fn short_pause_is_rejected() {
    let err = narration_layer(&timeline(), &record(900), 1.0).unwrap_err();
    assert!(err.to_string().contains("unit 'intro' (#1)"));
    assert!(err.to_string().contains("shorter than the 1000 ms narration"));
}

#[test]
fn mix_spans_the_recording_and_respects_placements() {
    let sfx = LayerSpec {
        name: "sfx".to_string(),
        category: LayerCategory::Sfx,
        gain: Some(0.5),
        cues: vec![CueSpec::on_unit("whoosh.wav", "scroll")],
    };
    let composed = compose_audio(&timeline(), &record(1_000), &[sfx], &store(), &cfg()).unwrap();

    assert_eq!(composed.duration_ms, 4_000);
    assert_eq!(composed.mix.frames(), 4_000);
    assert_eq!(composed.layers.len(), 2);
    let s = &composed.mix.interleaved_f32;
    assert_eq!(s[199], 0.0);
    assert_eq!(s[200], 0.5);
    // Padding beyond the estimate never reaches the mix.
    assert_eq!(s[1_200], 0.0);
    assert_eq!(s[1_700], 0.5);
    assert_eq!(s[2_200], 0.5);
    assert_eq!(s[3_000], 0.0);
}

#[test]
fn silent_run_mixes_to_silence() {
    let units = vec![NarratedUnit::new("only", 1)];
    let clips = vec![NarrationClip::silent(units[0].unit_ref())];
    let timeline = EstimatedTimeline::new(Timeline::new(units).unwrap(), clips).unwrap();
    let record = CaptureRecord {
        video: PathBuf::from("rec.webm"),
        events: vec![CaptureEvent {
            unit: crate::foundation::core::UnitRef::new("only", 1),
            action_start_ms: 0,
            pause_start_ms: 0,
            pause_duration_ms: 0,
            settle_end_ms: 500,
        }],
        recording_ms: 1_500,
    };
    let composed = compose_audio(&timeline, &record, &[], &AudioStore::new(SR, 1), &cfg()).unwrap();
    assert_eq!(composed.mix.frames(), 1_500);
    assert_eq!(composed.mix.peak(), 0.0);
}

#[test]
fn format_mismatch_is_reported() {
    let err = compose_audio(&timeline(), &record(1_000), &[], &store(), &MixConfig::default())
        .unwrap_err();
    assert!(err.to_string().contains("1000 Hz x1"));
}

#[test]
fn sources_are_listed_once() {
    let music = LayerSpec {
        name: "music".to_string(),
        category: LayerCategory::Music,
        gain: None,
        cues: vec![
            CueSpec::at("bed.mp3", 0),
            CueSpec::at("bed.mp3", 9_000),
            CueSpec::on_unit("intro.mp3", "save"),
        ],
    };
    assert_eq!(
        required_sources(&timeline(), &[music]),
        vec![
            PathBuf::from("intro.mp3"),
            PathBuf::from("save.mp3"),
            PathBuf::from("bed.mp3"),
        ]
    );
}
