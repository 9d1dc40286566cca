use super::*;
use crate::audio::pcm::AudioPcm;
use crate::capture::driver::CaptureEvent;
use crate::foundation::core::UnitRef;

fn record() -> CaptureRecord {
    let event = |id: &str, ordinal: u32, pause_start_ms: u64| CaptureEvent {
        unit: UnitRef::new(id, ordinal),
        action_start_ms: pause_start_ms.saturating_sub(300),
        pause_start_ms,
        pause_duration_ms: 1_000,
        settle_end_ms: pause_start_ms + 1_500,
    };
    CaptureRecord {
        video: PathBuf::from("rec.webm"),
        events: vec![event("intro", 1, 500), event("settings", 2, 2_000)],
        recording_ms: 5_000,
    }
}

fn store() -> AudioStore {
    let mut store = AudioStore::new(1_000, 1);
    store.insert("bed.mp3", AudioPcm::silence(1_000, 1, 1_500)).unwrap();
    store.insert("click.wav", AudioPcm::silence(1_000, 1, 50)).unwrap();
    store
}

fn layer(cues: Vec<CueSpec>) -> LayerSpec {
    LayerSpec {
        name: "music".to_string(),
        category: LayerCategory::Music,
        gain: None,
        cues,
    }
}

#[test]
fn loop_tiles_the_gap_and_truncates_the_last_pass() {
    let repeats = plan_repeats(FitMode::Loop, 1_500, 0, Some(4_000), 10_000).unwrap();
    assert_eq!(
        repeats,
        vec![
            Repeat { offset: 0, len: 1_500 },
            Repeat { offset: 1_500, len: 1_500 },
            Repeat { offset: 3_000, len: 1_000 },
        ]
    );

    let to_end = plan_repeats(FitMode::Loop, 1_500, 9_000, None, 10_000).unwrap();
    assert_eq!(to_end.iter().map(|r| r.len).sum::<u64>(), 1_000);
}

#[test]
fn once_plays_through_but_never_overlaps() {
    let r = plan_repeats(FitMode::Once, 1_500, 100, Some(5_000), 10_000).unwrap();
    assert_eq!(r, vec![Repeat { offset: 100, len: 1_500 }]);

    let err = plan_repeats(FitMode::Once, 1_500, 100, Some(1_000), 10_000).unwrap_err();
    assert!(err.contains("900 frames later"));

    let tail = plan_repeats(FitMode::Once, 1_500, 9_800, None, 10_000).unwrap();
    assert_eq!(tail, vec![Repeat { offset: 9_800, len: 200 }]);
}

#[test]
fn stop_at_next_cue_truncates() {
    let r = plan_repeats(FitMode::StopAtNextCue, 1_500, 0, Some(600), 10_000).unwrap();
    assert_eq!(r, vec![Repeat { offset: 0, len: 600 }]);
    assert!(plan_repeats(FitMode::Loop, 0, 0, None, 100).unwrap().is_empty());
}

#[test]
fn unit_cues_resolve_to_pause_start_with_offset() {
    let spec = layer(vec![
        CueSpec::on_unit("click.wav", "settings").with_offset_ms(-250),
        CueSpec::on_unit("bed.mp3", "intro").with_fit_mode(FitMode::Loop),
        CueSpec::at("click.wav", 4_200),
        CueSpec::on_unit("click.wav", "intro").with_offset_ms(-10_000),
    ]);
    let resolved = resolve_layer(&spec, &record(), &store(), 0.25).unwrap();

    let starts: Vec<u64> = resolved.clips.iter().map(|c| c.resolved_start_ms).collect();
    assert_eq!(starts, vec![0, 500, 1_750, 4_200]);
    assert_eq!(resolved.gain, 0.25);
    assert_eq!(resolved.clips[1].fit_mode, FitMode::Loop);
}

#[test]
fn unresolvable_cues_name_layer_and_cue() {
    let err = resolve_layer(
        &layer(vec![CueSpec::on_unit("bed.mp3", "checkout")]),
        &record(),
        &store(),
        1.0,
    )
    .unwrap_err();
    assert!(err.to_string().contains("layer 'music' cue #1"));
    assert!(err.to_string().contains("unknown trigger unit 'checkout'"));

    let err = resolve_layer(
        &layer(vec![CueSpec::at("missing.ogg", 0)]),
        &record(),
        &store(),
        1.0,
    )
    .unwrap_err();
    assert!(matches!(err, NarrsyncError::Composition { .. }));

    let mut both = CueSpec::at("bed.mp3", 0);
    both.trigger_unit_id = Some("intro".to_string());
    assert!(resolve_layer(&layer(vec![both]), &record(), &store(), 1.0).is_err());
}

#[test]
fn clips_sharing_a_start_are_rejected() {
    let err = resolve_layer(
        &layer(vec![
            CueSpec::on_unit("bed.mp3", "intro"),
            CueSpec::at("click.wav", 500),
        ]),
        &record(),
        &store(),
        1.0,
    )
    .unwrap_err();
    assert!(err.to_string().contains("both start at 500 ms"));
}

#[test]
fn layer_override_gain_wins() {
    let mut spec = layer(vec![CueSpec::at("bed.mp3", 0)]);
    spec.gain = Some(0.8);
    spec.category = LayerCategory::Sfx;
    let resolved = resolve_layer(&spec, &record(), &store(), 0.6).unwrap();
    assert_eq!(resolved.gain, 0.8);
    assert_eq!(resolved.category, LayerCategory::Sfx);
}

#[test]
fn cue_json_uses_defaults() {
    let cue: CueSpec =
        serde_json::from_str(r#"{"source":"bed.mp3","trigger_unit_id":"intro","fit_mode":"stop_at_next_cue"}"#)
            .unwrap();
    assert_eq!(cue.volume, 1.0);
    assert_eq!(cue.offset_ms, 0);
    assert_eq!(cue.fit_mode, FitMode::StopAtNextCue);
}
