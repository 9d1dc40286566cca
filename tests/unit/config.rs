use super::*;
use crate::assemble::backend::SubtitleMode;
use crate::assemble::plan::PreviewConfig;
use crate::audio::mix::LimiterMode;

#[test]
fn empty_object_is_the_default_config() {
    let cfg = RunConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, RunConfig::default());
    assert_eq!(cfg.estimation.max_concurrency, 4);
    assert_eq!(cfg.estimation.retry.max_attempts, 4);
    assert_eq!(cfg.capture.pause_tolerance_ms, 250);
    assert_eq!(cfg.mix.sample_rate, 48_000);
    assert_eq!(cfg.output.subtitle_mode, SubtitleMode::Burned);
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let cfg = RunConfig::from_json_str(
        r#"{
            "voice": {"rate": "-5%"},
            "estimation": {"retry": {"max_attempts": 2}},
            "mix": {"channels": 1, "limiter": {"mode": "soft_clip"}},
            "output": {"name": "tour", "subtitle_mode": "none", "preview": {}}
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.voice.voice, "en-US-AriaNeural");
    assert_eq!(cfg.voice.rate, "-5%");
    assert_eq!(cfg.estimation.retry.max_attempts, 2);
    assert_eq!(cfg.estimation.retry.base_delay_ms, 250);
    assert_eq!(cfg.mix.channels, 1);
    assert_eq!(cfg.mix.limiter.mode, LimiterMode::SoftClip);
    assert_eq!(cfg.mix.limiter.ceiling, 0.98);
    assert_eq!(cfg.output.preview, Some(PreviewConfig::default()));
}

#[test]
fn invalid_values_are_config_errors() {
    let cases = [
        r#"{"estimation": {"max_concurrency": 0}}"#,
        r#"{"estimation": {"retry": {"max_attempts": 0}}}"#,
        r#"{"mix": {"sample_rate": 0}}"#,
        r#"{"mix": {"channels": 6}}"#,
        r#"{"mix": {"gains": {"music": -0.5}}}"#,
        r#"{"mix": {"limiter": {"ceiling": 1.5}}}"#,
        r#"{"mix": {"limiter": {"ceiling": 0.0}}}"#,
        r#"{"subtitles": {"max_words_per_cue": 0}}"#,
        r#"{"output": {"name": "../escape"}}"#,
        r#"{"output": {"name": ""}}"#,
        r#"{"output": {"preview": {"fps": 0}}}"#,
        r#"{"voice": {"voice": "  "}}"#,
    ];
    for case in cases {
        let err = RunConfig::from_json_str(case).unwrap_err();
        assert!(matches!(err, NarrsyncError::Config(_)), "{case}: {err}");
    }
}

#[test]
fn malformed_json_is_a_config_error() {
    let err = RunConfig::from_json_str(r#"{"mix": {"channels": "two"}}"#).unwrap_err();
    assert!(err.to_string().starts_with("config error: invalid run config JSON"));
}

#[test]
fn reads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    std::fs::write(&path, r#"{"capture": {"tail_ms": 0}}"#).unwrap();
    let cfg = RunConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.capture.tail_ms, 0);

    let missing = RunConfig::from_json_file(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(missing, NarrsyncError::Other(_)));
}
