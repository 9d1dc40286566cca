use super::*;
use std::sync::Mutex;

/// Files named `*silent*` have no audio; normalized and concatenated outputs are written as text.
#[derive(Default)]
struct RecordingClips {
    fail_concat: bool,
    normalized: Mutex<Vec<NormalizeRequest>>,
    concats: Mutex<Vec<ConcatRequest>>,
}

impl ClipBackend for RecordingClips {
    fn has_audio_stream(&self, path: &Path) -> anyhow::Result<bool> {
        Ok(!path.to_string_lossy().contains("silent"))
    }

    fn normalize_clip(&self, req: &NormalizeRequest) -> anyhow::Result<()> {
        std::fs::write(&req.output, b"norm")?;
        self.normalized.lock().unwrap().push(req.clone());
        Ok(())
    }

    fn concat_clips(&self, req: &ConcatRequest) -> anyhow::Result<()> {
        self.concats.lock().unwrap().push(req.clone());
        if self.fail_concat {
            anyhow::bail!("concat demuxer error");
        }
        std::fs::write(&req.out_path, b"mp4")?;
        Ok(())
    }
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"clip").unwrap();
    path
}

fn plan(clips: Vec<StitchClip>) -> StitchPlan {
    StitchPlan {
        clips,
        output_name: "final".to_string(),
        format: ClipFormat::default(),
    }
}

#[test]
fn clips_are_normalized_in_order_and_concatenated() {
    let assets = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    touch(assets.path(), "intro_silent.mp4");
    let demo = touch(assets.path(), "demo.mp4");

    let backend = RecordingClips::default();
    let stitched = stitch(
        &plan(vec![
            StitchClip::Whole(PathBuf::from("intro_silent.mp4")),
            StitchClip::Segment(ClipSegment {
                source: demo.clone(),
                start_ms: 19_000,
                end_ms: None,
                label: Some("demo".to_string()),
            }),
        ]),
        assets.path(),
        &backend,
        work.path(),
        out.path(),
    )
    .unwrap();

    assert_eq!(stitched.video, out.path().join("final.mp4"));
    assert_eq!(stitched.clips, 2);
    assert!(stitched.video.is_file());

    let mut normalized = backend.normalized.lock().unwrap().clone();
    normalized.sort_by(|a, b| a.output.cmp(&b.output));
    assert_eq!(normalized[0].input, assets.path().join("intro_silent.mp4"));
    assert!(!normalized[0].has_audio);
    assert_eq!(normalized[0].trim, None);
    assert_eq!(normalized[1].input, demo);
    assert!(normalized[1].has_audio);
    assert_eq!(normalized[1].trim, Some((19_000, None)));

    let concats = backend.concats.lock().unwrap();
    assert_eq!(
        concats[0].clips,
        [work.path().join("norm_00.mp4"), work.path().join("norm_01.mp4")]
    );
    assert_eq!(concats[0].list_path, work.path().join("concat.txt"));
}

#[test]
fn missing_clip_fails_before_any_encoding() {
    let assets = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    touch(assets.path(), "intro.mp4");
    let backend = RecordingClips::default();

    let err = stitch(
        &plan(vec![
            StitchClip::Whole(PathBuf::from("intro.mp4")),
            StitchClip::Whole(PathBuf::from("outro.mp4")),
        ]),
        assets.path(),
        &backend,
        assets.path(),
        out.path(),
    )
    .unwrap_err();

    assert!(matches!(err, NarrsyncError::Validation(ref m) if m.contains("clip #2 not found")));
    assert!(backend.normalized.lock().unwrap().is_empty());
}

#[test]
fn inverted_segment_and_bad_names_are_rejected() {
    let assets = tempfile::tempdir().unwrap();
    let demo = touch(assets.path(), "demo.mp4");
    let backend = RecordingClips::default();
    let inverted = plan(vec![StitchClip::Segment(ClipSegment {
        source: demo.clone(),
        start_ms: 5_000,
        end_ms: Some(5_000),
        label: None,
    })]);
    let err = stitch(&inverted, assets.path(), &backend, assets.path(), assets.path()).unwrap_err();
    assert!(err.to_string().contains("end_ms 5000 must be after start_ms 5000"));

    let mut nested = plan(vec![StitchClip::Whole(demo)]);
    nested.output_name = "../final".to_string();
    assert!(stitch(&nested, assets.path(), &backend, assets.path(), assets.path()).is_err());

    let empty = plan(Vec::new());
    assert!(stitch(&empty, assets.path(), &backend, assets.path(), assets.path()).is_err());
}

#[test]
fn failed_concat_leaves_no_output() {
    let assets = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    touch(assets.path(), "demo.mp4");
    let backend = RecordingClips {
        fail_concat: true,
        ..RecordingClips::default()
    };

    let err = stitch(
        &plan(vec![StitchClip::Whole(PathBuf::from("demo.mp4"))]),
        assets.path(),
        &backend,
        work.path(),
        out.path(),
    )
    .unwrap_err();

    assert!(matches!(err, NarrsyncError::Assembly(ref m) if m.contains("concat demuxer error")));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn branded_cut_replaces_trimmed_ranges_with_transitions() {
    let cut = BrandedCut {
        intro: Some(PathBuf::from("brand/intro.mp4")),
        outro: Some(PathBuf::from("brand/outro.mp4")),
        start_ms: 1_000,
        transitions: vec![
            Transition {
                clip: PathBuf::from("brand/wipe2.mp4"),
                trim_start_ms: 40_000,
                trim_end_ms: 42_000,
            },
            Transition {
                clip: PathBuf::from("brand/wipe1.mp4"),
                trim_start_ms: 10_000,
                trim_end_ms: 12_500,
            },
        ],
        format: ClipFormat::default(),
    };

    let plan = cut.into_plan(Path::new("/out/demo.mp4"), 60_000).unwrap();

    let seg = |start_ms, end_ms| {
        StitchClip::Segment(ClipSegment {
            source: PathBuf::from("/out/demo.mp4"),
            start_ms,
            end_ms: Some(end_ms),
            label: None,
        })
    };
    assert_eq!(plan.output_name, "demo_branded");
    assert_eq!(
        plan.clips,
        [
            StitchClip::Whole(PathBuf::from("brand/intro.mp4")),
            seg(1_000, 10_000),
            StitchClip::Whole(PathBuf::from("brand/wipe1.mp4")),
            seg(12_500, 40_000),
            StitchClip::Whole(PathBuf::from("brand/wipe2.mp4")),
            seg(42_000, 60_000),
            StitchClip::Whole(PathBuf::from("brand/outro.mp4")),
        ]
    );
}

#[test]
fn branded_cut_rejects_inverted_and_overlapping_transitions() {
    let transition = |start, end| Transition {
        clip: PathBuf::from("wipe.mp4"),
        trim_start_ms: start,
        trim_end_ms: end,
    };
    let inverted = BrandedCut {
        transitions: vec![transition(5_000, 4_000)],
        ..BrandedCut::default()
    };
    assert!(inverted.into_plan(Path::new("demo.mp4"), 10_000).is_err());

    let overlapping = BrandedCut {
        transitions: vec![transition(2_000, 6_000), transition(5_000, 7_000)],
        ..BrandedCut::default()
    };
    let err = overlapping.into_plan(Path::new("demo.mp4"), 10_000).unwrap_err();
    assert!(matches!(err, NarrsyncError::Validation(_)));
}

#[test]
fn stitch_list_json_accepts_paths_and_segments() {
    let plan: StitchPlan = serde_json::from_str(
        r#"{"clips": ["intro.mp4", {"source": "demo.mp4", "start_ms": 19000}, "outro.mp4"]}"#,
    )
    .unwrap();
    assert_eq!(plan.output_name, "stitched");
    assert_eq!(plan.format, ClipFormat::default());
    assert_eq!(plan.clips[0], StitchClip::Whole(PathBuf::from("intro.mp4")));
    assert_eq!(plan.clips[1].trim(), Some((19_000, None)));
    assert_eq!(plan.clips[1].label(), "demo");
}
