use super::*;

fn strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

fn audio() -> RawAudioInput {
    RawAudioInput {
        path: PathBuf::from("/run/mix.f32le"),
        sample_rate: 48_000,
        channels: 2,
    }
}

#[test]
fn soft_subtitles_map_as_third_input() {
    let encode = EncodeSettings::default();
    let audio = audio();
    let args = strings(&mux_args(&MuxArgs {
        video: Path::new("/rec/session.webm"),
        audio: Some(&audio),
        soft_subtitles: Some(Path::new("/out/demo.srt")),
        burn: false,
        encode: &encode,
        out_path: Path::new("/out/demo.mp4"),
    }));

    let joined = args.join(" ");
    assert!(joined.starts_with("-y -loglevel error -i /rec/session.webm -f f32le -ar 48000 -ac 2 -i /run/mix.f32le -i /out/demo.srt"));
    assert!(joined.contains("-map 0:v:0 -map 1:a:0 -map 2:s:0"));
    assert!(joined.contains("-c:v libx264 -preset medium -crf 23 -pix_fmt yuv420p"));
    assert!(joined.contains("-c:a aac -b:a 128k"));
    assert!(joined.contains("-c:s mov_text"));
    assert_eq!(args.last().map(String::as_str), Some("/out/demo.mp4"));
    assert!(!args.iter().any(|a| a == "-shortest"));
}

#[test]
fn burned_subtitles_use_staged_file_and_filter() {
    let encode = EncodeSettings {
        crf: 18,
        ..EncodeSettings::default()
    };
    let audio = audio();
    let args = strings(&mux_args(&MuxArgs {
        video: Path::new("/rec/session.webm"),
        audio: Some(&audio),
        soft_subtitles: None,
        burn: true,
        encode: &encode,
        out_path: Path::new("/out/demo.mp4"),
    }));

    let vf = args.iter().position(|a| a == "-vf").unwrap();
    assert!(args[vf + 1].starts_with("subtitles=subs.srt:force_style='FontSize=22"));
    assert!(!args.iter().any(|a| a.contains(":s:0")));
    assert!(args.join(" ").contains("-crf 18"));
}

#[test]
fn missing_audio_encodes_video_only() {
    let encode = EncodeSettings::default();
    let args = strings(&mux_args(&MuxArgs {
        video: Path::new("v.webm"),
        audio: None,
        soft_subtitles: Some(Path::new("s.srt")),
        burn: false,
        encode: &encode,
        out_path: Path::new("o.mp4"),
    }));
    assert!(args.iter().any(|a| a == "-an"));
    assert!(args.join(" ").contains("-map 1:s:0"));
}

#[test]
fn preview_is_two_pass_palette_gif() {
    let req = PreviewRequest {
        source: PathBuf::from("/out/demo.mp4"),
        out_path: PathBuf::from("/out/demo.gif"),
        palette_path: PathBuf::from("/run/palette.png"),
        fps: 10,
        width: 800,
        max_duration_ms: Some(30_000),
    };
    assert_eq!(
        strings(&preview_palette_args(&req)),
        vec![
            "-y",
            "-loglevel",
            "error",
            "-t",
            "30.000",
            "-i",
            "/out/demo.mp4",
            "-vf",
            "fps=10,scale=800:-1:flags=lanczos,palettegen",
            "/run/palette.png",
        ]
    );
    let gif = strings(&preview_gif_args(&PreviewRequest {
        max_duration_ms: None,
        ..req
    }));
    assert!(!gif.iter().any(|a| a == "-t"));
    assert!(gif.contains(&"fps=10,scale=800:-1:flags=lanczos[x];[x][1:v]paletteuse".to_string()));
    assert_eq!(gif.last().map(String::as_str), Some("/out/demo.gif"));
}

#[test]
fn ffprobe_duration_parses_and_rounds() {
    assert_eq!(parse_ffprobe_duration_ms("12.345678\n").unwrap(), 12_346);
    assert_eq!(parse_ffprobe_duration_ms("\n3\n").unwrap(), 3_000);
    assert!(parse_ffprobe_duration_ms("N/A\n").is_err());
    assert!(parse_ffprobe_duration_ms("").is_err());

    let args = strings(&ffprobe_duration_args(Path::new("clip.mp3")));
    assert_eq!(args.last().map(String::as_str), Some("clip.mp3"));
    assert!(args.contains(&"format=duration".to_string()));
}

#[test]
fn stderr_tail_keeps_last_lines() {
    let text: String = (0..20).map(|i| format!("line {i}\n")).collect();
    let tail = stderr_tail(text.as_bytes());
    assert!(tail.starts_with("line 8"));
    assert!(tail.ends_with("line 19"));
}

#[test]
fn missing_ffmpeg_has_no_subtitles_filter() {
    let backend = FfmpegBackend::with_programs("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
    assert!(!backend.has_subtitles_filter());
    assert!(!is_tool_on_path("/nonexistent/ffmpeg"));
}

fn normalize(trim: Option<(u64, Option<u64>)>, has_audio: bool) -> Vec<String> {
    strings(&normalize_args(&NormalizeRequest {
        input: PathBuf::from("/clips/intro.mp4"),
        output: PathBuf::from("/run/norm_00.mp4"),
        trim,
        has_audio,
        format: ClipFormat::default(),
    }))
}

#[test]
fn normalize_letterboxes_and_keeps_source_audio() {
    let args = normalize(None, true);
    let joined = args.join(" ");
    assert!(joined.starts_with("-y -loglevel error -i /clips/intro.mp4 -vf "));
    assert!(joined.contains(
        "scale=1920:1080:force_original_aspect_ratio=decrease,pad=1920:1080:(ow-iw)/2:(oh-ih)/2"
    ));
    assert!(joined.contains("-map 0:v:0 -map 0:a:0"));
    assert!(joined.contains("-c:v libx264 -preset medium -crf 18"));
    assert!(joined.contains("-c:a aac -b:a 128k -ar 44100 -ac 2 -r 30 -pix_fmt yuv420p"));
    assert!(!args.iter().any(|a| a == "-ss" || a == "-t" || a == "-shortest"));
    assert_eq!(args.last().map(String::as_str), Some("/run/norm_00.mp4"));
}

#[test]
fn normalize_adds_silence_to_video_only_clips() {
    let args = normalize(None, false);
    let joined = args.join(" ");
    assert!(joined.contains("-i /clips/intro.mp4 -f lavfi -i anullsrc=r=44100:cl=stereo"));
    assert!(joined.contains("-map 0:v:0 -map 1:a:0"));
    assert!(args.iter().any(|a| a == "-shortest"));
}

#[test]
fn normalize_trims_with_input_seek_and_duration() {
    let args = normalize(Some((19_000, Some(25_500))), true);
    let joined = args.join(" ");
    assert!(joined.starts_with("-y -loglevel error -ss 19.000 -i /clips/intro.mp4 -t 6.500 -vf"));

    let open_ended = normalize(Some((4_000, None)), true);
    assert!(open_ended.join(" ").contains("-ss 4.000 -i"));
    assert!(!open_ended.iter().any(|a| a == "-t"));
}

#[test]
fn concat_reads_list_and_reencodes() {
    let args = strings(&concat_args(
        Path::new("/run/concat.txt"),
        Path::new("/out/demo_branded.mp4"),
        &ClipFormat::default(),
    ));
    let joined = args.join(" ");
    assert!(joined.starts_with("-y -loglevel error -f concat -safe 0 -i /run/concat.txt -c:v libx264"));
    assert!(joined.contains("-movflags +faststart"));
    assert_eq!(args.last().map(String::as_str), Some("/out/demo_branded.mp4"));
}

#[test]
fn concat_list_entries_escape_quotes() {
    assert_eq!(concat_list_entry(Path::new("/run/norm_00.mp4")), "file '/run/norm_00.mp4'\n");
    assert_eq!(
        concat_list_entry(Path::new("/clips/it's.mp4")),
        "file '/clips/it'\\''s.mp4'\n"
    );
}

#[test]
fn audio_stream_probe_selects_audio_only() {
    let args = strings(&ffprobe_audio_stream_args(Path::new("outro.mov")));
    assert!(args.join(" ").contains("-select_streams a -show_entries stream=codec_type"));
    assert_eq!(args.last().map(String::as_str), Some("outro.mov"));
}
