use recapd::infrastructure::subtitles::parse_content;

const SRT: &str = "1\n00:00:01,000 --> 00:00:04,000\nfirst line\n\n2\n00:00:04,000 --> 00:00:07,500\nsecond line\ncontinued\n";

const VTT: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:04.000\nfirst line\n\n00:00:04.000 --> 00:00:07.500\nsecond line\n";

const YOUTUBE_VTT: &str = "WEBVTT\nKind: captions\nLanguage: en\n\n00:00:00.000 --> 00:00:02.000\nhello<00:00:00.500><c> there</c><00:00:01.200><c> world</c>\n";

const ASS: &str = "[Script Info]\nTitle: sample\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:03.50,Default,,0,0,0,,{\\pos(10,10)}styled text\nDialogue: 0,0:00:03.50,0:00:06.00,Default,,0,0,0,,line two\\Nwrapped\n";

#[test]
fn given_srt_content_when_parsed_then_segments_have_millisecond_times() {
    let track = parse_content(SRT, Some("srt".to_string())).unwrap();

    assert_eq!(track.len(), 2);
    assert_eq!(track.segments[0].start_ms, 1000);
    assert_eq!(track.segments[0].end_ms, 4000);
    assert_eq!(track.segments[0].text, "first line");
    // Multi-line cues are joined with spaces.
    assert_eq!(track.segments[1].text, "second line continued");
    assert_eq!(track.segments[1].end_ms, 7500);
}

#[test]
fn given_vtt_content_when_parsed_then_header_is_skipped() {
    let track = parse_content(VTT, Some("vtt".to_string())).unwrap();

    assert_eq!(track.len(), 2);
    assert_eq!(track.segments[0].start_ms, 1000);
    assert_eq!(track.segments[1].text, "second line");
}

#[test]
fn given_youtube_vtt_when_parsed_then_word_level_segments_emerge() {
    let track = parse_content(YOUTUBE_VTT, Some("vtt".to_string())).unwrap();

    let words: Vec<&str> = track.segments.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(words, vec!["hello", "there", "world"]);
    // Timestamps are monotone after normalization.
    for pair in track.segments.windows(2) {
        assert!(pair[0].start_ms <= pair[1].start_ms);
    }
}

#[test]
fn given_ass_content_when_parsed_then_style_overrides_are_stripped() {
    let track = parse_content(ASS, Some("ass".to_string())).unwrap();

    assert_eq!(track.len(), 2);
    assert_eq!(track.segments[0].text, "styled text");
    assert_eq!(track.segments[0].start_ms, 1000);
    assert_eq!(track.segments[0].end_ms, 3500);
    assert_eq!(track.segments[1].text, "line two wrapped");
}

#[test]
fn given_unrecognizable_content_when_parsed_then_unsupported_format() {
    let result = parse_content("just some prose, nothing timed", None);
    assert!(result.is_err());
}

#[test]
fn given_recognized_format_with_no_recoverable_cues_then_malformed() {
    let result = parse_content("WEBVTT\n\ngarbage\nwithout timestamps", Some("vtt".to_string()));
    assert!(result.is_err());
}

#[test]
fn given_duplicate_consecutive_cues_when_parsed_then_merged() {
    let srt = "1\n00:00:00,000 --> 00:00:02,000\nrepeat\n\n2\n00:00:02,000 --> 00:00:04,000\nrepeat\n";
    let track = parse_content(srt, Some("srt".to_string())).unwrap();

    assert_eq!(track.len(), 1);
    assert_eq!(track.segments[0].start_ms, 0);
    assert_eq!(track.segments[0].end_ms, 4000);
}

#[test]
fn given_partially_malformed_srt_when_parsed_then_good_cues_survive() {
    let srt = "1\n00:00:00,000 --> 00:00:02,000\ngood cue\n\nnot-a-number\nbroken timestamp line\ntext\n\n3\n00:00:05,000 --> 00:00:06,000\nanother good cue\n";
    let track = parse_content(srt, Some("srt".to_string())).unwrap();

    assert_eq!(track.len(), 2);
    assert_eq!(track.segments[0].text, "good cue");
    assert_eq!(track.segments[1].text, "another good cue");
}

#[test]
fn given_srt_with_dot_millisecond_separator_when_parsed_then_accepted() {
    let srt = "1\n00:00:01.000 --> 00:00:02.000\ndotted\n";
    let track = parse_content(srt, Some("srt".to_string())).unwrap();
    assert_eq!(track.segments[0].start_ms, 1000);
}
