mod parser;

pub use parser::{
    parse_ass, parse_content, parse_srt, parse_vtt, parse_youtube_vtt, SniffingSubtitleParser,
};
