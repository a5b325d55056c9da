//! Formatting block spans as numbered segments.

/// The frame drawn around each segment number.
const SEGMENT_FRAME: &str = "═══";

/// The trimmed, non-empty text of one layout block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSpan {
    /// 1-based position among the non-empty blocks of the page.
    pub index: usize,
    pub text: String,
}

/// Render spans as display text.
///
/// Each span becomes a `═══ Segment <n> ═══` header line, the span text, and a
/// blank line. No spans means an empty string.
pub fn format_segments(spans: &[BlockSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        out.push_str(&segment_header(span.index));
        out.push('\n');
        out.push_str(&span.text);
        out.push_str("\n\n");
    }
    out
}

/// The header line for segment `index`, without a trailing newline.
pub fn segment_header(index: usize) -> String {
    format!("{SEGMENT_FRAME} Segment {index} {SEGMENT_FRAME}")
}
