//! The engine's hierarchical page layout, and the walker that turns it into
//! numbered block spans.
//!
//! `tesseract` reports layout as TSV rows, one per page, block, paragraph,
//! line and word, in reading order. [`LayoutCursor`] walks those rows the way
//! the engine's own page iterator does, and [`walk`] hides the cursor behind a
//! plain [`Iterator`].

use std::fmt;

use csv::StringRecord;
use serde::de::IgnoredAny;

use super::{ExtractError, engines::PageResult, segments::BlockSpan};
use crate::prelude::*;

/// Levels of the layout hierarchy, outermost first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Page = 1,
    Block = 2,
    Paragraph = 3,
    Line = 4,
    Word = 5,
}

impl Level {
    /// Convert the numeric `level` column used in TSV output.
    fn from_tsv(level: u8) -> Option<Self> {
        match level {
            1 => Some(Level::Page),
            2 => Some(Level::Block),
            3 => Some(Level::Paragraph),
            4 => Some(Level::Line),
            5 => Some(Level::Word),
            _ => None,
        }
    }

    fn depth(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Page => "page",
            Level::Block => "block",
            Level::Paragraph => "paragraph",
            Level::Line => "line",
            Level::Word => "word",
        };
        f.write_str(name)
    }
}

/// One element of the layout.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutRow {
    pub level: Level,
    pub block_num: u32,
    pub par_num: u32,
    pub line_num: u32,
    /// Word confidence from 0 to 100. Non-word rows use -1.
    pub conf: f32,
    /// Only word rows carry text.
    pub text: String,
}

/// The complete layout of one recognized page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageLayout {
    rows: Vec<LayoutRow>,
}

impl PageLayout {
    /// Parse the engine's TSV output. The header line is optional. Without
    /// it, columns are read in the engine's standard order.
    pub fn from_tsv(tsv: &str) -> Result<Self, ExtractError> {
        // Words may begin with a quotation mark, so quotes are plain text here.
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::Fields)
            .from_reader(tsv.as_bytes());

        let mut headers: Option<StringRecord> = None;
        let mut rows = vec![];
        for record in rdr.records() {
            let record = record.map_err(|err| {
                ExtractError::Traversal(format!("cannot read TSV: {}", err))
            })?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            if headers.is_none() && record.get(0) == Some("level") {
                headers = Some(record);
                continue;
            }
            let line = record.position().map_or(0, |pos| pos.line());
            let row = record
                .deserialize::<TsvRow>(headers.as_ref())
                .map_err(|err| err.to_string())
                .and_then(TsvRow::into_layout_row)
                .map_err(|msg| {
                    ExtractError::Traversal(format!("TSV line {}: {}", line, msg))
                })?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    /// All rows, in reading order.
    pub fn rows(&self) -> &[LayoutRow] {
        &self.rows
    }

    /// The mean confidence of all recognized words, from 0.0 to 1.0.
    ///
    /// Returns 0.0 for a page with no words.
    pub fn mean_word_confidence(&self) -> f32 {
        let (sum, count) = self
            .rows
            .iter()
            .filter(|row| {
                row.level == Level::Word && row.conf >= 0.0 && !row.text.trim().is_empty()
            })
            .fold((0.0f64, 0usize), |(sum, count), row| {
                (sum + f64::from(row.conf), count + 1)
            });
        if count == 0 {
            0.0
        } else {
            (sum / count as f64 / 100.0) as f32
        }
    }

    /// Create a new cursor. Call [`LayoutCursor::begin`] before using it.
    pub fn cursor(&self) -> LayoutCursor<'_> {
        LayoutCursor {
            rows: &self.rows,
            pos: self.rows.len(),
        }
    }
}

/// One row of `tesseract` TSV output. Field names match the TSV header.
#[derive(Debug, Deserialize)]
struct TsvRow {
    level: u8,
    #[serde(rename = "page_num")]
    _page_num: IgnoredAny,
    block_num: u32,
    par_num: u32,
    line_num: u32,
    #[serde(rename = "word_num")]
    _word_num: IgnoredAny,
    #[serde(rename = "left")]
    _left: IgnoredAny,
    #[serde(rename = "top")]
    _top: IgnoredAny,
    #[serde(rename = "width")]
    _width: IgnoredAny,
    #[serde(rename = "height")]
    _height: IgnoredAny,
    conf: f32,
    /// Missing entirely on some non-word rows.
    #[serde(default)]
    text: String,
}

impl TsvRow {
    fn into_layout_row(self) -> Result<LayoutRow, String> {
        let level = Level::from_tsv(self.level)
            .ok_or_else(|| format!("unknown level {}", self.level))?;
        Ok(LayoutRow {
            level,
            block_num: self.block_num,
            par_num: self.par_num,
            line_num: self.line_num,
            conf: self.conf,
            text: self.text,
        })
    }
}

/// A position in a [`PageLayout`], modeled on the engine's page iterator.
pub struct LayoutCursor<'a> {
    rows: &'a [LayoutRow],
    /// Index of the current row. `rows.len()` means we're past the end.
    pos: usize,
}

impl LayoutCursor<'_> {
    /// Check that the rows form a proper hierarchy, and move to the first
    /// block.
    ///
    /// Each row may be at most one level deeper than the row before it, and
    /// the first row must be a page.
    pub fn begin(&mut self) -> Result<(), ExtractError> {
        let mut prev: Option<&LayoutRow> = None;
        for (idx, row) in self.rows.iter().enumerate() {
            let prev_depth = prev.map_or(0, |p| p.level.depth());
            if row.level.depth() > prev_depth + 1 {
                let after = prev.map_or_else(|| "the start of the page".to_owned(), |p| {
                    format!("a {}", p.level)
                });
                return Err(ExtractError::Traversal(format!(
                    "row {} is a {} directly after {}",
                    idx + 1,
                    row.level,
                    after,
                )));
            }
            prev = Some(row);
        }
        self.pos = self
            .rows
            .iter()
            .position(|row| row.level == Level::Block)
            .unwrap_or(self.rows.len());
        Ok(())
    }

    /// Is the cursor at the first row of an element at `level`?
    pub fn is_at_beginning_of(&self, level: Level) -> bool {
        self.rows.get(self.pos).is_some_and(|row| row.level == level)
    }

    /// The text of the element at `level` starting at the cursor, or `None` if
    /// the cursor is not at the start of such an element.
    pub fn text(&self, level: Level) -> Option<String> {
        if !self.is_at_beginning_of(level) {
            return None;
        }
        let rest = &self.rows[self.pos + 1..];
        let len = rest
            .iter()
            .position(|row| row.level <= level)
            .unwrap_or(rest.len());
        Some(element_text(&self.rows[self.pos..self.pos + 1 + len]))
    }

    /// Move to the start of the next element at `level`. Returns `false` when
    /// there are no more.
    pub fn next(&mut self, level: Level) -> bool {
        let start = (self.pos + 1).min(self.rows.len());
        match self.rows[start..].iter().position(|row| row.level == level) {
            Some(offset) => {
                self.pos = start + offset;
                true
            }
            None => {
                self.pos = self.rows.len();
                false
            }
        }
    }
}

/// Rebuild the text of an element from its word rows.
///
/// Words on a line are separated by spaces, lines by newlines, and paragraphs
/// by a blank line.
fn element_text(rows: &[LayoutRow]) -> String {
    let mut text = String::new();
    let mut prev: Option<(u32, u32, u32)> = None;
    for row in rows.iter().filter(|row| row.level == Level::Word) {
        let word = row.text.trim();
        if word.is_empty() {
            continue;
        }
        let key = (row.block_num, row.par_num, row.line_num);
        match prev {
            Some(p) if (p.0, p.1) != (key.0, key.1) => text.push_str("\n\n"),
            Some(p) if p.2 != key.2 => text.push('\n'),
            Some(_) => text.push(' '),
            None => {}
        }
        text.push_str(word);
        prev = Some(key);
    }
    text
}

/// Walk the blocks of a page in reading order.
///
/// Fails if the layout cannot be traversed. Blocks with no text are skipped
/// and do not use up an index.
pub fn walk(page: &PageResult) -> Result<BlockSpans<'_>, ExtractError> {
    let mut cursor = page.layout.cursor();
    cursor.begin()?;
    Ok(BlockSpans {
        cursor,
        next_index: 1,
        done: false,
    })
}

/// Lazy sequence of [`BlockSpan`]s returned by [`walk`].
pub struct BlockSpans<'a> {
    cursor: LayoutCursor<'a>,
    next_index: usize,
    done: bool,
}

impl Iterator for BlockSpans<'_> {
    type Item = BlockSpan;

    fn next(&mut self) -> Option<BlockSpan> {
        while !self.done {
            let text = if self.cursor.is_at_beginning_of(Level::Block) {
                self.cursor
                    .text(Level::Block)
                    .map(|text| text.trim().to_owned())
                    .filter(|text| !text.is_empty())
            } else {
                None
            };
            if !self.cursor.next(Level::Block) {
                self.done = true;
            }
            if let Some(text) = text {
                let span = BlockSpan {
                    index: self.next_index,
                    text,
                };
                self.next_index += 1;
                return Some(span);
            }
        }
        None
    }
}


#[cfg(test)]
mod tests {
    use super::{test_support::tsv_for_blocks, *};

    /// Real `tesseract` TSV output for a page with two Arabic blocks, the
    /// first with two paragraphs.
    static ARABIC_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t1240\t1754\t-1\t
2\t1\t1\t0\t0\t0\t180\t140\t880\t120\t-1\t
3\t1\t1\t1\t0\t0\t180\t140\t880\t50\t-1\t
4\t1\t1\t1\t1\t0\t180\t140\t880\t50\t-1\t
5\t1\t1\t1\t1\t1\t880\t140\t180\t50\t96.5\tبسم
5\t1\t1\t1\t1\t2\t640\t140\t200\t50\t93.5\tالله
3\t1\t1\t2\t0\t0\t180\t210\t880\t50\t-1\t
4\t1\t1\t2\t1\t0\t180\t210\t880\t50\t-1\t
5\t1\t1\t2\t1\t1\t700\t210\t360\t50\t88\tالرحمن
2\t1\t2\t0\t0\t0\t180\t400\t880\t110\t-1\t
3\t1\t2\t1\t0\t0\t180\t400\t880\t110\t-1\t
4\t1\t2\t1\t1\t0\t180\t400\t880\t50\t-1\t
5\t1\t2\t1\t1\t1\t900\t400\t160\t50\t90\tمرحبا
4\t1\t2\t1\t2\t0\t180\t460\t880\t50\t-1\t
5\t1\t2\t1\t2\t1\t900\t460\t160\t50\t92\tبالعالم
";

    fn page(tsv: &str) -> PageResult {
        PageResult {
            full_text: String::new(),
            mean_confidence: 0.0,
            layout: PageLayout::from_tsv(tsv).unwrap(),
        }
    }

    #[test]
    fn parses_real_tsv() {
        let layout = PageLayout::from_tsv(ARABIC_TSV).unwrap();
        assert_eq!(layout.rows().len(), 15);
        assert_eq!(layout.rows()[0].level, Level::Page);
        assert_eq!(layout.rows()[4].text, "بسم");
        assert_eq!(layout.rows()[4].conf, 96.5);
        assert_eq!(layout.rows()[1].text, "");
    }

    #[test]
    fn mean_word_confidence_averages_words() {
        let layout = PageLayout::from_tsv(ARABIC_TSV).unwrap();
        let expected = (96.5 + 93.5 + 88.0 + 90.0 + 92.0) / 5.0 / 100.0;
        assert!((layout.mean_word_confidence() - expected).abs() < 1e-6);
        assert_eq!(PageLayout::default().mean_word_confidence(), 0.0);
    }

    #[test]
    fn walks_blocks_in_reading_order() {
        let page = page(ARABIC_TSV);
        let spans = walk(&page).unwrap().collect::<Vec<_>>();
        assert_eq!(
            spans,
            vec![
                BlockSpan {
                    index: 1,
                    text: "بسم الله\n\nالرحمن".to_owned(),
                },
                BlockSpan {
                    index: 2,
                    text: "مرحبا\nبالعالم".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn empty_blocks_do_not_use_an_index() {
        let page = page(&tsv_for_blocks(&["A", "", "  ", "B"]));
        let spans = walk(&page).unwrap().collect::<Vec<_>>();
        let indexed = spans
            .iter()
            .map(|s| (s.index, s.text.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(indexed, vec![(1, "A"), (2, "B")]);
    }

    #[test]
    fn empty_layout_has_no_spans() {
        let page = page("");
        assert_eq!(walk(&page).unwrap().count(), 0);
    }

    #[test]
    fn page_without_blocks_has_no_spans() {
        let page = page("1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n");
        assert_eq!(walk(&page).unwrap().count(), 0);
    }

    #[test]
    fn cursor_behaves_like_page_iterator() {
        let layout = PageLayout::from_tsv(ARABIC_TSV).unwrap();
        let mut cursor = layout.cursor();
        cursor.begin().unwrap();
        assert!(cursor.is_at_beginning_of(Level::Block));
        assert_eq!(cursor.text(Level::Line), None);
        assert!(cursor.next(Level::Paragraph));
        assert_eq!(cursor.text(Level::Paragraph).as_deref(), Some("بسم الله"));
        assert!(cursor.next(Level::Block));
        assert!(!cursor.next(Level::Block));
        assert!(!cursor.is_at_beginning_of(Level::Block));
        assert_eq!(cursor.text(Level::Block), None);
    }

    #[test]
    fn malformed_tsv_is_a_traversal_error() {
        let err = PageLayout::from_tsv("1\t1\t0\n").unwrap_err();
        assert!(matches!(err, ExtractError::Traversal(_)));

        let err = PageLayout::from_tsv("9\t1\t0\t0\t0\t0\t0\t0\t1\t1\t-1\t\n").unwrap_err();
        assert!(err.to_string().contains("unknown level 9"));

        let err = PageLayout::from_tsv("5\t1\t1\t1\t1\t1\t0\t0\t1\t1\thigh\tword\n")
            .unwrap_err();
        assert!(matches!(err, ExtractError::Traversal(_)));
        assert!(err.to_string().contains("TSV line 1"));
    }

    #[test]
    fn reads_tsv_without_header_by_position() {
        let tsv = ARABIC_TSV.split_once('\n').unwrap().1;
        assert_eq!(
            PageLayout::from_tsv(tsv).unwrap(),
            PageLayout::from_tsv(ARABIC_TSV).unwrap()
        );
    }

    #[test]
    fn tolerates_crlf_and_leading_quotes() {
        let tsv = ARABIC_TSV
            .replace("\tبسم\n", "\t\"قال\n")
            .replace('\n', "\r\n");
        let page = page(&tsv);
        assert_eq!(page.layout.rows().len(), 15);
        assert_eq!(page.layout.rows()[4].text, "\"قال");
        let spans = walk(&page).unwrap().collect::<Vec<_>>();
        assert_eq!(spans[0].text, "\"قال الله\n\nالرحمن");
        assert_eq!(spans[1].text, "مرحبا\nبالعالم");
    }

    #[test]
    fn short_rows_without_text_are_allowed() {
        let layout =
            PageLayout::from_tsv("1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\n").unwrap();
        assert_eq!(layout.rows()[0].level, Level::Page);
        assert_eq!(layout.rows()[0].text, "");
    }

    #[test]
    fn skipped_levels_fail_the_walk() {
        let tsv = "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
                   2\t1\t1\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\torphan\n";
        let page = page(tsv);
        let err = walk(&page).err().expect("walk should fail");
        assert!(matches!(err, ExtractError::Traversal(_)));
        assert!(err.to_string().contains("word directly after a block"));
    }

    #[test]
    fn layout_must_start_with_a_page() {
        let page = page("2\t1\t1\t0\t0\t0\t0\t0\t100\t100\t-1\t\n");
        assert!(walk(&page).is_err());
    }
}
