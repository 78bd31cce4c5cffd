//! crates/maker_price_core/src/advice.rs
//!
//! The structured-text parser for advice responses. The remote adviser
//! returns loosely-formatted text; this module turns it into an ordered
//! sequence of titled sections of typed blocks so both the screen renderer
//! and the print report can consume it.
//!
//! The parser is a deterministic single-pass line scanner: it maintains a
//! current section (starting from an implicit "Advice" section) and two
//! pending list buffers, and flushes them on the boundaries described below.

use serde::Serialize;

/// The implicit title of the leading section when the text opens without
/// a heading.
pub const DEFAULT_SECTION_TITLE: &str = "Advice";

/// Plain-text lines the adviser uses as headings without markdown syntax.
/// Matched case-insensitively against the whole line, with an optional
/// trailing colon.
const PLAIN_HEADINGS: &[&str] = &[
    "Summary",
    "What Looks Good",
    "What To Adjust (Most Important First)",
    "What To Adjust",
    "One Next Step",
    "Where You Are Now",
    "Highest Leverage Steps",
    "Risks Or Gaps",
    "Suggested Price Guidance",
    "Best Fit Direction",
    "Why It Fits",
    "A Simple First Plan",
];

/// One renderable unit inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Block {
    #[serde(rename = "p")]
    Paragraph { text: String },
    #[serde(rename = "ul")]
    UnorderedList { items: Vec<String> },
    #[serde(rename = "ol")]
    OrderedList { items: Vec<String> },
}

/// A titled run of blocks, in encounter order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub blocks: Vec<Block>,
}

/// Parses raw advice text into sections.
///
/// Empty blocks are dropped, and a finalized section with no blocks is
/// dropped unless it is the sole section the input produced. If the input
/// is non-empty but no headings are recognized and no section survives,
/// the whole text becomes one paragraph under the default title. Empty or
/// whitespace-only input yields an empty sequence.
pub fn parse_advice(input: &str) -> Vec<Section> {
    let text = input.replace("\r\n", "\n");
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut scanner = Scanner::new();
    for line in text.split('\n') {
        scanner.feed(line.trim());
    }
    scanner.finish(text)
}

struct Scanner {
    sections: Vec<Section>,
    // Empty sections are pruned at finalize time; the titles are kept so a
    // sole heading with no body can still surface as its own section.
    pruned: Vec<Section>,
    current: Section,
    unordered: Vec<String>,
    ordered: Vec<String>,
    saw_heading: bool,
}

impl Scanner {
    fn new() -> Self {
        Self {
            sections: Vec::new(),
            pruned: Vec::new(),
            current: Section {
                title: DEFAULT_SECTION_TITLE.to_string(),
                blocks: Vec::new(),
            },
            unordered: Vec::new(),
            ordered: Vec::new(),
            saw_heading: false,
        }
    }

    /// Consumes one trimmed line. Heading recognition takes priority over
    /// list and paragraph recognition.
    fn feed(&mut self, line: &str) {
        if let Some(title) = markdown_heading(line).or_else(|| plain_heading(line)) {
            let title = title.to_string();
            self.flush_lists();
            self.finalize_section();
            self.current = Section {
                title,
                blocks: Vec::new(),
            };
            self.saw_heading = true;
            return;
        }

        // A blank line ends any running list but not the section.
        if line.is_empty() {
            self.flush_lists();
            return;
        }

        if let Some(item) = unordered_item(line) {
            // Lists do not interleave: starting one kind closes the other.
            if !self.ordered.is_empty() {
                self.flush_lists();
            }
            self.unordered.push(item.to_string());
            return;
        }

        if let Some(item) = ordered_item(line) {
            if !self.unordered.is_empty() {
                self.flush_lists();
            }
            self.ordered.push(item.to_string());
            return;
        }

        self.flush_lists();
        self.current.blocks.push(Block::Paragraph {
            text: line.to_string(),
        });
    }

    fn flush_lists(&mut self) {
        if !self.unordered.is_empty() {
            self.current.blocks.push(Block::UnorderedList {
                items: std::mem::take(&mut self.unordered),
            });
        }
        if !self.ordered.is_empty() {
            self.current.blocks.push(Block::OrderedList {
                items: std::mem::take(&mut self.ordered),
            });
        }
    }

    fn finalize_section(&mut self) {
        let next = Section {
            title: DEFAULT_SECTION_TITLE.to_string(),
            blocks: Vec::new(),
        };
        let mut section = std::mem::replace(&mut self.current, next);

        section.blocks.retain(|block| match block {
            Block::Paragraph { text } => !text.trim().is_empty(),
            Block::UnorderedList { items } | Block::OrderedList { items } => !items.is_empty(),
        });

        if !section.blocks.is_empty() {
            self.sections.push(section);
        } else if section.title != DEFAULT_SECTION_TITLE {
            self.pruned.push(section);
        }
    }

    fn finish(mut self, raw_text: &str) -> Vec<Section> {
        self.flush_lists();
        self.finalize_section();

        if !self.sections.is_empty() {
            return self.sections;
        }

        // No section carried content. A single bare heading still stands as
        // its own (empty) section; otherwise fall back to the raw text as
        // one paragraph under the default title.
        if self.pruned.len() == 1 {
            return self.pruned;
        }
        if !self.saw_heading {
            return vec![Section {
                title: DEFAULT_SECTION_TITLE.to_string(),
                blocks: vec![Block::Paragraph {
                    text: raw_text.to_string(),
                }],
            }];
        }
        Vec::new()
    }
}

/// Matches a markdown-style heading: 1-6 `#` characters followed by
/// whitespace and the title text.
fn markdown_heading(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    match rest.chars().next() {
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        _ => None,
    }
}

/// Matches a whole line against the plain-heading vocabulary. The returned
/// title keeps the input's casing, with any trailing colon stripped.
fn plain_heading(line: &str) -> Option<&str> {
    let candidate = match line.strip_suffix(':') {
        Some(before_colon) => before_colon.trim_end(),
        None => line,
    };
    if candidate.is_empty() {
        return None;
    }
    PLAIN_HEADINGS
        .iter()
        .any(|heading| heading.eq_ignore_ascii_case(candidate))
        .then_some(candidate)
}

/// Matches `- item` or `* item`.
fn unordered_item(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))?;
    match rest.chars().next() {
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        _ => None,
    }
}

/// Matches `1. item` (any digit run, a dot, then whitespace).
fn ordered_item(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    match rest.chars().next() {
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        _ => None,
    }
}
