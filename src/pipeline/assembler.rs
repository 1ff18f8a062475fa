//! Output assembler: documents to VRT lines
//!
//! The sentence-level pass fixes sentence boundaries, token indices and
//! token texts. Token-level passes only add or overwrite named columns on
//! the existing token lines and must align with them index for index.

use crate::document::Document;
use crate::error::{AnnotatorError, AnnotatorResult};
use tracing::warn;

/// Prefix of the comment line that names the columns
const LEGEND_PREFIX: &str = "idx word";

/// One token line: index, surface text, and named columns in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLine {
    pub index: usize,
    pub text: String,
    columns: Vec<(String, String)>,
}

impl TokenLine {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            columns: Vec::new(),
        }
    }

    /// Set a column, overwriting in place if the name already exists
    pub fn set_column(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.columns.push((name.to_string(), value)),
        }
    }

    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }

    /// Number of space-separated fields when rendered
    pub fn field_count(&self) -> usize {
        2 + self.columns.len()
    }

    fn render(&self) -> String {
        let mut line = format!("{} {}", self.index, field(&self.text));
        for (_, value) in &self.columns {
            line.push(' ');
            line.push_str(value);
        }
        line
    }
}

/// Keep surface text a single column
fn field(text: &str) -> String {
    let cleaned: String = text
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Comment(String),
    ParagraphOpen,
    SentenceOpen,
    Token(TokenLine),
    SentenceClose,
    ParagraphClose,
}

impl Line {
    pub fn render(&self) -> String {
        match self {
            Line::Comment(text) => format!("! {}", text),
            Line::SentenceOpen => "<s>".to_string(),
            Line::Token(token) => token.render(),
            Line::SentenceClose => "</s>".to_string(),
            Line::ParagraphOpen => "<p>".to_string(),
            Line::ParagraphClose => "</p>".to_string(),
        }
    }
}

/// Ordered VRT lines plus the column names they carry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineList {
    lines: Vec<Line>,
    columns: Vec<String>,
}

impl LineList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Column names in rendering order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn token_lines(&self) -> impl Iterator<Item = &TokenLine> {
        self.lines.iter().filter_map(|line| match line {
            Line::Token(token) => Some(token),
            _ => None,
        })
    }

    /// Index of the last token, if any
    pub fn last_index(&self) -> Option<usize> {
        self.token_lines().map(|t| t.index).max()
    }

    /// Index the next chunk should start at
    pub fn next_index(&self) -> usize {
        self.last_index().map_or(0, |i| i + 1)
    }

    pub fn sentence_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, Line::SentenceOpen))
            .count()
    }

    /// Token count of every sentence, in order
    pub fn sentence_lengths(&self) -> Vec<usize> {
        let mut lengths = Vec::new();
        for line in &self.lines {
            match line {
                Line::SentenceOpen => lengths.push(0),
                Line::Token(_) => {
                    if let Some(last) = lengths.last_mut() {
                        *last += 1;
                    }
                }
                _ => {}
            }
        }
        lengths
    }

    /// Enclose every sentence in one paragraph; comment lines stay in front.
    /// A list without sentences is left as is.
    pub fn wrap_paragraph(&mut self) {
        if self.sentence_count() == 0 {
            return;
        }
        let at = self
            .lines
            .iter()
            .position(|l| !matches!(l, Line::Comment(_)))
            .unwrap_or(self.lines.len());
        self.lines.insert(at, Line::ParagraphOpen);
        self.lines.push(Line::ParagraphClose);
    }

    /// Append another list's sentences, dropping its comment lines
    pub fn append(&mut self, other: LineList) {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self.lines
            .extend(other.lines.into_iter().filter(|l| !matches!(l, Line::Comment(_))));
        self.refresh_legend();
    }

    /// Render every line, each terminated by `\n`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.render());
            out.push('\n');
        }
        out
    }

    fn add_columns(&mut self, columns: &[String]) {
        for column in columns {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        self.refresh_legend();
    }

    fn legend(&self) -> String {
        let mut legend = LEGEND_PREFIX.to_string();
        for column in &self.columns {
            legend.push(' ');
            legend.push_str(column);
        }
        legend
    }

    fn refresh_legend(&mut self) {
        let legend = self.legend();
        for line in &mut self.lines {
            if let Line::Comment(text) = line {
                if text.starts_with(LEGEND_PREFIX) {
                    *text = legend;
                    return;
                }
            }
        }
    }
}

/// Build sentence-delimited lines for a freshly segmented document.
///
/// Token indices are shifted by `start` so chunks of a larger input keep
/// one continuous numbering.
pub fn assemble_sentence_level(document: &Document, start: usize) -> LineList {
    let mut list = LineList::new();
    list.columns = document.columns().to_vec();
    let legend = list.legend();
    list.lines.push(Line::Comment(format!(
        "{} output for {}",
        document.engine(),
        document.job_id()
    )));
    list.lines.push(Line::Comment(legend));

    for sentence in document.sentences() {
        list.lines.push(Line::SentenceOpen);
        for token in sentence.tokens() {
            let mut line = TokenLine::new(start + token.index, token.text.clone());
            for column in document.columns() {
                let value = token
                    .attribute(column)
                    .map(|v| v.render())
                    .unwrap_or_else(|| "_".to_string());
                line.set_column(column, value);
            }
            list.lines.push(Line::Token(line));
        }
        list.lines.push(Line::SentenceClose);
    }
    list
}

/// Merge a pretokenized pass's columns into existing lines.
///
/// Sentence and token counts must match the existing segmentation
/// exactly; any divergence is an alignment error naming the first
/// offending sentence.
pub fn assemble_token_level(mut lines: LineList, document: &Document) -> AnnotatorResult<LineList> {
    let expected = lines.sentence_lengths();
    let sentences = document.sentences();
    let engine = document.engine();

    for (i, expected_len) in expected.iter().enumerate() {
        let found = sentences.get(i).map_or(0, |s| s.len());
        if found != *expected_len {
            return Err(AnnotatorError::Alignment {
                engine: engine.to_string(),
                sentence: i,
                expected: *expected_len,
                found,
            });
        }
    }
    if sentences.len() > expected.len() {
        return Err(AnnotatorError::Alignment {
            engine: engine.to_string(),
            sentence: expected.len(),
            expected: 0,
            found: sentences[expected.len()].len(),
        });
    }

    let columns = document.columns();
    let mut new_tokens = sentences.iter().flat_map(|s| s.tokens());
    for line in &mut lines.lines {
        let Line::Token(existing) = line else {
            continue;
        };
        let Some(token) = new_tokens.next() else {
            break;
        };
        if token.text != existing.text {
            warn!(
                engine,
                index = existing.index,
                expected = %existing.text,
                found = %token.text,
                "token text differs from segmentation"
            );
        }
        for column in columns {
            let value = token
                .attribute(column)
                .map(|v| v.render())
                .unwrap_or_else(|| "_".to_string());
            existing.set_column(column, value);
        }
    }
    lines.add_columns(columns);
    Ok(lines)
}
