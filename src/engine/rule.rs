//! Rule-based sentence splitter and tokenizer
//!
//! Runs in-process with no model. Sentences end at `.`, `!` or `?`
//! (plus any closing quotes or brackets) followed by whitespace, and at
//! blank lines. Tokens are whitespace-separated words with leading and
//! trailing punctuation split off.

use super::traits::Engine;
use super::types::{Capability, EngineHandle, EngineInput, JobRequest, RawResult};
use crate::document::Document;
use crate::error::{AnnotatorError, AnnotatorResult};
use async_trait::async_trait;

const CAPABILITIES: &[Capability] = &[
    Capability::structural("sentencize", &["senter", "sentencizer"]),
    Capability::structural("tokenize", &["tokenizer"]),
];

/// Words whose trailing period does not end a sentence
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "vs", "etc", "e.g", "i.e", "cf", "no", "fig", "z.b",
    "bzw", "usw", "vgl", "ca", "nr",
];

const TERMINATORS: &[char] = &['.', '!', '?'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '»', '”', '’'];
const OPENERS: &[char] = &['"', '\'', '(', '[', '{', '«', '“', '‘'];

/// One sentence: its text and tokens
type RuleSentence = (String, Vec<String>);

/// Capitalized words that commonly open a sentence
const SENTENCE_OPENERS: &[&str] = &[
    "a", "an", "the", "i", "it", "he", "she", "we", "they", "you", "this", "that", "these",
    "those", "there", "then", "but", "and", "so", "if", "when", "in", "on", "at", "my", "his",
    "her", "our", "their", "its", "der", "die", "das", "ich", "es", "er", "sie", "wir",
];

fn bare(word: &str) -> String {
    word.trim_start_matches(OPENERS)
        .trim_end_matches(CLOSERS)
        .trim_end_matches('.')
        .to_lowercase()
}

fn is_abbreviation(word: &str) -> bool {
    ABBREVIATIONS.contains(&bare(word).as_str())
}

fn starts_uppercase(word: &str) -> bool {
    word.trim_start_matches(OPENERS)
        .chars()
        .next()
        .is_some_and(char::is_uppercase)
}

/// A single capital letter with a period
fn is_letter_period(word: &str) -> bool {
    let core = word.trim_start_matches(OPENERS);
    let mut chars = core.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(c), Some('.'), None) if c.is_uppercase()
    )
}

/// Whether `words[i]` is a name initial rather than a sentence end.
///
/// `first` is the index of the first word of the current sentence.
fn is_initial(words: &[&str], i: usize, first: usize) -> bool {
    if !is_letter_period(words[i]) {
        return false;
    }
    if i == first {
        return true;
    }
    let prev = words[i - 1];
    if is_letter_period(prev) {
        return true;
    }
    if starts_uppercase(prev) {
        return i - 1 > first;
    }
    match words.get(i + 1) {
        Some(next) => {
            starts_uppercase(next) && !SENTENCE_OPENERS.contains(&bare(next).as_str())
        }
        None => false,
    }
}

/// Split raw text into sentence strings
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for paragraph in text.split("\n\n") {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let mut first = 0;
        for (i, word) in words.iter().enumerate() {
            let core = word.trim_end_matches(CLOSERS);
            let ends = core.ends_with(TERMINATORS);
            let abbreviated = core.ends_with('.')
                && !core.ends_with("..")
                && (is_abbreviation(core) || is_initial(&words, i, first));
            if ends && !abbreviated {
                sentences.push(words[first..=i].join(" "));
                first = i + 1;
            }
        }
        if first < words.len() {
            sentences.push(words[first..].join(" "));
        }
    }
    sentences
}

/// Split one sentence into tokens
pub fn tokenize(sentence: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let words: Vec<&str> = sentence.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        // an initial keeps its period unless it closes the sentence
        let keeps_period = |w: &str| is_abbreviation(w) || (i + 1 < words.len() && is_letter_period(w));
        let mut rest = *word;
        while let Some(c) = rest.chars().next().filter(|c| is_split_punct(*c)) {
            tokens.push(c.to_string());
            rest = &rest[c.len_utf8()..];
        }

        let mut trailing = Vec::new();
        while let Some(c) = rest.chars().last().filter(|c| is_split_punct(*c)) {
            if c == '.' && trailing.is_empty() && rest.len() > 1 && keeps_period(rest) {
                break;
            }
            trailing.push(c.to_string());
            rest = &rest[..rest.len() - c.len_utf8()];
        }

        if !rest.is_empty() {
            tokens.push(rest.to_string());
        }
        tokens.extend(trailing.into_iter().rev());
    }
    tokens
}

fn is_split_punct(c: char) -> bool {
    TERMINATORS.contains(&c)
        || CLOSERS.contains(&c)
        || OPENERS.contains(&c)
        || matches!(c, ',' | ';' | ':')
}

/// Native engine for sentence splitting and tokenization
#[derive(Debug, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Engine for RuleEngine {
    fn id(&self) -> &str {
        "rule"
    }

    fn name(&self) -> &str {
        "Rule-based tokenizer"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle> {
        let steps = self.resolve_steps(job, "rule")?;
        Ok(EngineHandle::new(job.clone(), "rule", steps, ()))
    }

    async fn apply(&self, _handle: &mut EngineHandle, input: EngineInput) -> AnnotatorResult<RawResult> {
        let sentences: Vec<String> = match &input {
            EngineInput::Text(text) => split_sentences(text),
            EngineInput::Sentences(units) => units.iter().map(|u| u.trim().to_string()).collect(),
        };
        let output: Vec<RuleSentence> = sentences
            .into_iter()
            .map(|s| {
                let tokens = tokenize(&s);
                (s, tokens)
            })
            .collect();
        Ok(RawResult::new(&input, output))
    }

    fn normalize(&self, handle: &EngineHandle, raw: RawResult) -> AnnotatorResult<Document> {
        let sentences = raw
            .data::<Vec<RuleSentence>>()
            .ok_or_else(|| AnnotatorError::EngineInvocation {
                engine: self.id().to_string(),
                reason: "raw result was not produced by this engine".to_string(),
            })?;
        let mut builder = Document::builder(self.id(), &handle.job.job_id);
        for (text, tokens) in sentences {
            builder.begin_sentence(Some(text.clone()));
            for token in tokens {
                builder.token(token.as_str());
            }
        }
        Ok(builder.finish())
    }
}
