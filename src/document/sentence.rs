//! Sentence records

use super::token::Token;
use std::collections::BTreeMap;

/// An ordered run of tokens plus sentence-level metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    text: Option<String>,
    tokens: Vec<Token>,
    attributes: BTreeMap<String, String>,
}

impl Sentence {
    pub(crate) fn new(text: Option<String>) -> Self {
        Self {
            text: text.filter(|t| !t.trim().is_empty()),
            tokens: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub(crate) fn push(&mut self, token: Token) -> &mut Token {
        self.tokens.push(token);
        let last = self.tokens.len() - 1;
        &mut self.tokens[last]
    }

    pub(crate) fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Fix the sentence text once all tokens are in
    pub(crate) fn seal(&mut self) {
        if self.text.is_none() {
            let joined = self
                .tokens
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            self.text = Some(joined);
        }
    }

    /// Surface text of the sentence as the segmenting engine saw it
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
