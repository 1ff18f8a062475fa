//! Token records and their annotation values

use serde::{Deserialize, Serialize};

/// Value of one annotation column for one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Single(String),
    /// Several values for one layer (e.g. overlapping entity labels)
    Multi(Vec<String>),
}

impl AttrValue {
    /// Render as one VRT column.
    ///
    /// Empty values become `_`, multi-values are joined with `|`, and
    /// whitespace is replaced so a value always stays a single column.
    pub fn render(&self) -> String {
        let raw = match self {
            AttrValue::Single(s) => s.clone(),
            AttrValue::Multi(values) => values
                .iter()
                .filter(|v| !v.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("|"),
        };
        let cleaned: String = raw
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
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Single(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Single(s)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(values: Vec<String>) -> Self {
        AttrValue::Multi(values)
    }
}

/// A single token: global index, surface text, and named annotations
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Zero-based index, continuous across the whole input
    pub index: usize,
    /// Surface text
    pub text: String,
    /// Annotation columns in insertion order
    attributes: Vec<(String, AttrValue)>,
}

impl Token {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            attributes: Vec::new(),
        }
    }

    /// Set a named annotation, overwriting in place if it already exists
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_handles_empty_multi_and_whitespace() {
        assert_eq!(AttrValue::from("NOUN").render(), "NOUN");
        assert_eq!(AttrValue::from("").render(), "_");
        assert_eq!(AttrValue::from("New York").render(), "New_York");
        assert_eq!(
            AttrValue::from(vec!["PERSON".to_string(), "ORG".to_string()]).render(),
            "PERSON|ORG"
        );
        assert_eq!(AttrValue::Multi(vec![]).render(), "_");
    }

    #[test]
    fn set_overwrites_without_reordering() {
        let mut token = Token::new(0, "ran");
        token.set("pos", "VERB").set("lemma", "runs");
        token.set("lemma", "run");
        let names: Vec<&str> = token.attributes().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["pos", "lemma"]);
        assert_eq!(token.attribute("lemma"), Some(&AttrValue::from("run")));
    }
}
