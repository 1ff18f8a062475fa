//! Attribute accumulators handed to the corpus encoder

use super::assembler::LineList;

/// Ordered, duplicate-free list of attribute names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    names: Vec<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name unless already present
    pub fn push(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    /// Add names in order, skipping ones already present
    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.push(name);
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TagSet::new();
        set.extend(iter);
        set
    }
}

/// Result of one orchestrated run.
///
/// `ptags` are the positional (token-level) attributes contributed by the
/// annotation passes; `stags` are the structural attributes captured once
/// when segmentation was established.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedOutput {
    pub lines: LineList,
    pub ptags: TagSet,
    pub stags: TagSet,
}

impl AccumulatedOutput {
    /// Render the whole output as VRT text
    pub fn render(&self) -> String {
        self.lines.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_set_keeps_first_occurrence_order() {
        let mut tags = TagSet::new();
        tags.extend(["pos", "lemma"]);
        tags.extend(["lemma", "ner", "pos"]);
        assert_eq!(tags.names(), &["pos", "lemma", "ner"]);
        assert!(tags.contains("ner"));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn collect_deduplicates() {
        let tags: TagSet = vec!["s", "s"].into_iter().collect();
        assert_eq!(tags.names(), &["s"]);
    }
}
