//! In-memory document model shared by every engine
//!
//! A [`Document`] is what one engine call produces: sentences of tokens,
//! each token carrying its annotation columns. Token indices are global
//! and continuous across sentences; they are assigned by
//! [`DocumentBuilder`] and never change afterwards.

mod sentence;
mod token;

pub use sentence::Sentence;
pub use token::{AttrValue, Token};

/// Output of one engine invocation, normalized to the generic model
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    engine: String,
    job_id: String,
    /// Column names this document carries, in requested-step order
    columns: Vec<String>,
    sentences: Vec<Sentence>,
}

impl Document {
    /// Start building a document for the given engine and job
    pub fn builder(engine: impl Into<String>, job_id: impl Into<String>) -> DocumentBuilder {
        DocumentBuilder::new(engine, job_id)
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Plain sentence strings, the working data for later engines
    pub fn sentence_texts(&self) -> Vec<String> {
        self.sentences.iter().map(|s| s.text().to_string()).collect()
    }

    /// All tokens in document order
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.sentences.iter().flat_map(|s| s.tokens().iter())
    }

    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

/// Incremental constructor that assigns continuous token indices
#[derive(Debug)]
pub struct DocumentBuilder {
    engine: String,
    job_id: String,
    columns: Vec<String>,
    sentences: Vec<Sentence>,
    current: Option<Sentence>,
    next_index: usize,
}

impl DocumentBuilder {
    pub fn new(engine: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            job_id: job_id.into(),
            columns: Vec::new(),
            sentences: Vec::new(),
            current: None,
            next_index: 0,
        }
    }

    /// Declare the annotation columns tokens will carry
    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Open a new sentence, closing any open one.
    ///
    /// With `text = None` the sentence text is the space-joined tokens.
    pub fn begin_sentence(&mut self, text: Option<String>) -> &mut Self {
        self.end_sentence();
        self.current = Some(Sentence::new(text));
        self
    }

    /// Attach a sentence-level attribute to the open sentence
    pub fn sentence_attr(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        if let Some(sentence) = self.current.as_mut() {
            sentence.set_attribute(name, value);
        }
        self
    }

    /// Append a token to the open sentence (opening one if needed)
    pub fn token(&mut self, text: impl Into<String>) -> &mut Token {
        let index = self.next_index;
        self.next_index += 1;
        let sentence = self.current.get_or_insert_with(|| Sentence::new(None));
        sentence.push(Token::new(index, text))
    }

    /// Close the open sentence. Sentences without tokens are dropped.
    pub fn end_sentence(&mut self) -> &mut Self {
        if let Some(mut sentence) = self.current.take() {
            if !sentence.is_empty() {
                sentence.seal();
                self.sentences.push(sentence);
            }
        }
        self
    }

    pub fn finish(mut self) -> Document {
        self.end_sentence();
        Document {
            engine: self.engine,
            job_id: self.job_id,
            columns: self.columns,
            sentences: self.sentences,
        }
    }
}
