//! spaCy engine adapter
//!
//! Runs spaCy pipelines through the bridge. The requested steps select
//! pipeline components; every component the model has but the job did not
//! request is excluded when the model is loaded.

use super::bridge::{decode_docs, ensure_components, BridgeLauncher, BridgeSession};
use super::traits::Engine;
use super::types::{Capability, EngineHandle, EngineInput, JobRequest, Layer, RawResult, ResolvedStep};
use crate::document::{AttrValue, Document};
use crate::error::{AnnotatorError, AnnotatorResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

const CAPABILITIES: &[Capability] = &[
    Capability::structural("tokenize", &["tokenizer"]),
    Capability::structural("tok2vec", &[]),
    Capability::structural("transformer", &[]),
    Capability::structural("senter", &["sentencize"]),
    Capability::structural("sentencizer", &[]),
    Capability::layer("tagger", &["tag"], Layer::Tag),
    Capability::layer("attribute_ruler", &["pos", "upos"], Layer::Pos),
    Capability::layer("morphologizer", &["morph"], Layer::Morph),
    Capability::layer("parser", &["parse", "dep"], Layer::Dep),
    Capability::layer("lemmatizer", &["lemma"], Layer::Lemma),
    Capability::layer("ner", &[], Layer::Ner),
    Capability::layer("entity_ruler", &["ruler"], Layer::Ruler),
    Capability::layer("entity_linker", &["linker"], Layer::Linker),
];

/// Steps that are not pipeline components
const IMPLICIT: &[&str] = &["tokenize"];

/// Components a requested component reads from; kept loaded when present
const REQUIRES: &[(&str, &[&str])] = &[("attribute_ruler", &["tagger"])];

fn required_by(steps: &[ResolvedStep], component: &str) -> bool {
    REQUIRES
        .iter()
        .filter(|(native, _)| steps.iter().any(|s| s.native == *native))
        .any(|(_, needs)| needs.contains(&component))
}

/// Default model for a language and text type
pub fn default_model(language: &str, text_type: &str) -> Option<&'static str> {
    match (language, text_type) {
        ("en", "news") => Some("en_core_web_md"),
        ("en", "biomed") => Some("en_core_sci_md"),
        ("de", "news") => Some("de_core_news_md"),
        _ => None,
    }
}

/// Link to the model's page, listing its component names
fn model_page(model: &str) -> Option<String> {
    let lang = model.split('_').next().filter(|l| l.len() == 2)?;
    Some(format!("https://spacy.io/models/{}#{}", lang, model))
}

/// One token as serialized by the bridge
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SpacyToken {
    text: String,
    /// Trailing whitespace
    ws: String,
    tag: String,
    pos: String,
    morph: String,
    lemma: String,
    dep: String,
    ent_iob: String,
    ent_type: String,
    ent_kb_id: String,
    /// Label assigned by a pattern-based entity ruler
    ruler: String,
    is_sent_start: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SpacyDoc {
    tokens: Vec<SpacyToken>,
}

impl SpacyToken {
    fn value(&self, layer: Layer) -> AttrValue {
        match layer {
            Layer::Tag => self.tag.as_str().into(),
            Layer::Pos => self.pos.as_str().into(),
            Layer::Morph => self.morph.as_str().into(),
            Layer::Dep => self.dep.as_str().into(),
            Layer::Lemma => self.lemma.as_str().into(),
            Layer::Ner => {
                if self.ent_type.is_empty() || self.ent_iob == "O" {
                    AttrValue::Multi(Vec::new())
                } else {
                    AttrValue::Multi(vec![format!("{}-{}", self.ent_iob, self.ent_type)])
                }
            }
            Layer::Ruler => self.ruler.as_str().into(),
            Layer::Linker => self.ent_kb_id.as_str().into(),
        }
    }

    fn is_space(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Engine adapter for spaCy pipelines
pub struct SpacyEngine {
    launcher: Arc<dyn BridgeLauncher>,
}

impl SpacyEngine {
    pub fn new(launcher: Arc<dyn BridgeLauncher>) -> Self {
        Self { launcher }
    }

    fn resolve_model(&self, job: &JobRequest) -> AnnotatorResult<String> {
        if let Some(model) = &job.model {
            return Ok(model.clone());
        }
        let text_type = job.text_type.as_deref().unwrap_or("news");
        default_model(&job.language, text_type)
            .map(str::to_string)
            .ok_or_else(|| {
                AnnotatorError::Configuration(format!(
                    "no default spaCy model for language '{}' and text type '{}'; set a model",
                    job.language, text_type
                ))
            })
    }
}

#[async_trait]
impl Engine for SpacyEngine {
    fn id(&self) -> &str {
        "spacy"
    }

    fn name(&self) -> &str {
        "spaCy"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle> {
        let model = self.resolve_model(job)?;
        let steps = self.resolve_steps(job, &model)?;

        let (mut session, components) =
            BridgeSession::open(self.launcher.as_ref(), self.id(), &model, &job.language).await?;
        ensure_components(self.id(), &model, &steps, &components, IMPLICIT, model_page(&model))?;

        let exclude: Vec<&String> = components
            .iter()
            .filter(|c| !steps.iter().any(|s| s.native == c.as_str()) && !required_by(&steps, c.as_str()))
            .collect();
        info!(model = %model, ?exclude, "loading spaCy pipeline");

        session
            .load(
                &model,
                json!({
                    "model": model,
                    "exclude": exclude,
                    "device": job.device.as_str(),
                    "config": job.options,
                }),
            )
            .await?;

        Ok(EngineHandle::new(job.clone(), model, steps, session))
    }

    async fn apply(&self, handle: &mut EngineHandle, input: EngineInput) -> AnnotatorResult<RawResult> {
        let session = handle
            .state_mut::<BridgeSession>()
            .ok_or_else(|| AnnotatorError::EngineInvocation {
                engine: self.id().to_string(),
                reason: "handle was not built by this engine".to_string(),
            })?;

        // one doc per unit: pre-segmented sentences are never re-split
        let docs = match &input {
            EngineInput::Text(text) => session.annotate(std::slice::from_ref(text), false).await?,
            EngineInput::Sentences(sentences) => session.annotate(sentences, true).await?,
        };
        let docs: Vec<SpacyDoc> = decode_docs(self.id(), docs)?;
        debug!(docs = docs.len(), "spaCy returned");
        Ok(RawResult::new(&input, docs))
    }

    fn normalize(&self, handle: &EngineHandle, raw: RawResult) -> AnnotatorResult<Document> {
        let docs = raw
            .data::<Vec<SpacyDoc>>()
            .ok_or_else(|| AnnotatorError::EngineInvocation {
                engine: self.id().to_string(),
                reason: "raw result was not produced by this engine".to_string(),
            })?;
        let layers: Vec<(&str, Layer)> = handle.layers().collect();
        let mut builder = Document::builder(self.id(), &handle.job.job_id).columns(handle.columns());

        if raw.pretokenized {
            if docs.len() != raw.units.len() {
                return Err(AnnotatorError::EngineInvocation {
                    engine: self.id().to_string(),
                    reason: format!(
                        "returned {} docs for {} pre-segmented sentences",
                        docs.len(),
                        raw.units.len()
                    ),
                });
            }
            for (doc, unit) in docs.iter().zip(&raw.units) {
                builder.begin_sentence(Some(unit.clone()));
                push_tokens(&mut builder, doc.tokens.iter(), &layers);
            }
            return Ok(builder.finish());
        }

        for doc in docs {
            for sentence in split_sentences(&doc.tokens) {
                let text: String = sentence
                    .iter()
                    .map(|t| format!("{}{}", t.text, t.ws))
                    .collect();
                builder.begin_sentence(Some(text.trim().to_string()));
                push_tokens(&mut builder, sentence.iter(), &layers);
            }
        }
        Ok(builder.finish())
    }
}

fn push_tokens<'a>(
    builder: &mut crate::document::DocumentBuilder,
    tokens: impl Iterator<Item = &'a SpacyToken>,
    layers: &[(&str, Layer)],
) {
    for token in tokens.filter(|t| !t.is_space()) {
        let record = builder.token(token.text.as_str());
        for (column, layer) in layers {
            record.set(*column, token.value(*layer));
        }
    }
}

/// Group tokens by sentence-start flags; the first token always opens one
fn split_sentences(tokens: &[SpacyToken]) -> Vec<&[SpacyToken]> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if i > start && token.is_sent_start == Some(true) {
            sentences.push(&tokens[start..i]);
            start = i;
        }
    }
    if start < tokens.len() {
        sentences.push(&tokens[start..]);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bridge::ScriptedBridge;

    fn token(text: &str, ws: &str, start: bool, lemma: &str) -> serde_json::Value {
        json!({
            "text": text, "ws": ws, "tag": "NN", "lemma": lemma,
            "ent_iob": "O", "is_sent_start": start,
        })
    }

    fn script() -> ScriptedBridge {
        ScriptedBridge::new()
            .with_response(
                "inspect",
                json!({ "components": ["tok2vec", "tagger", "parser", "lemmatizer", "ner"] }),
            )
            .with_response("load", json!({}))
    }

    #[tokio::test]
    async fn build_excludes_unrequested_components() {
        let script = script();
        let engine = SpacyEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("spacy", "job", vec!["tokenize".into(), "lemma".into()]);

        let handle = engine.build(&job).await.unwrap();
        assert_eq!(handle.model, "en_core_web_md");
        assert_eq!(handle.columns(), vec!["lemma"]);

        let load = &script.calls_to("load")[0];
        let exclude: Vec<&str> = load.params["exclude"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(exclude, vec!["tok2vec", "tagger", "parser", "ner"]);
    }

    #[tokio::test]
    async fn pos_is_the_coarse_tag_and_keeps_the_tagger() {
        let script = ScriptedBridge::new()
            .with_response(
                "inspect",
                json!({ "components": ["tok2vec", "tagger", "parser", "attribute_ruler", "ner"] }),
            )
            .with_response("load", json!({}))
            .with_response(
                "annotate",
                json!({ "docs": [{ "tokens": [
                    { "text": "Dogs", "ws": " ", "tag": "NNS", "pos": "NOUN", "is_sent_start": true },
                    { "text": "bark", "ws": "", "tag": "VBP", "pos": "VERB" },
                ]}]}),
            );
        let engine = SpacyEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("spacy", "job", vec!["pos".into(), "tag".into()]);
        let mut handle = engine.build(&job).await.unwrap();

        let load = &script.calls_to("load")[0];
        assert_eq!(load.params["exclude"], json!(["tok2vec", "parser", "ner"]));

        let raw = engine
            .apply(&mut handle, EngineInput::Text("Dogs bark".into()))
            .await
            .unwrap();
        let doc = engine.normalize(&handle, raw).unwrap();
        let dogs = &doc.sentences()[0].tokens()[0];
        assert_eq!(dogs.attribute("pos").unwrap().render(), "NOUN");
        assert_eq!(dogs.attribute("tag").unwrap().render(), "NNS");
    }

    #[tokio::test]
    async fn build_rejects_component_missing_from_model() {
        let engine = SpacyEngine::new(Arc::new(script()));
        let job = JobRequest::new("spacy", "job", vec!["morph".into()]);
        let err = engine.build(&job).await.unwrap_err();
        match err {
            AnnotatorError::UnsupportedStep { step, model, hint, .. } => {
                assert_eq!(step, "morph");
                assert_eq!(model, "en_core_web_md");
                assert_eq!(
                    hint.as_deref(),
                    Some("https://spacy.io/models/en#en_core_web_md")
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn build_without_default_model_is_configuration_error() {
        let engine = SpacyEngine::new(Arc::new(script()));
        let job = JobRequest::new("spacy", "job", vec![]).with_language("fi");
        assert!(engine.build(&job).await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn raw_text_is_split_on_sentence_starts() {
        let script = script().with_response(
            "annotate",
            json!({ "docs": [{ "tokens": [
                token("Dogs", " ", true, "dog"),
                token("bark", "", false, "bark"),
                token(".", " ", false, "."),
                token("Cats", " ", true, "cat"),
                token("meow", "", false, "meow"),
                token(".", "", false, "."),
            ]}]}),
        );
        let engine = SpacyEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("spacy", "job", vec!["lemma".into()]);
        let mut handle = engine.build(&job).await.unwrap();
        let raw = engine
            .apply(&mut handle, EngineInput::Text("Dogs bark. Cats meow.".into()))
            .await
            .unwrap();
        let doc = engine.normalize(&handle, raw).unwrap();

        assert_eq!(doc.sentence_texts(), vec!["Dogs bark.", "Cats meow."]);
        assert_eq!(doc.token_count(), 6);
        let cats = &doc.sentences()[1].tokens()[0];
        assert_eq!(cats.index, 3);
        assert_eq!(cats.attribute("lemma"), Some(&AttrValue::from("cat")));
        assert_eq!(script.calls_to("annotate")[0].params["no_ssplit"], false);
    }

    #[tokio::test]
    async fn pretokenized_units_stay_single_sentences() {
        // the engine flags a second sentence start inside the unit; it must be ignored
        let script = script().with_response(
            "annotate",
            json!({ "docs": [
                { "tokens": [token("Mr.", " ", true, "mr."), token("Smith", "", true, "smith")] },
                { "tokens": [token("Hi", "", true, "hi"), token("\n", "", false, "\n")] },
            ]}),
        );
        let engine = SpacyEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("spacy", "job", vec!["ner".into()]).pretokenized(true);
        let mut handle = engine.build(&job).await.unwrap();
        let input = EngineInput::Sentences(vec!["Mr. Smith".into(), "Hi".into()]);
        let raw = engine.apply(&mut handle, input).await.unwrap();
        let doc = engine.normalize(&handle, raw).unwrap();

        assert_eq!(doc.sentences().len(), 2);
        assert_eq!(doc.sentences()[0].len(), 2);
        assert_eq!(doc.sentences()[1].len(), 1);
        assert_eq!(doc.sentences()[0].tokens()[0].attribute("ner").unwrap().render(), "_");
        assert_eq!(script.calls_to("annotate")[0].params["no_ssplit"], true);
    }

    #[test]
    fn entity_labels_carry_iob_prefix() {
        let t = SpacyToken {
            text: "Berlin".into(),
            ent_iob: "B".into(),
            ent_type: "GPE".into(),
            ..Default::default()
        };
        assert_eq!(t.value(Layer::Ner).render(), "B-GPE");
    }
}
