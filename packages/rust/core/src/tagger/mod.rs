//! Hybrid chunk tagger.
//!
//! Each chunk goes through three stages:
//!
//! 1. [`rules`]: ordered regex rules give a conservative first tag
//! 2. [`classifier`]: escalation to the LLM, depending on [`LlmPolicy`]
//! 3. [`validate`]: strong textual signals override, labels are re-validated
//!
//! Finalized tags are memoized in a [`TagCache`] owned by the caller.

pub mod cache;
pub mod classifier;
pub mod rules;
pub mod validate;

use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use policytag_shared::{
    AppConfig, Chunk, ClauseType, LabelSet, LlmPolicy, PolicyTagError, Result, Tag, TagMethod,
};

pub use cache::{CacheKey, CacheStats, TagCache};
pub use classifier::{Classifier, ClassifierError, RawTag, SolarClassifier};

/// Progress notices are emitted every this many chunks (and on the last).
pub const PROGRESS_EVERY: usize = 25;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tagger knobs, usually taken from the `[tagging]` config section.
#[derive(Debug, Clone)]
pub struct TaggerSettings {
    pub llm_policy: LlmPolicy,
    pub confidence_threshold: f64,
    pub label_set: LabelSet,
    /// Recorded on every chunk for the downstream embedding step.
    pub embedding_model: String,
    /// Env var reported when a classifier is required but missing.
    pub credential_env: String,
}

impl TaggerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            llm_policy: config.tagging.llm_policy,
            confidence_threshold: config.tagging.confidence_threshold,
            label_set: config.tagging.label_set,
            embedding_model: config.defaults.embedding_model.clone(),
            credential_env: config.upstage.api_key_env.clone(),
        }
    }
}

impl Default for TaggerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for batch tagging.
pub trait TaggingProgress: Send + Sync {
    /// Called every [`PROGRESS_EVERY`] chunks and after the last one.
    fn chunks_tagged(&self, done: usize, total: usize, llm_used: usize);
}

/// No-op tagging progress.
pub struct SilentTaggingProgress;

impl TaggingProgress for SilentTaggingProgress {
    fn chunks_tagged(&self, _done: usize, _total: usize, _llm_used: usize) {}
}

// ---------------------------------------------------------------------------
// Tagger
// ---------------------------------------------------------------------------

/// Result of a batch tagging run.
#[derive(Debug, Clone)]
pub struct TaggingOutcome {
    /// Input chunks, in order, with `clause` and `indexing` metadata merged in.
    pub chunks: Vec<Chunk>,
    /// How many final tags came from the classifier.
    pub llm_used: usize,
}

/// Rule + LLM + override tagger.
///
/// `classifier` is `None` when no credential is available; policies other
/// than `never` then refuse to run a batch.
pub struct Tagger<C> {
    settings: TaggerSettings,
    classifier: Option<C>,
}

impl<C: Classifier> Tagger<C> {
    pub fn new(settings: TaggerSettings, classifier: Option<C>) -> Self {
        Self {
            settings,
            classifier,
        }
    }

    pub fn settings(&self) -> &TaggerSettings {
        &self.settings
    }

    /// Fails when the policy needs a classifier and none was configured.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.settings.llm_policy.requires_classifier() && self.classifier.is_none() {
            return Err(PolicyTagError::MissingCredential {
                env_var: self.settings.credential_env.clone(),
            });
        }
        Ok(())
    }

    fn should_escalate(&self, base: &Tag) -> bool {
        match self.settings.llm_policy {
            LlmPolicy::Always => true,
            LlmPolicy::Never => false,
            LlmPolicy::UnknownOrLowConf => {
                base.clause_type == ClauseType::Other
                    || base.confidence < self.settings.confidence_threshold
            }
        }
    }

    /// Tag one chunk of text.
    ///
    /// Classifier failures never escape: the rule tag is used instead and the
    /// failure category is recorded in its note.
    pub async fn tag_chunk(&self, text: &str, cache: &mut TagCache) -> Tag {
        let key = CacheKey::new(
            text,
            self.settings.llm_policy,
            self.settings.confidence_threshold,
            self.settings.label_set,
        );
        if let Some(hit) = cache.get(&key) {
            debug!("tag cache hit");
            return hit;
        }

        let label_set = self.settings.label_set;
        let base = rules::rule_tag(text, label_set);

        let merged = if self.should_escalate(&base) {
            match &self.classifier {
                Some(classifier) => match classifier.classify(text, label_set).await {
                    Ok(raw) => raw.into_tag(label_set),
                    Err(e) => {
                        warn!(category = e.category(), error = %e, "classifier failed, using rule tag");
                        fallback(base, e.category())
                    }
                },
                None => fallback(base, "no_classifier"),
            }
        } else {
            base
        };

        let tag = validate::validate_and_override(text, merged, label_set);
        cache.insert(key, tag.clone());
        tag
    }

    /// Tag a batch of chunks in order.
    ///
    /// Fails before touching any chunk when the policy needs a classifier
    /// and none was configured.
    #[instrument(skip_all, fields(chunks = chunks.len(), policy = %self.settings.llm_policy))]
    pub async fn tag_chunks(
        &self,
        chunks: Vec<Chunk>,
        cache: &mut TagCache,
        progress: &dyn TaggingProgress,
    ) -> Result<TaggingOutcome> {
        self.ensure_ready()?;

        let total = chunks.len();
        let mut llm_used = 0;
        let mut tagged = Vec::with_capacity(total);

        for (idx, mut chunk) in chunks.into_iter().enumerate() {
            let tag = self.tag_chunk(&chunk.page_content, cache).await;
            if tag.method == TagMethod::Llm {
                llm_used += 1;
            }

            let char_len = chunk.page_content.chars().count();
            merge_tag_metadata(
                &mut chunk.metadata,
                &tag,
                idx,
                char_len,
                &self.settings.embedding_model,
            );
            tagged.push(chunk);

            let done = idx + 1;
            if done % PROGRESS_EVERY == 0 || done == total {
                info!(done, total, llm_used, "tagging progress");
                progress.chunks_tagged(done, total, llm_used);
            }
        }

        Ok(TaggingOutcome {
            chunks: tagged,
            llm_used,
        })
    }
}

fn fallback(mut base: Tag, category: &str) -> Tag {
    base.note = Some(format!("LLM failed: {category}"));
    base
}

/// Sequential chunk id, `chunk_000042`.
pub fn chunk_id(idx: usize) -> String {
    format!("chunk_{idx:06}")
}

/// Merge `clause` and `indexing` entries into chunk metadata.
///
/// Other top-level keys are left alone, and existing sub-keys of `clause` /
/// `indexing` that the tagger does not write are kept.
pub fn merge_tag_metadata(
    metadata: &mut Map<String, Value>,
    tag: &Tag,
    idx: usize,
    char_len: usize,
    embedding_model: &str,
) {
    let clause = json!({
        "clause_type": tag.clause_type,
        "risk_domains": tag.risk_domains,
    });
    let indexing = json!({
        "chunk_id": chunk_id(idx),
        "chunk_char_len": char_len,
        "embedding_model": embedding_model,
        "tag_method": tag.method,
        "tag_confidence": tag.confidence,
    });

    merge_object(metadata, "clause", clause);
    merge_object(metadata, "indexing", indexing);
}

fn merge_object(metadata: &mut Map<String, Value>, key: &str, update: Value) {
    let Value::Object(update) = update else {
        return;
    };
    match metadata.get_mut(key) {
        Some(Value::Object(existing)) => existing.extend(update),
        _ => {
            metadata.insert(key.to_string(), Value::Object(update));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
