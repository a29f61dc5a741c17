//! Embedding-similarity intent router.
//!
//! Classifies an utterance by cosine similarity against a bank of labeled
//! example phrases, so simple requests never need a planning call. The
//! bank is embedded lazily on first use, one batch call per intent.

use async_trait::async_trait;
use concierge_core::error::ProviderError;
use concierge_core::provider::{EmbeddingRequest, Provider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::RouterError;

/// Intent labels the router can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CalendarRead,
    CalendarWrite,
    EmailRead,
    EmailWrite,
    WebSearch,
    WebScrape,
    RagQuery,
    Chitchat,
    /// Nothing matched well enough; needs the planner.
    Complex,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CalendarRead => "calendar_read",
            Intent::CalendarWrite => "calendar_write",
            Intent::EmailRead => "email_read",
            Intent::EmailWrite => "email_write",
            Intent::WebSearch => "web_search",
            Intent::WebScrape => "web_scrape",
            Intent::RagQuery => "rag_query",
            Intent::Chitchat => "chitchat",
            Intent::Complex => "complex",
        }
    }

    /// The capability this intent implies, if any.
    pub fn capability(&self) -> Option<&'static str> {
        match self {
            Intent::CalendarRead | Intent::CalendarWrite => Some("calendar"),
            Intent::EmailRead | Intent::EmailWrite => Some("mail"),
            Intent::WebSearch | Intent::WebScrape => Some("web"),
            Intent::RagQuery => Some("notes"),
            Intent::Chitchat | Intent::Complex => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one utterance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
}

/// Turns text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// An [`Embedder`] backed by a provider's embedding endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: texts.to_vec(),
            })
            .await?;
        Ok(response.embeddings)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for empty, mismatched or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Example vectors of one intent.
#[derive(Debug, Clone)]
pub struct BankEntry {
    pub intent: Intent,
    pub vectors: Vec<Vec<f32>>,
}

/// Best intent in `bank` for `query`. Ties keep the earlier entry.
///
/// Returns `(Complex, best_score)` when the best score is below `threshold`.
pub fn best_match(bank: &[BankEntry], query: &[f32], threshold: f32) -> Classification {
    let mut best = Classification {
        intent: Intent::Complex,
        confidence: 0.0,
    };
    let mut found = false;

    for entry in bank {
        let score = entry
            .vectors
            .iter()
            .map(|v| cosine_similarity(query, v))
            .fold(f32::NEG_INFINITY, f32::max);
        if score.is_finite() && (!found || score > best.confidence) {
            best = Classification {
                intent: entry.intent,
                confidence: score,
            };
            found = true;
        }
    }

    if best.confidence < threshold {
        best.intent = Intent::Complex;
    }
    best
}

/// Default example phrases per intent, Italian and English.
pub fn default_examples() -> Vec<(Intent, Vec<String>)> {
    let bank: [(Intent, &[&str]); 8] = [
        (Intent::CalendarRead, &[
            "dammi gli eventi",
            "cosa ho lunedì",
            "agenda della settimana",
            "che impegni ho oggi",
            "mostrami il calendario",
            "what's on my calendar tomorrow",
            "do I have meetings this week",
        ]),
        (Intent::CalendarWrite, &[
            "crea un evento",
            "aggiungi un appuntamento",
            "schedula una riunione",
            "sposta l'evento",
            "create a meeting on friday",
            "cancel my appointment",
        ]),
        (Intent::EmailRead, &[
            "controlla le email",
            "ho messaggi nuovi",
            "leggi le email",
            "check my inbox",
            "any important emails",
        ]),
        (Intent::EmailWrite, &[
            "scrivi una email",
            "rispondi all'email",
            "invia una mail",
            "send an email to",
            "reply to that email",
        ]),
        (Intent::WebSearch, &[
            "che tempo fa",
            "previsioni meteo",
            "cerca su internet",
            "cosa sai di",
            "what's the weather today",
            "search the web for",
        ]),
        (Intent::WebScrape, &[
            "leggi questa pagina",
            "estrai contenuto da",
            "analizza questo sito",
            "summarize this page",
        ]),
        (Intent::RagQuery, &[
            "cerca nei miei documenti",
            "trova nel knowledge base",
            "search my notes",
        ]),
        (Intent::Chitchat, &[
            "ciao",
            "come stai",
            "grazie",
            "buongiorno",
            "ok perfetto",
            "hello",
            "thanks a lot",
            "how are you",
        ]),
    ];

    bank.into_iter()
        .map(|(intent, phrases)| (intent, phrases.iter().map(|p| p.to_string()).collect()))
        .collect()
}

/// Classifies utterances against an example bank.
pub struct SemanticRouter {
    embedder: Arc<dyn Embedder>,
    examples: Vec<(Intent, Vec<String>)>,
    bank: OnceCell<Vec<BankEntry>>,
    threshold: f32,
}

impl SemanticRouter {
    /// A router over [`default_examples`].
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        Self::with_examples(embedder, default_examples(), threshold)
    }

    /// A router over custom example phrases, embedded on first use.
    pub fn with_examples(
        embedder: Arc<dyn Embedder>,
        examples: Vec<(Intent, Vec<String>)>,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            examples,
            bank: OnceCell::new(),
            threshold,
        }
    }

    /// A router over precomputed example vectors; nothing is embedded but the utterance.
    pub fn from_vectors(
        embedder: Arc<dyn Embedder>,
        bank: Vec<BankEntry>,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            examples: Vec::new(),
            bank: OnceCell::new_with(Some(bank)),
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    async fn embed_bank(&self) -> Result<Vec<BankEntry>, RouterError> {
        info!(intents = self.examples.len(), "Initializing semantic router");
        let mut bank = Vec::with_capacity(self.examples.len());
        for (intent, phrases) in &self.examples {
            if phrases.is_empty() {
                continue;
            }
            let vectors = self.embedder.embed(phrases).await?;
            if vectors.len() != phrases.len() {
                return Err(RouterError::EmbeddingCount {
                    expected: phrases.len(),
                    got: vectors.len(),
                });
            }
            bank.push(BankEntry {
                intent: *intent,
                vectors,
            });
        }
        Ok(bank)
    }

    /// Embed the example bank now instead of on the first classification.
    pub async fn warm_up(&self) -> Result<(), RouterError> {
        self.bank.get_or_try_init(|| self.embed_bank()).await?;
        Ok(())
    }

    /// Classify an utterance. Only embedding failures are errors.
    pub async fn classify(&self, utterance: &str) -> Result<Classification, RouterError> {
        let bank = self.bank.get_or_try_init(|| self.embed_bank()).await?;

        let vectors = self.embedder.embed(&[utterance.to_string()]).await?;
        let query = match vectors.as_slice() {
            [query] => query,
            _ => {
                return Err(RouterError::EmbeddingCount {
                    expected: 1,
                    got: vectors.len(),
                });
            }
        };

        let classification = best_match(bank, query, self.threshold);
        debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            "Utterance classified"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingEmbedder, KeywordEmbedder};

    fn entry(intent: Intent, vectors: &[&[f32]]) -> BankEntry {
        BankEntry {
            intent,
            vectors: vectors.iter().map(|v| v.to_vec()).collect(),
        }
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn best_match_above_threshold() {
        let bank = vec![
            entry(Intent::CalendarRead, &[&[1.0, 0.0, 0.0]]),
            entry(Intent::EmailRead, &[&[0.0, 1.0, 0.0], &[0.0, 0.9, 0.1]]),
        ];
        let c = best_match(&bank, &[0.0, 1.0, 0.0], 0.75);
        assert_eq!(c.intent, Intent::EmailRead);
        assert!((c.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn below_threshold_is_complex_with_best_score() {
        let bank = vec![entry(Intent::Chitchat, &[&[1.0, 0.0]])];
        let c = best_match(&bank, &[1.0, 1.0], 0.75);
        assert_eq!(c.intent, Intent::Complex);
        assert!((c.confidence - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[test]
    fn ties_keep_first_category() {
        let bank = vec![
            entry(Intent::WebSearch, &[&[1.0, 0.0]]),
            entry(Intent::RagQuery, &[&[1.0, 0.0]]),
        ];
        assert_eq!(best_match(&bank, &[1.0, 0.0], 0.5).intent, Intent::WebSearch);
    }

    #[test]
    fn empty_bank_is_complex() {
        let c = best_match(&[], &[1.0], 0.75);
        assert_eq!(c.intent, Intent::Complex);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn intents_map_to_capabilities() {
        assert_eq!(Intent::CalendarWrite.capability(), Some("calendar"));
        assert_eq!(Intent::EmailRead.capability(), Some("mail"));
        assert_eq!(Intent::RagQuery.capability(), Some("notes"));
        assert_eq!(Intent::Chitchat.capability(), None);
        assert_eq!(Intent::WebScrape.to_string(), "web_scrape");
    }

    #[tokio::test]
    async fn classify_embeds_bank_once() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let router = Arc::new(SemanticRouter::with_examples(
            embedder.clone(),
            vec![
                (Intent::Chitchat, vec!["hello".into(), "thanks".into()]),
                (Intent::EmailRead, vec!["check mail".into()]),
            ],
            0.75,
        ));

        let (a, b) = tokio::join!(router.classify("hello"), router.classify("check my mail"));
        assert_eq!(a.unwrap().intent, Intent::Chitchat);
        assert_eq!(b.unwrap().intent, Intent::EmailRead);

        // One batch per category plus one call per utterance.
        assert_eq!(embedder.calls(), 4);
    }

    #[tokio::test]
    async fn embedding_failure_is_an_error() {
        let router = SemanticRouter::from_vectors(
            Arc::new(FailingEmbedder),
            vec![entry(Intent::Chitchat, &[&[1.0]])],
            0.75,
        );
        let result = router.classify("ciao").await;
        assert!(matches!(result, Err(RouterError::Embedding(_))));
    }

    #[test]
    fn default_bank_covers_every_routable_intent() {
        let examples = default_examples();
        assert_eq!(examples.len(), 8);
        assert!(examples.iter().all(|(i, p)| *i != Intent::Complex && !p.is_empty()));
    }
}
