//! Relevance-weighted retrieval over the memory log.
//!
//! Every piece is scored as `kind_weight * (recency + importance + relevance)`
//! against the current logical timestamp and an optional query embedding, then
//! returned most-relevant-first. Callers can force the single most recent
//! piece of a kind into the result regardless of its score, which keeps
//! "what just happened" visible even when the query points elsewhere.

use std::collections::HashSet;

use tracing::debug;

use crate::memory::piece::{MemoryKind, MemoryPiece};

/// Scoring knobs for the retrieval blend.
///
/// Recency decays exponentially per logical step, importance is the 1-10
/// rating normalized into [0, 1], and relevance is the cosine similarity
/// between the query embedding and the piece embedding.
#[derive(Debug, Clone)]
pub struct ScoringParams {
    /// Per-step exponential decay applied to recency.
    pub recency_decay: f32,
    /// Blend coefficient for the recency term.
    pub recency_weight: f32,
    /// Blend coefficient for the normalized importance term.
    pub importance_weight: f32,
    /// Blend coefficient for the cosine relevance term.
    pub relevance_weight: f32,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            recency_decay: 0.99,
            recency_weight: 1.0,
            importance_weight: 1.0,
            relevance_weight: 1.0,
        }
    }
}

/// Per-kind multipliers applied to the blended score.
///
/// A weight of zero removes a kind from ranked results without touching
/// forced-recent anchors.
#[derive(Debug, Clone)]
pub struct KindWeights {
    pub observation: f32,
    pub action: f32,
    pub plan: f32,
    pub thought: f32,
    pub reflection: f32,
}

impl Default for KindWeights {
    fn default() -> Self {
        Self {
            observation: 1.0,
            action: 1.0,
            plan: 1.0,
            thought: 1.0,
            reflection: 1.0,
        }
    }
}

impl KindWeights {
    pub fn weight(&self, kind: MemoryKind) -> f32 {
        match kind {
            MemoryKind::Observation => self.observation,
            MemoryKind::Action => self.action,
            MemoryKind::Plan => self.plan,
            MemoryKind::Thought => self.thought,
            MemoryKind::Reflection => self.reflection,
        }
    }

    pub fn with_observation(mut self, weight: f32) -> Self {
        self.observation = weight;
        self
    }

    pub fn with_action(mut self, weight: f32) -> Self {
        self.action = weight;
        self
    }

    pub fn with_plan(mut self, weight: f32) -> Self {
        self.plan = weight;
        self
    }

    pub fn with_thought(mut self, weight: f32) -> Self {
        self.thought = weight;
        self
    }

    pub fn with_reflection(mut self, weight: f32) -> Self {
        self.reflection = weight;
        self
    }
}

/// Kinds whose single most recent piece is force-included in the result.
#[derive(Debug, Clone, Default)]
pub struct RecentAnchors {
    pub observation: bool,
    pub action: bool,
    pub plan: bool,
    pub thought: bool,
}

impl RecentAnchors {
    /// Anchor the most recent observation, action, plan, and thought.
    pub fn all() -> Self {
        Self {
            observation: true,
            action: true,
            plan: true,
            thought: true,
        }
    }

    fn kinds(&self) -> Vec<MemoryKind> {
        let mut kinds = Vec::new();
        if self.observation {
            kinds.push(MemoryKind::Observation);
        }
        if self.action {
            kinds.push(MemoryKind::Action);
        }
        if self.plan {
            kinds.push(MemoryKind::Plan);
        }
        if self.thought {
            kinds.push(MemoryKind::Thought);
        }
        kinds
    }
}

/// A single retrieval request against the memory log.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    /// Free text embedded and compared against piece embeddings.
    pub text: String,
    pub weights: KindWeights,
    pub anchors: RecentAnchors,
    /// Run a score backfill pass before ranking.
    pub trigger_update: bool,
    /// Cap on ranked results; anchors are appended past the cap.
    pub max_items: Option<usize>,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            weights: KindWeights::default(),
            anchors: RecentAnchors::default(),
            trigger_update: false,
            max_items: None,
        }
    }

    pub fn with_weights(mut self, weights: KindWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_anchors(mut self, anchors: RecentAnchors) -> Self {
        self.anchors = anchors;
        self
    }

    pub fn with_trigger_update(mut self, trigger: bool) -> Self {
        self.trigger_update = trigger;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

/// Cosine similarity between two embedding vectors.
///
/// Returns 0.0 for empty, mismatched, or zero-norm inputs so that a missing
/// embedding degrades the relevance term instead of poisoning the score.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn score_piece(
    piece: &MemoryPiece,
    query_embedding: Option<&[f32]>,
    params: &ScoringParams,
    weights: &KindWeights,
    current_timestamp: u64,
) -> f32 {
    let kind_weight = weights.weight(piece.kind);
    if kind_weight == 0.0 {
        return 0.0;
    }

    let age = current_timestamp.saturating_sub(piece.timestamp);
    let recency = params.recency_decay.powf(age as f32);

    // Unscored pieces contribute nothing until the backfill pass rates them.
    let importance = if piece.is_scored() {
        (piece.importance / 10.0).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let relevance = match (query_embedding, piece.embedding.as_deref()) {
        (Some(query), Some(emb)) => cosine_similarity(query, emb),
        _ => 0.0,
    };

    kind_weight
        * (params.recency_weight * recency
            + params.importance_weight * importance
            + params.relevance_weight * relevance)
}

/// Rank pieces for a query, most relevant first.
///
/// Ties break toward the higher timestamp. Anchored kinds have their most
/// recent piece appended to the result (deduplicated) even when a zero kind
/// weight or the `max_items` cap would have excluded it.
pub fn rank(
    pieces: &[MemoryPiece],
    query_embedding: Option<&[f32]>,
    query: &RetrievalQuery,
    params: &ScoringParams,
    current_timestamp: u64,
) -> Vec<MemoryPiece> {
    let mut scored: Vec<(usize, f32)> = pieces
        .iter()
        .enumerate()
        .map(|(index, piece)| {
            let score = score_piece(
                piece,
                query_embedding,
                params,
                &query.weights,
                current_timestamp,
            );
            (index, score)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| pieces[b.0].timestamp.cmp(&pieces[a.0].timestamp))
    });

    let cap = query.max_items.unwrap_or(scored.len());
    let mut selected: Vec<usize> = scored.into_iter().take(cap).map(|(index, _)| index).collect();
    let mut seen: HashSet<usize> = selected.iter().copied().collect();

    for kind in query.anchors.kinds() {
        let newest = pieces
            .iter()
            .enumerate()
            .filter(|(_, piece)| piece.kind == kind)
            .max_by_key(|(_, piece)| piece.timestamp)
            .map(|(index, _)| index);
        if let Some(index) = newest {
            if seen.insert(index) {
                selected.push(index);
            }
        }
    }

    debug!(
        target = "memory",
        total = pieces.len(),
        returned = selected.len(),
        "Ranked memory pieces"
    );

    selected
        .into_iter()
        .map(|index| pieces[index].clone())
        .collect()
}
