//! Append-only memory log with a logical step clock.

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::llm::{ChatRequest, LlmGateway};
use crate::memory::piece::{MemoryKind, MemoryPiece};
use crate::prompts;

/// The full memory stream of one visitor.
///
/// Pieces are append-only; the only mutation after append is the one-time
/// backfill of importance and embedding by [`update_scores`]. The timestamp
/// counter is advanced once per completed step, so pieces appended during
/// the same step share a timestamp.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pieces: Vec<MemoryPiece>,
    timestamp: u64,
    /// Index of the first piece the next reflection window starts at.
    reflect_cursor: usize,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a piece, stamping it with the current logical timestamp.
    pub fn append(&mut self, mut piece: MemoryPiece) {
        piece.timestamp = self.timestamp;
        debug!(
            target = "memory.log",
            kind = %piece.kind,
            timestamp = piece.timestamp,
            "append"
        );
        self.pieces.push(piece);
    }

    /// Advance the logical clock. Called once per completed step.
    pub fn advance(&mut self) {
        self.timestamp += 1;
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn pieces(&self) -> &[MemoryPiece] {
        &self.pieces
    }

    /// The last `n` pieces in insertion order.
    pub fn tail(&self, n: usize) -> &[MemoryPiece] {
        let start = self.pieces.len().saturating_sub(n);
        &self.pieces[start..]
    }

    pub fn last_of_kind(&self, kind: MemoryKind) -> Option<&MemoryPiece> {
        self.pieces.iter().rev().find(|p| p.kind == kind)
    }

    /// Pieces appended since the last reflection, advancing the cursor.
    ///
    /// Each piece feeds exactly one reflection; two consecutive calls with no
    /// appends in between return an empty second window.
    pub fn take_reflect_window(&mut self) -> Vec<MemoryPiece> {
        let window = self.pieces[self.reflect_cursor..].to_vec();
        self.reflect_cursor = self.pieces.len();
        window
    }

    pub fn snapshot(&self) -> Vec<MemoryPiece> {
        self.pieces.clone()
    }

    fn backfill_importance(&mut self, index: usize, importance: f32) {
        if let Some(piece) = self.pieces.get_mut(index) {
            if !piece.is_scored() {
                piece.importance = importance;
            }
        }
    }

    fn backfill_embedding(&mut self, index: usize, embedding: Vec<f32>) {
        if let Some(piece) = self.pieces.get_mut(index) {
            if piece.embedding.is_none() {
                piece.embedding = Some(embedding);
            }
        }
    }
}

/// Backfill importance ratings and embeddings for every piece still missing
/// them.
///
/// The lock is never held across a gateway await: pending work is collected
/// under the lock, the batched embedding and rating calls run unlocked, and
/// results are written back by index afterwards (safe because the log is
/// append-only). Failures are logged and leave the affected pieces unscored;
/// retrieval treats those as importance 0 until a later pass succeeds.
pub async fn update_scores(log: &Mutex<MemoryLog>, gateway: &LlmGateway) {
    let pending: Vec<(usize, String)> = {
        let guard = log.lock().await;
        guard
            .pieces
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_scored() || p.embedding.is_none())
            .map(|(i, p)| (i, p.content.clone()))
            .collect()
    };
    if pending.is_empty() {
        return;
    }

    let contents: Vec<String> = pending.iter().map(|(_, c)| c.clone()).collect();

    let embeddings = match gateway.embed(&contents).await {
        Ok(vectors) => Some(vectors),
        Err(e) => {
            warn!(
                target = "memory.update",
                count = contents.len(),
                error = %e,
                "embedding pass failed; pieces stay unscored"
            );
            None
        }
    };

    let ratings = request_ratings(gateway, &contents).await;

    if embeddings.is_none() && ratings.is_none() {
        return;
    }

    let mut guard = log.lock().await;
    for (slot, (index, _)) in pending.iter().enumerate() {
        if let Some(vectors) = &embeddings {
            guard.backfill_embedding(*index, vectors[slot].clone());
        }
        if let Some(values) = &ratings {
            guard.backfill_importance(*index, values[slot]);
        }
    }
    debug!(
        target = "memory.update",
        scored = pending.len(),
        "score backfill complete"
    );
}

/// One batched rating call for all pending contents.
///
/// Returns `None` when the call fails or the model answers with the wrong
/// number of ratings; a partial answer is worse than none because ratings
/// are matched to pieces by position.
async fn request_ratings(gateway: &LlmGateway, contents: &[String]) -> Option<Vec<f32>> {
    let entries: Vec<String> = contents
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect();
    let request = ChatRequest::new("memory_update")
        .system(prompts::IMPORTANCE_PROMPT)
        .user(json!({ "entries": entries }).to_string())
        .json();

    let raw = match gateway.complete(&request).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                target = "memory.update",
                error = %e,
                "importance rating call failed"
            );
            return None;
        }
    };

    let value: Value = serde_json::from_str(&raw).ok()?;
    let ratings = value.get("ratings")?.as_array()?;
    let parsed: Vec<f32> = ratings
        .iter()
        .filter_map(Value::as_f64)
        .map(|r| r.clamp(1.0, 10.0) as f32)
        .collect();
    if parsed.len() != contents.len() {
        warn!(
            target = "memory.update",
            expected = contents.len(),
            got = parsed.len(),
            "rating count mismatch; discarding batch"
        );
        return None;
    }
    Some(parsed)
}
