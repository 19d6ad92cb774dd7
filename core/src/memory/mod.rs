//! Append-only memory store for a simulated visitor.
//!
//! Pieces accumulate in insertion order under a logical timestamp that
//! advances once per completed step. Importance ratings and embeddings are
//! backfilled in batches, and retrieval blends recency, importance, and
//! embedding relevance per kind.

pub mod log;
pub mod piece;
pub mod retrieval;

pub use log::{update_scores, MemoryLog};
pub use piece::{format_pieces, MemoryKind, MemoryPiece, UNSCORED_IMPORTANCE};
pub use retrieval::{
    cosine_similarity, rank, KindWeights, RecentAnchors, RetrievalQuery, ScoringParams,
};
