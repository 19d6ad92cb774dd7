//! A single entry in a visitor's memory stream.

use serde::{Deserialize, Serialize};

use crate::action::Action;

/// Importance value for a piece that has not been rated yet.
///
/// Retrieval treats unscored pieces as importance 0; the scoring pass
/// backfills a real 1..=10 rating later.
pub const UNSCORED_IMPORTANCE: f32 = -1.0;

/// What produced a memory piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Observation,
    Action,
    Plan,
    Thought,
    Reflection,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Observation => "observation",
            MemoryKind::Action => "action",
            MemoryKind::Plan => "plan",
            MemoryKind::Thought => "thought",
            MemoryKind::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One memory piece: what was noticed, thought, planned, or done.
///
/// `timestamp` is the logical step clock at append time, not wall time.
/// `importance` starts at [`UNSCORED_IMPORTANCE`] and is backfilled once by
/// the scoring pass; `embedding` likewise starts empty and is filled in the
/// same pass. Embeddings are an in-memory artifact only and never serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPiece {
    pub kind: MemoryKind,
    pub timestamp: u64,
    pub content: String,
    pub importance: f32,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// The structured action, kept alongside its description on Action pieces.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub raw_action: Option<Action>,
    /// The plan's immediate next step, kept on Plan pieces.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_step: Option<String>,
}

impl MemoryPiece {
    fn bare(kind: MemoryKind, content: String) -> Self {
        Self {
            kind,
            timestamp: 0,
            content,
            importance: UNSCORED_IMPORTANCE,
            embedding: None,
            raw_action: None,
            next_step: None,
        }
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self::bare(MemoryKind::Observation, content.into())
    }

    pub fn action(content: impl Into<String>, raw: Action) -> Self {
        let mut piece = Self::bare(MemoryKind::Action, content.into());
        piece.raw_action = Some(raw);
        piece
    }

    pub fn plan(content: impl Into<String>, next_step: impl Into<String>) -> Self {
        let mut piece = Self::bare(MemoryKind::Plan, content.into());
        piece.next_step = Some(next_step.into());
        piece
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self::bare(MemoryKind::Thought, content.into())
    }

    pub fn reflection(content: impl Into<String>) -> Self {
        Self::bare(MemoryKind::Reflection, content.into())
    }

    pub fn is_scored(&self) -> bool {
        self.importance >= 0.0
    }

    /// Render one piece the way prompts expect to see it.
    pub fn render(&self) -> String {
        let importance = if self.is_scored() {
            format!("{:.1}", self.importance)
        } else {
            "N/A".to_string()
        };
        format!(
            "timestamp: {}; kind: {}; importance: {}; content: {}",
            self.timestamp, self.kind, importance, self.content
        )
    }
}

/// Render a set of pieces for prompt context, sorted by (kind, timestamp)
/// so same-kind entries read as a chronological run.
pub fn format_pieces(pieces: &[MemoryPiece]) -> Vec<String> {
    let mut ordered: Vec<&MemoryPiece> = pieces.iter().collect();
    ordered.sort_by_key(|p| (p.kind.as_str(), p.timestamp));
    ordered.iter().map(|p| p.render()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pieces_start_unscored() {
        let piece = MemoryPiece::observation("a search box at the top");
        assert!(!piece.is_scored());
        assert!(piece.embedding.is_none());
        assert_eq!(piece.timestamp, 0);
    }

    #[test]
    fn render_shows_na_until_scored() {
        let mut piece = MemoryPiece::thought("maybe check the sale tab");
        assert_eq!(
            piece.render(),
            "timestamp: 0; kind: thought; importance: N/A; content: maybe check the sale tab"
        );

        piece.importance = 7.0;
        piece.timestamp = 4;
        assert_eq!(
            piece.render(),
            "timestamp: 4; kind: thought; importance: 7.0; content: maybe check the sale tab"
        );
    }

    #[test]
    fn plan_pieces_carry_next_step() {
        let piece = MemoryPiece::plan("find a cheap umbrella", "open the search box");
        assert_eq!(piece.next_step.as_deref(), Some("open the search box"));
        assert!(piece.raw_action.is_none());
    }

    #[test]
    fn action_pieces_carry_raw_action() {
        let piece = MemoryPiece::action(
            "clicked 'add to cart'",
            Action::Click {
                target: "add to cart".to_string(),
            },
        );
        assert!(matches!(piece.raw_action, Some(Action::Click { .. })));
    }

    #[test]
    fn format_sorts_by_kind_then_timestamp() {
        let mut newer_thought = MemoryPiece::thought("second thought");
        newer_thought.timestamp = 5;
        let mut older_thought = MemoryPiece::thought("first thought");
        older_thought.timestamp = 2;
        let mut obs = MemoryPiece::observation("a banner");
        obs.timestamp = 9;

        let lines = format_pieces(&[newer_thought, obs, older_thought]);
        assert_eq!(lines.len(), 3);
        // "observation" sorts before "thought"; thoughts come back in order.
        assert!(lines[0].contains("a banner"));
        assert!(lines[1].contains("first thought"));
        assert!(lines[2].contains("second thought"));
    }

    #[test]
    fn embedding_never_serializes() {
        let mut piece = MemoryPiece::observation("something");
        piece.embedding = Some(vec![0.1, 0.2]);
        let json = serde_json::to_string(&piece).unwrap();
        assert!(!json.contains("embedding"));
    }
}
