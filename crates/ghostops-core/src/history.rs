//! Conversation history normalization and truncation heuristics.
//!
//! History arrives from the client as loose JSON. Before it reaches the
//! generation collaborator it is filtered to user/assistant turns, each turn
//! clamped, and the total bounded keeping the most recent turns.

use serde::{Deserialize, Serialize};

/// Per-turn clamp, in characters.
pub const MAX_TURN_CHARS: usize = 3_000;
/// Total history budget, in characters (plus a small per-turn overhead).
pub const MAX_TOTAL_CHARS: usize = 12_000;
/// Clamp for the `last_assistant` continuation context.
pub const MAX_LAST_ASSISTANT_CHARS: usize = 8_000;

/// Appended when a reply was (or looks) cut off by the output budget, so the
/// client knows a free continuation call is available.
pub const TRUNCATION_MARKER: &str = "[truncated: send a continue request to resume]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Clamp to `max` characters on a char boundary, appending an ellipsis when
/// anything was cut.
pub fn clamp_text(s: &str, max: usize) -> String {
    let t = s.trim();
    if t.chars().count() <= max {
        return t.to_string();
    }
    let mut out: String = t.chars().take(max).collect();
    out.push('…');
    out
}

/// Normalize raw history: drop empty or foreign-role turns, clamp each turn,
/// then enforce the total budget by dropping the oldest turns first.
pub fn normalize(raw: &[Turn]) -> Vec<Turn> {
    let clamped: Vec<Turn> = raw
        .iter()
        .filter(|t| !t.content.trim().is_empty())
        .map(|t| Turn {
            role: t.role,
            content: clamp_text(&t.content, MAX_TURN_CHARS),
        })
        .collect();

    // Walk backwards so the most recent turns survive the budget.
    let mut kept: Vec<Turn> = Vec::new();
    let mut total = 0usize;
    for turn in clamped.into_iter().rev() {
        let len = turn.content.chars().count() + 20;
        if total + len > MAX_TOTAL_CHARS {
            break;
        }
        total += len;
        kept.push(turn);
    }
    kept.reverse();
    kept
}

pub fn has_assistant_turn(history: &[Turn]) -> bool {
    history.iter().any(|t| t.role == Role::Assistant)
}

/// Heuristic: a non-trivial reply that does not end in terminal punctuation
/// probably hit the output budget.
pub fn looks_truncated(text: &str) -> bool {
    let t = text.trim();
    if t.len() < 200 {
        return false;
    }
    !t.ends_with(['.', '!', '?', '…', ')'])
}

/// Append the truncation marker once.
pub fn ensure_marker(text: &str) -> String {
    let t = text.trim();
    if t.is_empty() || t.contains(TRUNCATION_MARKER) {
        return t.to_string();
    }
    format!("{t}\n\n{TRUNCATION_MARKER}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
