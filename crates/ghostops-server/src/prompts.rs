//! Prompt assembly for the generation collaborator.
//!
//! Every call becomes one ordered list of turns: a per-product system
//! framing, the normalized history, then either the user's new message or a
//! continuation instruction built from the tail of the cut-off reply.

use ghostops_core::history::{
    clamp_text, has_assistant_turn, normalize, Turn, MAX_LAST_ASSISTANT_CHARS, MAX_TURN_CHARS,
};
use ghostops_core::Product;

use crate::collaborators::PromptTurn;

/// What kind of call this is, decided by the handler from the request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// First message of a session.
    Initial,
    /// A further question within an ongoing conversation.
    Followup,
    /// Free resume of a truncated reply.
    Continue,
}

#[derive(Debug)]
pub struct PromptPlan {
    pub product: Product,
    pub variant: Variant,
    pub message: String,
    pub history: Vec<Turn>,
    pub last_assistant: Option<String>,
}

fn system_framing(product: Product) -> &'static str {
    match product {
        Product::Diagnostic => {
            "You are a senior crisis-communication consultant running a rapid \
             diagnostic. Assess the situation the user describes, name the \
             exposure and the blind spots, and give a prioritized set of \
             actions. Be direct and concrete; no filler."
        }
        Product::StudioScenarios => {
            "You are a crisis-simulation director. From the situation the user \
             describes, build plausible escalation scenarios with triggers, \
             likely stakeholder reactions, and the decisive moves for each. \
             Be specific and operational."
        }
        Product::PreBriefBoard => {
            "You are preparing an executive for a board-level crisis briefing. \
             Produce the brief they would actually deliver: the situation in \
             two sentences, what is known and unknown, the decision asked of \
             the board, and the defensible position under hostile questioning. \
             Write tightly."
        }
    }
}

impl PromptPlan {
    /// The handler already validated the request; this only shapes it.
    pub fn to_turns(&self) -> Vec<PromptTurn> {
        let mut turns = vec![PromptTurn {
            role: "system",
            content: system_framing(self.product).to_string(),
        }];

        for t in normalize(&self.history) {
            turns.push(PromptTurn {
                role: t.role.as_str(),
                content: t.content,
            });
        }

        match self.variant {
            Variant::Initial | Variant::Followup => {
                turns.push(PromptTurn {
                    role: "user",
                    content: clamp_text(&self.message, MAX_TURN_CHARS),
                });
            }
            Variant::Continue => {
                let tail = self
                    .last_assistant
                    .as_deref()
                    .map(|t| clamp_text(t, MAX_LAST_ASSISTANT_CHARS))
                    .unwrap_or_default();
                turns.push(PromptTurn {
                    role: "assistant",
                    content: tail,
                });
                turns.push(PromptTurn {
                    role: "user",
                    content: "Your previous reply was cut off. Continue it from \
                              exactly where it stopped. Do not repeat what was \
                              already written and do not re-introduce the topic."
                        .to_string(),
                });
            }
        }

        turns
    }

    /// A followup is any call with assistant context already on the table.
    pub fn infer_followup(history: &[Turn], token_presented: bool) -> Variant {
        if token_presented || has_assistant_turn(history) {
            Variant::Followup
        } else {
            Variant::Initial
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
