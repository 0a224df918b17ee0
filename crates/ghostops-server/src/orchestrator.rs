//! Generation orchestrator.
//!
//! One call to the generation collaborator, under a wall-clock budget, with
//! at most one retry at a reduced output budget. Failures surface before any
//! session accounting happens, so a timed-out or failed call never consumes
//! an iteration and never rotates the token.

use std::time::Duration;

use ghostops_core::history::{ensure_marker, looks_truncated};

use crate::collaborators::{GenerationInput, GenerationReply, TextGenerator, UpstreamError};
use crate::config::GenerationConfig;
use crate::error::{AppError, GenerationTimedOut};
use crate::prompts::{PromptPlan, Variant};

/// Floor for the retry output budget.
const MIN_RETRY_BUDGET: u32 = 650;

/// Outcome of a single bounded attempt.
enum Attempt {
    Ok(GenerationReply),
    TimedOut,
    Err(UpstreamError),
}

/// A finished generation, ready for settlement and response shaping.
#[derive(Debug)]
pub struct Generated {
    pub text: String,
    /// The reply was cut by the output budget, reported or inferred.
    pub incomplete: bool,
    pub retried: bool,
    /// Whether the surviving attempt ran at the reduced budget.
    pub fallback_budget: bool,
}

async fn attempt(
    generator: &dyn TextGenerator,
    input: &GenerationInput,
    timeout_ms: u64,
) -> Attempt {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), generator.generate(input)).await
    {
        Ok(Ok(reply)) => Attempt::Ok(reply),
        Ok(Err(e)) => Attempt::Err(e),
        Err(_) => Attempt::TimedOut,
    }
}

/// Run the plan to completion or a typed failure.
pub async fn run(
    generator: &dyn TextGenerator,
    config: &GenerationConfig,
    plan: &PromptPlan,
) -> Result<Generated, AppError> {
    let budget = match plan.variant {
        Variant::Continue => config.max_output_tokens_continue,
        _ => config.max_output_tokens,
    };

    let mut input = GenerationInput {
        model: config.model.clone(),
        turns: plan.to_turns(),
        max_output_tokens: budget,
    };

    let first = attempt(generator, &input, config.timeout_ms).await;
    let (reply, retried, fallback_budget) = match first {
        Attempt::Ok(reply) => (reply, false, false),
        Attempt::Err(e) if !e.is_retryable() => return Err(e.into()),
        first => {
            // One retry, smaller budget so the answer fits the clock.
            let reduced = (budget * 65 / 100).max(MIN_RETRY_BUDGET);
            tracing::warn!(
                budget,
                reduced,
                timed_out = matches!(first, Attempt::TimedOut),
                "generation attempt failed, retrying once"
            );
            input.max_output_tokens = reduced;
            match attempt(generator, &input, config.timeout_ms).await {
                Attempt::Ok(reply) => (reply, true, true),
                Attempt::TimedOut => {
                    return Err(GenerationTimedOut {
                        timeout_ms: config.timeout_ms,
                        retried: true,
                    }
                    .into());
                }
                Attempt::Err(e) => return Err(e.into()),
            }
        }
    };

    let incomplete = reply.incomplete || looks_truncated(&reply.text);
    let text = if incomplete {
        ensure_marker(&reply.text)
    } else {
        reply.text
    };

    Ok(Generated {
        text,
        incomplete,
        retried,
        fallback_budget,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
