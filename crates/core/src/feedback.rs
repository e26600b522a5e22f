//! Post-session scoring.
//!
//! When a session finishes, the full transcript and the interruption tally are
//! handed to a [`FeedbackService`], which grades the human participant.

use crate::{
    generator::format_history,
    llm_client::ChatClient,
    transcript::{Contribution, ContributionKind},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Prompt key for feedback generation.
pub const FEEDBACK_PROMPT: &str = "generate_feedback";

/// Evaluation of the human participant.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct FeedbackData {
    /// How well the candidate picked moments to speak.
    pub timing: String,
    /// Share of the discussion the candidate held, 0-100.
    pub voice_share: f64,
    /// What the candidate added to the structure of the discussion.
    pub structural_contribution: String,
    /// How the candidate handled being talked over, and talking over others.
    pub interruption_handling: String,
    /// Overall score, 0-100.
    pub overall_score: f64,
    /// Concrete suggestions for next time.
    pub suggestions: Vec<String>,
}

#[async_trait]
pub trait FeedbackService: Send + Sync {
    /// Grades the human participant of a finished session.
    async fn generate_feedback(
        &self,
        topic: &str,
        job_title: &str,
        transcript: &[Contribution],
        interruptions: u32,
    ) -> Result<FeedbackData>;
}

/// Percentage of characters in the transcript written by the human.
pub fn voice_share(transcript: &[Contribution]) -> f64 {
    let (human, total) = transcript.iter().fold((0usize, 0usize), |(h, t), c| {
        let len = c.text.chars().count();
        match c.kind {
            ContributionKind::Human => (h + len, t + len),
            ContributionKind::Agent => (h, t + len),
        }
    });
    if total == 0 {
        0.0
    } else {
        (human as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

/// Parses a model reply into [`FeedbackData`], tolerating a fenced code block.
pub fn parse_feedback(raw: &str) -> Result<FeedbackData> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).context("Failed to parse feedback JSON")
}

/// Feedback graded by an OpenAI-compatible chat model.
pub struct LLMFeedbackService {
    client: ChatClient,
    prompts: HashMap<String, String>,
}

impl LLMFeedbackService {
    /// `prompts` must contain a template for [`FEEDBACK_PROMPT`].
    pub fn new(client: ChatClient, prompts: HashMap<String, String>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl FeedbackService for LLMFeedbackService {
    async fn generate_feedback(
        &self,
        topic: &str,
        job_title: &str,
        transcript: &[Contribution],
        interruptions: u32,
    ) -> Result<FeedbackData> {
        let template = self
            .prompts
            .get(FEEDBACK_PROMPT)
            .context("Missing prompt template: 'generate_feedback'")?;
        let prompt = template
            .replace("{job_title}", job_title)
            .replace("{topic}", topic)
            .replace("{interruptions}", &interruptions.to_string())
            .replace("{transcript}", &format_history(transcript));

        let schema = serde_json::to_value(schemars::schema_for!(FeedbackData))?;
        let raw = self
            .client
            .complete_json(
                "You are a strict group-interview assessor. Answer with JSON only.",
                &prompt,
                "feedback",
                schema,
            )
            .await?;

        let feedback = parse_feedback(&raw)?;
        info!(score = feedback.overall_score, "Feedback generated");
        Ok(feedback)
    }
}

/// Offline grading from transcript statistics alone.
pub struct HeuristicFeedbackService;

#[async_trait]
impl FeedbackService for HeuristicFeedbackService {
    async fn generate_feedback(
        &self,
        _topic: &str,
        _job_title: &str,
        transcript: &[Contribution],
        interruptions: u32,
    ) -> Result<FeedbackData> {
        let share = voice_share(transcript);
        let spoke = transcript
            .iter()
            .filter(|c| c.kind == ContributionKind::Human)
            .count();

        let mut suggestions = Vec::new();
        if spoke == 0 {
            suggestions.push("Take the floor at least once; silence scores zero.".to_string());
        }
        if share < 20.0 {
            suggestions.push("Claim more of the discussion with a clear framework.".to_string());
        }
        if interruptions > 2 {
            suggestions.push("Let the current speaker finish before you come in.".to_string());
        }
        suggestions.push("Close with a summary that names the decision and owner.".to_string());

        let score = (40.0 + share.min(40.0) + if spoke > 0 { 20.0 } else { 0.0 }
            - 5.0 * interruptions as f64)
            .clamp(0.0, 100.0);

        Ok(FeedbackData {
            timing: format!("Spoke {} times.", spoke),
            voice_share: share,
            structural_contribution: if spoke > 0 {
                "Contributed to the discussion.".to_string()
            } else {
                "No contribution.".to_string()
            },
            interruption_handling: format!("Interrupted an in-flight speaker {} times.", interruptions),
            overall_score: score,
            suggestions,
        })
    }
}
