//! Case Topic Service
//!
//! Produces the case a panel discusses. A session can also be started with a
//! hand-written topic, so this service is only consulted when the human asks
//! for one.

use crate::llm_client::{ChatClient, Sampling};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Prompt key for topic generation.
pub const TOPIC_PROMPT: &str = "generate_topic";

/// Defines the contract for any service that can produce a discussion case.
///
/// This abstraction allows swapping between an LLM-backed generator and a
/// fixed mock while keeping session bootstrapping identical.
#[async_trait]
pub trait CaseService: Send + Sync {
    /// Generates a group-interview case for a company and position.
    ///
    /// # Arguments
    ///
    /// * `company` - The company the interview is staged for.
    /// * `job_title` - The position being interviewed for.
    async fn generate_topic(&self, company: &str, job_title: &str) -> Result<String>;
}

/// Removes markdown markers the model tends to add despite instructions.
pub fn strip_markdown(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '>'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// An implementation of `CaseService` that uses an OpenAI-compatible API.
pub struct LLMCaseService {
    client: ChatClient,
    prompts: HashMap<String, String>,
}

impl LLMCaseService {
    /// Creates a new LLM-based case service.
    ///
    /// # Arguments
    ///
    /// * `client` - Chat client for the configured provider.
    /// * `prompts` - A map of template strings, which must include a key
    ///   for `"generate_topic"`.
    pub fn new(client: ChatClient, prompts: HashMap<String, String>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl CaseService for LLMCaseService {
    async fn generate_topic(&self, company: &str, job_title: &str) -> Result<String> {
        let prompt_template = self
            .prompts
            .get(TOPIC_PROMPT)
            .context("Missing prompt template: 'generate_topic'")?;
        let prompt = prompt_template
            .replace("{company}", company)
            .replace("{job_title}", job_title);

        let answer = self
            .client
            .complete(
                "You write realistic group-interview cases.",
                &prompt,
                Sampling::default(),
            )
            .await?;

        let topic = strip_markdown(&answer);
        anyhow::ensure!(!topic.is_empty(), "LLM returned an empty topic");
        Ok(topic)
    }
}

/// A mock `CaseService` for development and integration testing.
pub struct MockCaseService;

#[async_trait]
impl CaseService for MockCaseService {
    /// Returns the same pricing case for any company and position.
    async fn generate_topic(&self, company: &str, job_title: &str) -> Result<String> {
        Ok(format!(
            "{}计划在三个月内推出一款新产品，预算有限。请作为{}候选人小组，讨论并确定上市的优先级、定价策略和主要风险。",
            company, job_title
        ))
    }
}
