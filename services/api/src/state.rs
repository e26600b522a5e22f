//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the provider-backed services and the roster.

use crate::config::{Config, Provider};
use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use crossfire_core::{
    casebook::{CaseService, LLMCaseService, MockCaseService},
    feedback::{FeedbackService, HeuristicFeedbackService, LLMFeedbackService},
    generator::{CannedContentGenerator, ContentGenerator, LLMContentGenerator},
    llm_client::ChatClient,
    participant::Roster,
};
use std::{collections::HashMap, sync::Arc};
use tracing::info;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn ContentGenerator>,
    pub case_service: Arc<dyn CaseService>,
    pub feedback_service: Arc<dyn FeedbackService>,
    pub roster: Arc<Roster>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the provider-specific services described by `config`.
    pub fn from_config(config: Config, prompts: HashMap<String, String>) -> Result<Self> {
        let openai_config = match &config.provider {
            Provider::OpenAI => {
                info!("Using OpenAI provider.");
                let api_key = config
                    .openai_api_key
                    .as_ref()
                    .context("OpenAI API key not found")?;
                Some(
                    OpenAIConfig::new()
                        .with_api_key(api_key)
                        .with_api_base("https://api.openai.com/v1/"),
                )
            }
            Provider::Gemini => {
                info!("Using Gemini provider.");
                let api_key = config
                    .gemini_api_key
                    .as_ref()
                    .context("Gemini API key not found")?;
                Some(
                    OpenAIConfig::new()
                        .with_api_key(api_key)
                        .with_api_base("https://generativelanguage.googleapis.com/v1beta/openai"),
                )
            }
            Provider::Mock => {
                info!("Using mock provider.");
                None
            }
        };

        let (generator, case_service, feedback_service): (
            Arc<dyn ContentGenerator>,
            Arc<dyn CaseService>,
            Arc<dyn FeedbackService>,
        ) = match openai_config {
            Some(openai_config) => {
                let chat = ChatClient::new(openai_config.clone(), config.chat_model.clone());
                let grader = ChatClient::new(openai_config, config.feedback_model.clone());
                (
                    Arc::new(LLMContentGenerator::new(chat.clone(), prompts.clone())),
                    Arc::new(LLMCaseService::new(chat, prompts.clone())),
                    Arc::new(LLMFeedbackService::new(grader, prompts)),
                )
            }
            None => (
                Arc::new(CannedContentGenerator),
                Arc::new(MockCaseService),
                Arc::new(HeuristicFeedbackService),
            ),
        };

        Ok(Self {
            generator,
            case_service,
            feedback_service,
            roster: Arc::new(Roster::default()),
            config: Arc::new(config),
        })
    }
}
