//! Content generation for autonomous speakers.
//!
//! The engine only needs one capability from a generator: given a speaker,
//! the case, and the recent discussion, produce that speaker's next line or
//! fail. Failures are never retried here.

use crate::{
    error::GenerationError,
    llm_client::{ChatClient, Sampling},
    participant::{Archetype, Participant},
    transcript::Contribution,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Prompt key for speaker replies.
pub const REPLY_PROMPT: &str = "discussion_reply";

/// Produces the next contribution for an autonomous speaker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generates `participant`'s reply to the recent discussion.
    ///
    /// # Arguments
    ///
    /// * `participant` - The speaker whose turn it is.
    /// * `topic` - The case under discussion.
    /// * `job_title` - The position the human is interviewing for.
    /// * `recent_history` - The latest contributions, oldest first.
    async fn generate_reply(
        &self,
        participant: &Participant,
        topic: &str,
        job_title: &str,
        recent_history: &[Contribution],
    ) -> Result<String, GenerationError>;
}

/// Renders history as `name: text` lines.
pub fn format_history(history: &[Contribution]) -> String {
    history
        .iter()
        .map(|c| format!("{}: {}", c.display_name, c.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fills the reply template's placeholders.
pub fn render_reply_prompt(
    template: &str,
    participant: &Participant,
    topic: &str,
    job_title: &str,
    history: &[Contribution],
) -> String {
    template
        .replace("{job_title}", job_title)
        .replace("{topic}", topic)
        .replace("{name}", &participant.name)
        .replace("{archetype}", &participant.archetype.to_string())
        .replace("{personality}", &participant.personality)
        .replace("{history}", &format_history(history))
}

/// A [`ContentGenerator`] backed by an OpenAI-compatible chat model.
pub struct LLMContentGenerator {
    client: ChatClient,
    prompts: HashMap<String, String>,
}

impl LLMContentGenerator {
    /// `prompts` must contain a template for [`REPLY_PROMPT`].
    pub fn new(client: ChatClient, prompts: HashMap<String, String>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl ContentGenerator for LLMContentGenerator {
    async fn generate_reply(
        &self,
        participant: &Participant,
        topic: &str,
        job_title: &str,
        recent_history: &[Contribution],
    ) -> Result<String, GenerationError> {
        let template = self
            .prompts
            .get(REPLY_PROMPT)
            .ok_or_else(|| GenerationError::MissingPrompt(REPLY_PROMPT.to_string()))?;
        let prompt = render_reply_prompt(template, participant, topic, job_title, recent_history);

        let text = self
            .client
            .complete(
                "You are a candidate in a live group interview. Reply in plain text only.",
                &prompt,
                Sampling::default(),
            )
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        Ok(text.to_string())
    }
}

/// An offline [`ContentGenerator`] with fixed lines per archetype.
///
/// Useful for local runs and tests where no provider is configured. Lines
/// rotate with the history length so consecutive turns differ.
pub struct CannedContentGenerator;

impl CannedContentGenerator {
    fn lines(archetype: Archetype) -> &'static [&'static str] {
        match archetype {
            Archetype::Aggressive => &[
                "我认为讨论应分为三个阶段：明确目标、列出方案、决定优先级。",
                "我们时间太散了，必须立刻确定核心目标。",
                "先别展开细节，框架定下来再说。",
            ],
            Archetype::Structured => &[
                "刚才大家提到了两个方向，核心分歧已明确，建议进入方案对比环节。",
                "我来收拢一下：目标已经一致，接下来讨论执行路径。",
                "总结一下共识，然后我们看剩下的风险点。",
            ],
            Archetype::Detail => &[
                "人力成本和技术风险如何覆盖？",
                "这个方案的落地周期是多久，谁来负责？",
                "预算的上限是多少，超支怎么处理？",
            ],
        }
    }
}

#[async_trait]
impl ContentGenerator for CannedContentGenerator {
    async fn generate_reply(
        &self,
        participant: &Participant,
        _topic: &str,
        _job_title: &str,
        recent_history: &[Contribution],
    ) -> Result<String, GenerationError> {
        let lines = Self::lines(participant.archetype);
        Ok(lines[recent_history.len() % lines.len()].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{participant::Roster, transcript::Transcript};

    #[test]
    fn test_render_reply_prompt() {
        let roster = Roster::default();
        let mut log = Transcript::new();
        log.append_human("我先说两句");
        log.append_agent(roster.opener().unwrap(), "框架先定");

        let prompt = render_reply_prompt(
            "[{job_title}] {topic} / {name} ({archetype})\n{history}",
            roster.opener().unwrap(),
            "新品定价",
            "产品经理",
            log.all(),
        );
        assert_eq!(
            prompt,
            "[产品经理] 新品定价 / 张强 (Aggressive) (AGGRESSIVE)\n你: 我先说两句\n张强 (Aggressive): 框架先定"
        );
    }

    #[tokio::test]
    async fn test_canned_generator_rotates_lines() {
        let roster = Roster::default();
        let speaker = &roster.members()[2];
        let mut log = Transcript::new();
        let first = CannedContentGenerator
            .generate_reply(speaker, "t", "j", log.all())
            .await
            .unwrap();
        log.append_human("x");
        let second = CannedContentGenerator
            .generate_reply(speaker, "t", "j", log.all())
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_missing_prompt_is_a_generation_error() {
        let client = ChatClient::new(
            async_openai::config::OpenAIConfig::new().with_api_key("test"),
            "gpt-4o".to_string(),
        );
        let generator = LLMContentGenerator::new(client, HashMap::new());
        let roster = Roster::default();
        let err = generator
            .generate_reply(roster.opener().unwrap(), "t", "j", &[])
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::MissingPrompt(REPLY_PROMPT.to_string()));
    }
}
