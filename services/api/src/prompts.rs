//! Prompt templates, one markdown file per template.

use crate::config::{Config, Provider};
use anyhow::{Context, Result};
use crossfire_core::{casebook::TOPIC_PROMPT, feedback::FEEDBACK_PROMPT, generator::REPLY_PROMPT};
use std::{collections::HashMap, fs, path::Path};

/// Templates every LLM-backed provider needs.
pub const REQUIRED_PROMPTS: [&str; 3] = [REPLY_PROMPT, TOPIC_PROMPT, FEEDBACK_PROMPT];

/// Loads every `*.md` file in `prompts_path`, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

/// Fails if any of [`REQUIRED_PROMPTS`] is missing.
pub fn ensure_required(prompts: &HashMap<String, String>) -> Result<()> {
    for key in REQUIRED_PROMPTS {
        anyhow::ensure!(
            prompts.contains_key(key),
            "{}.md not found in prompts directory",
            key
        );
    }
    Ok(())
}

/// Loads the prompts `config.provider` needs.
///
/// The mock provider never renders a template, so an unreadable directory
/// yields an empty set there instead of an error.
pub fn prompts_for(config: &Config) -> Result<HashMap<String, String>> {
    let prompts = match load_prompts(&config.prompts_path) {
        Ok(prompts) => prompts,
        Err(e) if config.provider == Provider::Mock => {
            tracing::info!(error = %e, "No prompts loaded; the mock provider does not need them.");
            HashMap::new()
        }
        Err(e) => return Err(e),
    };
    if config.provider != Provider::Mock {
        ensure_required(&prompts)?;
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_prompts_reads_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("discussion_reply.md"), "reply {topic}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let prompts = load_prompts(dir.path()).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts["discussion_reply"], "reply {topic}");
        assert!(ensure_required(&prompts).is_err());
    }

    #[test]
    fn test_shipped_prompts_are_complete() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../prompts");
        let prompts = load_prompts(&path).unwrap();
        ensure_required(&prompts).unwrap();
        assert!(prompts[REPLY_PROMPT].contains("{history}"));
        assert!(prompts[FEEDBACK_PROMPT].contains("{transcript}"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(load_prompts(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn test_prompts_for_mock_tolerates_missing_directory() {
        let config = Config {
            prompts_path: "/definitely/not/here".into(),
            ..Config::mock()
        };
        assert!(prompts_for(&config).unwrap().is_empty());

        let config = Config {
            provider: Provider::OpenAI,
            openai_api_key: Some("sk-test".to_string()),
            ..config
        };
        assert!(prompts_for(&config).is_err());
    }
}
