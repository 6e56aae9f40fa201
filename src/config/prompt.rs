use log::{ info, warn };
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

const BUILTIN_PROMPTS: &str = include_str!("../../json/prompts.json");

const REQUIRED_QUERY_TEMPLATES: &[&str] = &[
    "text_cleanup",
    "text_suggestions",
    "course_from_text",
    "course_from_prompt",
];
const REQUIRED_RESPONSE_TEMPLATES: &[&str] = &[
    "tutor_reply",
    "tutor_hint_mode",
    "greeting",
    "offline_reply",
];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template '{0}' not found")]
    TemplateNotFound(String),
    #[error("Prompt file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub query_templates: HashMap<String, String>,
    pub response_templates: HashMap<String, String>,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        for key in REQUIRED_QUERY_TEMPLATES {
            if !self.query_templates.contains_key(*key) {
                return Err(PromptError::TemplateNotFound(format!("query_templates:{}", key)));
            }
        }
        for key in REQUIRED_RESPONSE_TEMPLATES {
            if !self.response_templates.contains_key(*key) {
                return Err(PromptError::TemplateNotFound(format!("response_templates:{}", key)));
            }
        }
        Ok(())
    }

    fn parse(raw: &str) -> Result<Self, PromptError> {
        let mut config: PromptConfig = serde_json::from_str(raw)?;
        config.validate()?;
        config.last_loaded = Some(SystemTime::now());
        Ok(config)
    }

    /// The prompt set compiled into the binary.
    pub fn builtin() -> Result<Arc<Self>, PromptError> {
        Ok(Arc::new(Self::parse(BUILTIN_PROMPTS)?))
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let config = PromptConfig::parse(&file_content)?;
    info!("Loaded prompts from '{}'", path.as_ref().display());
    Ok(Arc::new(config))
}

/// Loads prompts from `path`, using the built-in set when the file does not exist.
pub fn load_or_builtin<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    if path.as_ref().exists() {
        load_prompts(path)
    } else {
        warn!("Prompts file '{}' not found, using built-in prompts", path.as_ref().display());
        PromptConfig::builtin()
    }
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    if !path.as_ref().exists() {
        return Ok(None);
    }
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        match current_config.last_loaded {
            Some(last_loaded) if modified <= last_loaded => {}
            Some(_) => {
                info!("Prompts file changed, reloading...");
                return Ok(Some(load_prompts(path)?));
            }
            None => {
                info!("No last_loaded timestamp, reloading prompts...");
                return Ok(Some(load_prompts(path)?));
            }
        }
    }
    Ok(None)
}

fn get_query_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config.query_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("query_templates:{}", key)))
}

fn get_response_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config.response_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("response_templates:{}", key)))
}

pub fn get_tutor_prompt(
    config: &PromptConfig,
    context: &str,
    history: &str,
    message: &str,
    hint_mode: bool
) -> Result<String, PromptError> {
    let key = if hint_mode { "tutor_hint_mode" } else { "tutor_reply" };
    let template = get_response_template(config, key)?;
    Ok(
        template
            .replace("{context}", context)
            .replace("{history}", history)
            .replace("{message}", message)
    )
}

pub fn get_greeting(config: &PromptConfig, title: &str) -> Result<String, PromptError> {
    Ok(get_response_template(config, "greeting")?.replace("{title}", title))
}

pub fn get_offline_reply(config: &PromptConfig, title: &str) -> Result<String, PromptError> {
    Ok(get_response_template(config, "offline_reply")?.replace("{title}", title))
}

pub fn get_cleanup_prompt(config: &PromptConfig, text: &str) -> Result<String, PromptError> {
    Ok(get_query_template(config, "text_cleanup")?.replace("{text}", text))
}

pub fn get_suggestion_prompt(config: &PromptConfig, text: &str) -> Result<String, PromptError> {
    Ok(get_query_template(config, "text_suggestions")?.replace("{text}", text))
}

pub fn get_course_text_prompt(
    config: &PromptConfig,
    detected: &str,
    text: &str
) -> Result<String, PromptError> {
    let template = get_query_template(config, "course_from_text")?;
    Ok(template.replace("{detected}", detected).replace("{text}", text))
}

pub fn get_course_request_prompt(config: &PromptConfig, prompt: &str) -> Result<String, PromptError> {
    Ok(get_query_template(config, "course_from_prompt")?.replace("{prompt}", prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_prompts_are_complete() {
        let config = PromptConfig::builtin().unwrap();
        let prompt = get_tutor_prompt(&config, "Course: CSE 110", "", "What is a loop?", false).unwrap();
        assert!(prompt.contains("Course: CSE 110"));
        assert!(prompt.contains("Student: What is a loop?"));
        assert!(!prompt.contains("{message}"));

        let hint = get_tutor_prompt(&config, "ctx", "", "give me the answer", true).unwrap();
        assert!(hint.contains("Do not provide the answer"));
    }

    #[test]
    fn test_missing_template_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"query_templates": {{}}, "response_templates": {{}}}}"#).unwrap();
        match load_prompts(file.path()) {
            Err(PromptError::TemplateNotFound(key)) => assert!(key.starts_with("query_templates:")),
            other => panic!("expected missing template error, got {:?}", other),
        }
    }

    #[test]
    fn test_reload_skips_unchanged_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BUILTIN_PROMPTS.as_bytes()).unwrap();
        file.flush().unwrap();
        let loaded = load_prompts(file.path()).unwrap();
        assert!(reload_prompts_if_changed(file.path(), &loaded).unwrap().is_none());
    }
}
