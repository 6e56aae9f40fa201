pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Gemini,
    Ollama,
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmType::Gemini => write!(f, "gemini"),
            LlmType::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmType::Gemini),
            "ollama" => Ok(LlmType::Ollama),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Gemini,
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

/// Pulls the JSON payload out of a model reply that may wrap it in a code fence
/// or surround it with prose. Returns the outermost object or array.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let body = match trimmed.find("```") {
        Some(start) => {
            let after_fence = &trimmed[start + 3..];
            let after_lang = after_fence
                .find('\n')
                .map(|i| &after_fence[i + 1..])
                .unwrap_or(after_fence);
            match after_lang.find("```") {
                Some(end) => &after_lang[..end],
                None => after_lang,
            }
        }
        None => trimmed,
    };

    let open = body.find(|c| c == '{' || c == '[')?;
    let close_char = if body[open..].starts_with('{') { '}' } else { ']' };
    let close = body.rfind(close_char)?;
    if close <= open {
        return None;
    }
    Some(body[open..=close].trim())
}

/// Strips code fences and wrapping quotes from a plain-text model reply.
pub fn clean_model_text(text: &str) -> String {
    let mut t = text.trim();
    if t.starts_with("```") {
        t = t.trim_start_matches('`');
        if let Some(nl) = t.find('\n') {
            let first_line = &t[..nl];
            if !first_line.contains(' ') {
                t = &t[nl + 1..];
            }
        }
        t = t.trim_end().trim_end_matches('`');
    }
    let t = t.trim();
    let unquoted = t
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(t);
    unquoted.trim().to_string()
}
