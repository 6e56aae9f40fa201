use log::{ info, warn };
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use crate::config::prompt::{ self, PromptConfig };
use crate::llm::chat::ChatClient;
use crate::llm::{ clean_model_text, extract_json_block };

const LONG_SENTENCE_WORDS: usize = 30;
const MAX_SUGGESTIONS: usize = 5;

/// Spoken punctuation, longest phrases first so "question mark" wins over a bare word.
static SPOKEN_PUNCTUATION: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)[ \t]*\bnew paragraph\b[ \t]*", "\n\n"),
        (r"(?i)[ \t]*\bnew line\b[ \t]*", "\n"),
        (r"(?i)[ \t]*\bquestion mark\b", "?"),
        (r"(?i)[ \t]*\bexclamation (?:point|mark)\b", "!"),
        (r"(?i)[ \t]*\bfull stop\b", "."),
        (r"(?i)[ \t]*\bperiod\b", "."),
        (r"(?i)[ \t]*\bcomma\b", ","),
        (r"(?i)[ \t]*\bsemicolon\b", ";"),
        (r"(?i)[ \t]*\bcolon\b", ":"),
        (r"(?i)\bopen (?:paren|parenthesis)\b[ \t]*", "("),
        (r"(?i)[ \t]*\bclose (?:paren|parenthesis)\b", ")"),
    ]
        .into_iter()
        .filter_map(|(pattern, symbol)| Regex::new(pattern).ok().map(|re| (re, symbol)))
        .collect()
});

static HORIZONTAL_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+([.,!?;:)])").unwrap());
static MISSING_SPACE_AFTER_PUNCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([,;!?])(\p{L})").unwrap()
});
static MISSING_SPACE_AFTER_PERIOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(\p{Lu})").unwrap());
static REPEATED_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.,;:])[.,;:]+").unwrap());
static LONE_I: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bi\b(\.\w)?").unwrap());
static WEAK_INTENSIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(very|really|extremely|quite)\s+(\w+)").unwrap()
});

const ABBREVIATIONS: &[&str] = &["e.g", "i.e", "etc", "vs", "cf", "approx", "dr", "mr", "mrs", "ms", "prof"];

fn is_abbreviation(word: &str) -> bool {
    let word = word.trim_start_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}

/// Sentences end at `!`, `?` or a `.` that does not close an abbreviation,
/// followed by whitespace. Line breaks always start a new sentence.
fn capitalize_sentences(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut capitalize_next = true;
    let mut sentence_ended = false;
    let mut word = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            if sentence_ended || c == '\n' {
                capitalize_next = true;
            }
            sentence_ended = false;
            word.clear();
            result.push(c);
            continue;
        }
        if c.is_alphanumeric() {
            if capitalize_next && c.is_alphabetic() {
                result.extend(c.to_uppercase());
            } else {
                result.push(c);
            }
            capitalize_next = false;
            sentence_ended = false;
            word.push(c);
            continue;
        }
        match c {
            '!' | '?' => {
                sentence_ended = true;
            }
            '.' => {
                sentence_ended = !is_abbreviation(&word);
            }
            _ => {}
        }
        word.push(c);
        result.push(c);
    }
    result
}

/// Deterministic cleanup of dictated or pasted text.
pub fn clean_text(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n");
    for (re, symbol) in SPOKEN_PUNCTUATION.iter() {
        out = re.replace_all(&out, *symbol).into_owned();
    }
    out = HORIZONTAL_SPACE.replace_all(&out, " ").into_owned();
    out = SPACE_BEFORE_PUNCT.replace_all(&out, "${1}").into_owned();
    out = REPEATED_PUNCT.replace_all(&out, "${1}").into_owned();
    out = MISSING_SPACE_AFTER_PUNCT.replace_all(&out, "${1} ${2}").into_owned();
    out = MISSING_SPACE_AFTER_PERIOD.replace_all(&out, ". ${1}").into_owned();
    // "i.e." keeps its lowercase i
    out = LONE_I.replace_all(&out, |caps: &regex::Captures| {
        match caps.get(1) {
            Some(_) => caps[0].to_string(),
            None => "I".to_string(),
        }
    }).into_owned();

    let lines: Vec<&str> = out.split('\n').map(str::trim).collect();
    capitalize_sentences(lines.join("\n").trim())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupSource {
    Ai,
    Rules,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupResult {
    pub text: String,
    pub source: CleanupSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

fn default_kind() -> String {
    "style".to_string()
}

impl Suggestion {
    fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            original: None,
            replacement: None,
        }
    }
}

/// Rule-based suggestions used when no model is available.
pub fn rule_suggestions(text: &str) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for sentence in text.split(['.', '!', '?']) {
        let words = sentence.split_whitespace().count();
        if words > LONG_SENTENCE_WORDS {
            let mut s = Suggestion::new(
                "clarity",
                format!("This sentence has {} words; consider splitting it.", words)
            );
            s.original = Some(sentence.trim().to_string());
            suggestions.push(s);
        }
    }

    let words: Vec<&str> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .collect();
    for pair in words.windows(2) {
        if !pair[0].is_empty() && pair[0].eq_ignore_ascii_case(pair[1]) {
            let mut s = Suggestion::new("grammar", format!("The word \"{}\" is repeated.", pair[0]));
            s.original = Some(format!("{} {}", pair[0], pair[1]));
            s.replacement = Some(pair[0].to_string());
            suggestions.push(s);
        }
    }

    for caps in WEAK_INTENSIFIER.captures_iter(text) {
        let mut s = Suggestion::new(
            "style",
            format!("\"{}\" weakens the sentence; a more precise word may be stronger.", &caps[1])
        );
        s.original = Some(caps[0].to_string());
        suggestions.push(s);
    }

    let trimmed = text.trim_end();
    if !trimmed.is_empty() && !trimmed.ends_with(['.', '!', '?', '"', ')']) {
        suggestions.push(Suggestion::new("grammar", "End the text with punctuation."));
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestionEntry {
    Full(Suggestion),
    Text(String),
}

fn parse_ai_suggestions(reply: &str) -> Vec<Suggestion> {
    if let Some(json) = extract_json_block(reply) {
        if let Ok(entries) = serde_json::from_str::<Vec<SuggestionEntry>>(json) {
            return entries
                .into_iter()
                .map(|e| match e {
                    SuggestionEntry::Full(s) => s,
                    SuggestionEntry::Text(t) => Suggestion::new("style", t),
                })
                .filter(|s| !s.message.trim().is_empty())
                .take(MAX_SUGGESTIONS)
                .collect();
        }
    }

    reply
        .lines()
        .map(|l| {
            l.trim()
                .trim_start_matches(|c: char| {
                    c == '-' || c == '*' || c == '•' || c.is_ascii_digit() || c == '.' || c == ')'
                })
                .trim()
        })
        .filter(|l| !l.is_empty())
        .take(MAX_SUGGESTIONS)
        .map(|l| Suggestion::new("style", l))
        .collect()
}

/// Cleanup with an optional model pass; every model failure degrades to the rules.
pub struct TextCleaner {
    client: Option<Arc<dyn ChatClient>>,
    prompts: Arc<PromptConfig>,
}

impl TextCleaner {
    pub fn new(client: Option<Arc<dyn ChatClient>>, prompts: Arc<PromptConfig>) -> Self {
        Self { client, prompts }
    }

    pub fn set_prompts(&mut self, prompts: Arc<PromptConfig>) {
        self.prompts = prompts;
    }

    pub async fn cleanup(&self, text: &str, use_ai: bool) -> CleanupResult {
        let rules = || CleanupResult { text: clean_text(text), source: CleanupSource::Rules };
        if !use_ai || text.trim().is_empty() {
            return rules();
        }
        let Some(client) = &self.client else {
            return rules();
        };

        let prompt = match prompt::get_cleanup_prompt(&self.prompts, text) {
            Ok(p) => p,
            Err(e) => {
                warn!("Cleanup prompt unavailable: {}", e);
                return rules();
            }
        };
        match client.complete(&prompt).await {
            Ok(resp) => {
                let cleaned = clean_model_text(&resp.response);
                if cleaned.is_empty() {
                    warn!("Model returned an empty cleanup, using rules");
                    rules()
                } else {
                    info!("Text cleaned by model ({} chars)", cleaned.len());
                    CleanupResult { text: cleaned, source: CleanupSource::Ai }
                }
            }
            Err(e) => {
                warn!("Model cleanup failed, using rules: {}", e);
                rules()
            }
        }
    }

    pub async fn suggest(&self, text: &str) -> Vec<Suggestion> {
        let Some(client) = &self.client else {
            return rule_suggestions(text);
        };
        let prompt = match prompt::get_suggestion_prompt(&self.prompts, text) {
            Ok(p) => p,
            Err(e) => {
                warn!("Suggestion prompt unavailable: {}", e);
                return rule_suggestions(text);
            }
        };
        match client.complete(&prompt).await {
            Ok(resp) => {
                let parsed = parse_ai_suggestions(&resp.response);
                if parsed.is_empty() { rule_suggestions(text) } else { parsed }
            }
            Err(e) => {
                warn!("Model suggestions failed, using rules: {}", e);
                rule_suggestions(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::testing::ScriptedChatClient;

    #[test]
    fn test_period_becomes_full_stop_and_sentences_capitalized() {
        assert_eq!(
            clean_text("hello world period this is a test period"),
            "Hello world. This is a test."
        );
    }

    #[test]
    fn test_spoken_punctuation_and_spacing() {
        assert_eq!(
            clean_text("is it due friday question mark  yes comma i think so exclamation point"),
            "Is it due friday? Yes, I think so!"
        );
        assert_eq!(clean_text("first line new line second line"), "First line\nSecond line");
        assert_eq!(clean_text("wait ,what?really"), "Wait, what? Really");
    }

    #[test]
    fn test_abbreviations_do_not_end_sentences() {
        assert_eq!(
            clean_text("use a loop e.g. a for loop period then test it i.e. run it"),
            "Use a loop e.g. a for loop. Then test it i.e. run it"
        );
        assert_eq!(clean_text("see version 2.5 of the notes"), "See version 2.5 of the notes");
    }

    #[test]
    fn test_cleanup_is_deterministic() {
        let input = "the essay period it needs work comma but i like it period";
        assert_eq!(clean_text(input), clean_text(input));
        assert_eq!(clean_text(input), "The essay. It needs work, but I like it.");
    }

    #[test]
    fn test_rule_suggestions() {
        let suggestions = rule_suggestions("This is is a very good essay");
        assert!(suggestions.iter().any(|s| s.replacement.as_deref() == Some("is")));
        assert!(suggestions.iter().any(|s| s.message.contains("very")));
        assert!(suggestions.iter().any(|s| s.message.contains("punctuation")));
    }

    #[tokio::test]
    async fn test_ai_cleanup_falls_back_on_failure() {
        let prompts = PromptConfig::builtin().unwrap();
        let cleaner = TextCleaner::new(Some(Arc::new(ScriptedChatClient::failing())), prompts);
        let result = cleaner.cleanup("hi there period", true).await;
        assert_eq!(result.source, CleanupSource::Rules);
        assert_eq!(result.text, "Hi there.");
    }

    #[tokio::test]
    async fn test_ai_cleanup_uses_model_reply() {
        let prompts = PromptConfig::builtin().unwrap();
        let client = Arc::new(ScriptedChatClient::new(&["```\nHi there.\n```"]));
        let cleaner = TextCleaner::new(Some(client.clone()), prompts);
        let result = cleaner.cleanup("hi there period", true).await;
        assert_eq!(result.source, CleanupSource::Ai);
        assert_eq!(result.text, "Hi there.");
        assert!(client.prompts.lock().unwrap()[0].contains("hi there period"));
    }

    #[tokio::test]
    async fn test_ai_suggestions_parse_json_and_bullets() {
        let prompts = PromptConfig::builtin().unwrap();
        let client = Arc::new(
            ScriptedChatClient::new(
                &[
                    r#"```json
[{"kind":"clarity","message":"Define your thesis early."},"Vary sentence length."]
```"#,
                    "- Use active voice\n- Cite the source",
                ]
            )
        );
        let cleaner = TextCleaner::new(Some(client), prompts);

        let json = cleaner.suggest("draft").await;
        assert_eq!(json.len(), 2);
        assert_eq!(json[0].kind, "clarity");
        assert_eq!(json[1].message, "Vary sentence length.");

        let bullets = cleaner.suggest("draft").await;
        assert_eq!(bullets[0].message, "Use active voice");
        assert_eq!(bullets[1].message, "Cite the source");
    }
}
