use once_cell::sync::Lazy;
use regex::Regex;

const GREETING_WORDS: &[&str] = &[
    "hi", "hello", "hey", "hiya", "howdy", "greetings", "yo", "sup", "hola", "good", "morning",
    "afternoon", "evening", "day", "there", "everyone", "all", "thanks", "thank", "you", "thx",
    "ty", "ok", "okay", "cool", "bye", "goodbye", "again", "tutor",
];

const MAX_GREETING_WORDS: usize = 4;

static DIRECT_ANSWER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(give|tell|show|send)\s+me\s+(the|all\s+the)?\s*(final\s+|full\s+|correct\s+)?answers?\b",
        r"\bwhat\s+(is|are)\s+the\s+(correct\s+)?answers?\b",
        r"\b(solve|do|finish|complete|answer)\s+(this|it|that|these|my\s+\w+)(\s+\w+)?\s+for\s+me\b",
        r"\bwrite\s+(my|the)\s+(essay|paper|assignment|report|discussion\s+post|code)\b",
        r"\bjust\s+(give|tell)\s+me\b",
        r"\banswer\s+key\b",
    ]
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
        .collect()
});

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.trim_matches('\'').to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// True for short pleasantries ("hi", "hello there!", "good morning") that carry no question.
pub fn is_greeting(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains('?') && words(trimmed).len() > 2 {
        return false;
    }
    let tokens = words(trimmed);
    if tokens.is_empty() || tokens.len() > MAX_GREETING_WORDS {
        return false;
    }
    let is_opener = |w: &str| {
        matches!(
            w,
            "hi" | "hello" | "hey" | "hiya" | "howdy" | "greetings" | "yo" | "sup" | "hola" |
            "good" | "thanks" | "thank" | "thx" | "ty" | "bye" | "goodbye"
        )
    };
    is_opener(&tokens[0]) && tokens.iter().all(|w| GREETING_WORDS.contains(&w.as_str()))
}

/// True when the student asks for a finished answer rather than help getting there.
pub fn is_direct_answer_request(text: &str) -> bool {
    DIRECT_ANSWER_PATTERNS.iter().any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greetings_are_detected() {
        assert!(is_greeting("hi"));
        assert!(is_greeting("Hello"));
        assert!(is_greeting("hey there!"));
        assert!(is_greeting("Good morning"));
        assert!(is_greeting("thanks!"));
    }

    #[test]
    fn test_substantive_questions_are_not_greetings() {
        assert!(!is_greeting("How do I submit the week 2 assignment?"));
        assert!(!is_greeting("hi, can you explain recursion in python?"));
        assert!(!is_greeting("there is a problem with my quiz"));
        assert!(!is_greeting(""));
    }

    #[test]
    fn test_direct_answer_requests() {
        assert!(is_direct_answer_request("Can you just give me the answer?"));
        assert!(is_direct_answer_request("what is the answer to question 3"));
        assert!(is_direct_answer_request("please solve this for me"));
        assert!(is_direct_answer_request("Write my essay on the French Revolution"));
        assert!(!is_direct_answer_request("How should I start thinking about question 3?"));
        assert!(!is_direct_answer_request("Can you explain the rubric?"));
    }
}
