use std::collections::HashSet;

use crate::history::group_by_context;
use crate::models::chat::{ Message, SimilarConversation };

use super::intent::is_greeting;

pub const DEFAULT_THRESHOLD: f64 = 0.6;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "in", "on", "at", "to", "for",
    "of", "and", "or", "but", "with", "from", "by", "as", "how", "what", "where", "when", "why",
    "which", "who", "i", "you", "me", "my", "your", "it", "its", "this", "that", "these", "those",
    "do", "does", "did", "can", "could", "would", "should", "will", "please", "about", "there",
    "we", "our", "so", "if", "any", "some", "have", "has", "had", "just", "im",
];

/// Lowercased content words with stop words and single characters removed.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Intersection over union of the filtered token sets, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    (intersection as f64) / (union as f64)
}

/// Finds the earlier conversation whose opening question best matches `candidate`.
pub fn find_similar_conversation(
    candidate: &str,
    history: &[Message],
    threshold: f64,
    exclude_key: Option<&str>
) -> Option<SimilarConversation> {
    if candidate.trim().is_empty() || is_greeting(candidate) {
        return None;
    }

    let mut best: Option<SimilarConversation> = None;
    for group in group_by_context(history) {
        if exclude_key == Some(group.key.as_str()) {
            continue;
        }
        let Some(first) = group.first_user_message() else {
            continue;
        };
        let Some(context) = first.context.clone() else {
            continue;
        };
        let score = similarity(candidate, &first.content);
        if score < threshold {
            continue;
        }
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(SimilarConversation {
                key: group.key.clone(),
                context,
                first_message: first.content.clone(),
                score,
            });
        }
    }
    best
}
