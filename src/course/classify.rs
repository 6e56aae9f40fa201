use serde::{ Deserialize, Serialize };
use std::fmt;

use super::parser::ParsedCourse;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseType {
    Project,
    Technical,
    Science,
    Business,
    Humanities,
    General,
}

impl CourseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseType::Project => "project",
            CourseType::Technical => "technical",
            CourseType::Science => "science",
            CourseType::Business => "business",
            CourseType::Humanities => "humanities",
            CourseType::General => "general",
        }
    }
}

impl fmt::Display for CourseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Checked in this order; the first type with the best score wins ties.
// Whole words only; a trailing `*` marks a stem.
const KEYWORDS: &[(CourseType, &[&str])] = &[
    (
        CourseType::Project,
        &["applied project", "capstone", "practicum", "internship*", "thesis", "culminating"],
    ),
    (
        CourseType::Technical,
        &[
            "programming",
            "software",
            "computer*",
            "computing",
            "engineering",
            "data",
            "algorithm*",
            "coding",
            "network*",
            "technolog*",
        ],
    ),
    (
        CourseType::Science,
        &[
            "biolog*",
            "chemistry",
            "physics",
            "laboratory",
            "lab",
            "labs",
            "scientific",
            "ecology",
            "anatomy",
            "geolog*",
        ],
    ),
    (
        CourseType::Business,
        &[
            "business",
            "management",
            "marketing",
            "accounting",
            "finance",
            "financial",
            "economics",
            "entrepreneur*",
        ],
    ),
    (
        CourseType::Humanities,
        &[
            "history",
            "historical",
            "literature",
            "philosophy",
            "ethics",
            "writing",
            "english",
            "art",
            "arts",
            "music",
            "religio*",
            "cultur*",
        ],
    ),
];

const TITLE_WEIGHT: usize = 3;

fn count_hits(text: &str, keywords: &[&str]) -> usize {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    keywords
        .iter()
        .map(|kw| {
            if kw.contains(' ') {
                text.matches(kw).count()
            } else if let Some(stem) = kw.strip_suffix('*') {
                words.iter().filter(|w| w.starts_with(stem)).count()
            } else {
                words.iter().filter(|w| *w == kw).count()
            }
        })
        .sum()
}

/// Picks the course type by keyword score, title hits weighted above description hits.
pub fn classify(parsed: &ParsedCourse) -> CourseType {
    let title = parsed.title.as_deref().unwrap_or("").to_lowercase();
    let description = parsed.description.as_deref().unwrap_or("").to_lowercase();
    classify_scored(&title, &description)
}

fn classify_scored(title: &str, description: &str) -> CourseType {
    let mut best = (CourseType::General, 0);
    for (course_type, keywords) in KEYWORDS {
        let score = count_hits(title, keywords) * TITLE_WEIGHT + count_hits(description, keywords);
        if score > best.1 {
            best = (*course_type, score);
        }
    }
    best.0
}
