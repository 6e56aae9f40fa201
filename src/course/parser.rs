//! Field extraction from course text pasted out of a catalog or syllabus.
//!
//! Rules run in a fixed order and each field keeps the first match, so a
//! code line always wins over a later `Title:` line.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Deserialize, Serialize };

static CODE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*([A-Z]{2,4})[ \t]?(\d{3}[A-Z]?)\b[ \t]*(?:[:\-–—|][ \t]*(.*?))?[ \t]*$").unwrap()
});
static CODE_ANYWHERE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{2,4})[ \t]?(\d{3}[A-Z]?)\b").unwrap());
static TITLE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:course[ \t]+)?title[ \t]*:[ \t]*(.+?)[ \t]*$").unwrap()
});
static TRAILING_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*\(([^)]*)\)[ \t]*$").unwrap());
static INSTRUCTOR_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:instructors?(?:\(s\))?|professors?|faculty|taught[ \t]+by)[ \t]*[:\-]?[ \t]*(.+?)[ \t]*$"
    ).unwrap()
});
static NAME_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*(?:,|;|&|\band\b)\s*").unwrap());
static NUMERIC_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2}/\d{1,2}/\d{4})\s*(?:-|–|—|to|through)\s*(\d{1,2}/\d{1,2}/\d{4})"
    ).unwrap()
});
static ISO_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})\s*(?:to|through|–|—|\s-\s)\s*(\d{4}-\d{2}-\d{2})").unwrap()
});
static MONTH_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"([A-Z][a-z]{2,8}\.?\s+\d{1,2},?\s+\d{4})\s*(?:-|–|—|to|through)\s*([A-Z][a-z]{2,8}\.?\s+\d{1,2},?\s+\d{4})"
    ).unwrap()
});
static UNITS_LABELLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:units|credits?|credit[ \t]+hours)[ \t]*[:\-]?[ \t]*(\d+(?:\.\d+)?)").unwrap()
});
static UNITS_TRAILING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)[ \t]*(?:credit[ \t]+hours?|credits?|units)\b").unwrap()
});
static DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:course[ \t]+)?description[ \t]*[:\-][ \t]*").unwrap()
});
static FIELD_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z ()/]{1,40}:").unwrap());
static TERM_YEAR_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(20\d{2})[ \t]+(spring|summer|fall|winter)\b").unwrap()
});
static TERM_SEASON_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(spring|summer|fall|winter)[ \t]+(20\d{2})\b").unwrap()
});
static SESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bsession[ \t]+|(?:spring|summer|fall|winter)[ \t]*-[ \t]*)([ABC])\b").unwrap()
});

const MIN_DESCRIPTION_WORDS: usize = 8;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCourse {
    pub code: Option<String>,
    pub title: Option<String>,
    pub instructors: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub units: Option<f32>,
    pub description: Option<String>,
    pub term: Option<String>,
    pub session: Option<char>,
}

impl ParsedCourse {
    /// `2025 Spring - C` style label, when a term was found.
    pub fn term_label(&self) -> Option<String> {
        let term = self.term.as_ref()?;
        Some(match self.session {
            Some(s) => format!("{} - {}", term, s),
            None => term.clone(),
        })
    }
}

fn titlecase(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn parse_numeric_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%m/%d/%Y").ok()
}

fn parse_month_date(s: &str) -> Option<NaiveDate> {
    let normalized = s.replace('.', "").replace(',', "");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    ["%B %d %Y", "%b %d %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}

fn extract_code_and_title(text: &str, parsed: &mut ParsedCourse) {
    if let Some(caps) = CODE_LINE.captures(text) {
        parsed.code = Some(format!("{} {}", &caps[1], &caps[2]));
        if let Some(rest) = caps.get(3).map(|m| m.as_str().trim()).filter(|s| !s.is_empty()) {
            parsed.title = Some(rest.to_string());
        } else {
            let after = &text[caps.get(0).map_or(0, |m| m.end())..];
            parsed.title = after
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .filter(|l| !l.contains(':') && !TERM_YEAR_FIRST.is_match(l) && !TERM_SEASON_FIRST.is_match(l))
                .map(str::to_string);
        }
    } else if let Some(caps) = CODE_ANYWHERE.captures(text) {
        parsed.code = Some(format!("{} {}", &caps[1], &caps[2]));
    }

    if parsed.title.is_none() {
        parsed.title = TITLE_LINE.captures(text).map(|c| c[1].to_string());
    }

    if let Some(title) = parsed.title.take() {
        let marker = TRAILING_PAREN.captures(&title).filter(|caps| is_term_marker(&caps[1]));
        let cleaned = match marker {
            Some(caps) => {
                let inner = caps[1].to_string();
                if parsed.term.is_none() {
                    extract_term(&inner, parsed);
                }
                TRAILING_PAREN.replace(&title, "").trim().to_string()
            }
            None => title.trim().to_string(),
        };
        if !cleaned.is_empty() {
            parsed.title = Some(cleaned);
        }
    }
}

/// `(2025 Spring - C)` style markers; other parentheses belong to the title.
fn is_term_marker(text: &str) -> bool {
    TERM_YEAR_FIRST.is_match(text) || TERM_SEASON_FIRST.is_match(text) || SESSION.is_match(text)
}

fn extract_term(text: &str, parsed: &mut ParsedCourse) {
    if let Some(caps) = TERM_YEAR_FIRST.captures(text) {
        parsed.term = Some(format!("{} {}", &caps[1], titlecase(&caps[2])));
    } else if let Some(caps) = TERM_SEASON_FIRST.captures(text) {
        parsed.term = Some(format!("{} {}", &caps[2], titlecase(&caps[1])));
    }
    if parsed.session.is_none() {
        parsed.session = SESSION.captures(text)
            .and_then(|c| c[1].chars().next())
            .map(|c| c.to_ascii_uppercase());
    }
}

fn extract_instructors(text: &str) -> Vec<String> {
    let Some(caps) = INSTRUCTOR_LINE.captures(text) else {
        return Vec::new();
    };
    NAME_SEPARATOR.split(&caps[1])
        .map(|n| n.trim().trim_end_matches('.').trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

fn extract_dates(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    if let Some(caps) = NUMERIC_RANGE.captures(text) {
        return (parse_numeric_date(&caps[1]), parse_numeric_date(&caps[2]));
    }
    if let Some(caps) = ISO_RANGE.captures(text) {
        return (
            NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok(),
            NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").ok(),
        );
    }
    if let Some(caps) = MONTH_RANGE.captures(text) {
        return (parse_month_date(&caps[1]), parse_month_date(&caps[2]));
    }
    (None, None)
}

fn extract_units(text: &str) -> Option<f32> {
    UNITS_LABELLED.captures(text)
        .or_else(|| UNITS_TRAILING.captures(text))
        .and_then(|c| c[1].parse().ok())
}

fn extract_description(text: &str) -> Option<String> {
    if let Some(m) = DESCRIPTION.find(text) {
        let mut lines = Vec::new();
        for (i, line) in text[m.end()..].lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || (i > 0 && FIELD_LINE.is_match(line)) {
                break;
            }
            lines.push(line);
        }
        let description = lines.join(" ");
        if !description.is_empty() {
            return Some(description);
        }
    }

    text.split("\n\n")
        .flat_map(|para| para.lines())
        .map(str::trim)
        .filter(|l| !FIELD_LINE.is_match(l) && !CODE_LINE.is_match(l))
        .filter(|l| l.split_whitespace().count() >= MIN_DESCRIPTION_WORDS)
        .max_by_key(|l| l.len())
        .map(str::to_string)
}

pub fn parse_course_text(text: &str) -> ParsedCourse {
    let text = text.replace("\r\n", "\n");
    let mut parsed = ParsedCourse::default();

    extract_code_and_title(&text, &mut parsed);
    parsed.instructors = extract_instructors(&text);
    let (start, end) = extract_dates(&text);
    parsed.start_date = start;
    parsed.end_date = end;
    parsed.units = extract_units(&text);
    parsed.description = extract_description(&text);
    if parsed.term.is_none() {
        extract_term(&text, &mut parsed);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASU_SAMPLE: &str =
        "LDT 593: Applied Project\n\
2025 Spring - Session C\n\
Instructor(s): Dr. Jane Doe, Prof. Mark Lee\n\
Dates: 01/13/2025 - 05/02/2025\n\
Units: 3\n\
Course Description: Students design, develop and evaluate an instructional solution\n\
for a real client as the culminating project of the program.\n\
Enrollment Requirements: Graduate students in Learning Design and Technologies\n";

    #[test]
    fn test_asu_sample_extracts_code_and_title() {
        let parsed = parse_course_text(ASU_SAMPLE);
        assert_eq!(parsed.code.as_deref(), Some("LDT 593"));
        assert_eq!(parsed.title.as_deref(), Some("Applied Project"));
        assert_eq!(parsed.instructors, vec!["Dr. Jane Doe", "Prof. Mark Lee"]);
        assert_eq!(parsed.start_date, NaiveDate::from_ymd_opt(2025, 1, 13));
        assert_eq!(parsed.end_date, NaiveDate::from_ymd_opt(2025, 5, 2));
        assert_eq!(parsed.units, Some(3.0));
        assert_eq!(parsed.term.as_deref(), Some("2025 Spring"));
        assert_eq!(parsed.session, Some('C'));
        assert_eq!(parsed.term_label().as_deref(), Some("2025 Spring - C"));
        let description = parsed.description.unwrap();
        assert!(description.starts_with("Students design"));
        assert!(description.ends_with("of the program."));
    }

    #[test]
    fn test_class_search_format_with_session_suffix() {
        let text = "LDT 593 - Applied Project (2025 Spring - C)\nTaught by Jane Doe and Mark Lee\n3 credit hours";
        let parsed = parse_course_text(text);
        assert_eq!(parsed.code.as_deref(), Some("LDT 593"));
        assert_eq!(parsed.title.as_deref(), Some("Applied Project"));
        assert_eq!(parsed.term.as_deref(), Some("2025 Spring"));
        assert_eq!(parsed.session, Some('C'));
        assert_eq!(parsed.instructors, vec!["Jane Doe", "Mark Lee"]);
        assert_eq!(parsed.units, Some(3.0));
    }

    #[test]
    fn test_title_keeps_parentheses_that_are_not_terms() {
        let parsed = parse_course_text("MAT 265 - Calculus for Engineers I (Calculus I)");
        assert_eq!(parsed.title.as_deref(), Some("Calculus for Engineers I (Calculus I)"));
        assert_eq!(parsed.term, None);

        let parsed = parse_course_text("CSE 240: Introduction to Programming Languages (Honors)");
        assert_eq!(parsed.title.as_deref(), Some("Introduction to Programming Languages (Honors)"));
    }

    #[test]
    fn test_month_name_dates_and_title_line() {
        let text = "Course Title: Introduction to Ethics\nProfessor: A. Smith\nJanuary 8, 2026 - April 24, 2026\nFall 2025";
        let parsed = parse_course_text(text);
        assert_eq!(parsed.code, None);
        assert_eq!(parsed.title.as_deref(), Some("Introduction to Ethics"));
        assert_eq!(parsed.start_date, NaiveDate::from_ymd_opt(2026, 1, 8));
        assert_eq!(parsed.end_date, NaiveDate::from_ymd_opt(2026, 4, 24));
        assert_eq!(parsed.term.as_deref(), Some("2025 Fall"));
    }

    #[test]
    fn test_unstructured_text_yields_empty_fields() {
        let parsed = parse_course_text("just some notes");
        assert_eq!(parsed, ParsedCourse::default());
    }
}
