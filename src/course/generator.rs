use log::{ info, warn };
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;
use uuid::Uuid;

use super::classify::{ classify, CourseType };
use super::parser::{ parse_course_text, ParsedCourse };
use super::template::{ generate_skeleton, term_weeks };
use crate::catalog::CourseCatalog;
use crate::config::prompt::{ self, PromptConfig };
use crate::llm::chat::ChatClient;
use crate::llm::extract_json_block;
use crate::models::course::{ Course, Item, ItemDetails, Module, QuizQuestion };

static MODULE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:[#*\-]+[ \t]*)?\**(?:module|week|unit)[ \t]+(\d+)\**[ \t]*[:\-–—.][ \t]*(.+?)\**[ \t]*$"
    ).unwrap()
});
static WEEK_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})[ \t-]*weeks?\b").unwrap());
static REQUEST_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:create|build|make|generate|design|write)?\s*(?:me\s+)?(?:an?\s+)?(?:\d{1,2}[ \t-]*weeks?\s+)?(?:long\s+)?(?:course\s+(?:on|about|in|for)\s+)?"
    ).unwrap()
});
static TRAILING_COURSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:course|class)\b.*$").unwrap()
});

const MAX_WEEKS: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationSource {
    Ai,
    Template,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCourse {
    pub course: Course,
    pub course_type: CourseType,
    pub source: GenerationSource,
    pub parsed: ParsedCourse,
}

#[derive(Deserialize)]
struct AiCourse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    instructor: Option<String>,
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    modules: Vec<AiModule>,
}

#[derive(Deserialize)]
struct AiModule {
    name: String,
    #[serde(default)]
    items: Vec<AiItem>,
}

#[derive(Deserialize)]
struct AiItem {
    title: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    points: Option<u32>,
    #[serde(default)]
    questions: Vec<QuizQuestion>,
}

fn fresh_id(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AiItem {
    fn into_item(self) -> Item {
        let details = match self.kind.as_deref().map(str::to_lowercase).as_deref() {
            Some("quiz") | Some("exam") =>
                ItemDetails::Quiz { questions: self.questions, time_limit_minutes: None, due_date: None },
            Some("reading") | Some("page") | Some("video") =>
                ItemDetails::Reading { content: self.description, key_points: Vec::new(), videos: Vec::new() },
            _ =>
                ItemDetails::Assignment {
                    description: self.description,
                    points: self.points.unwrap_or(10),
                    due_date: None,
                },
        };
        let prefix = match details {
            ItemDetails::Quiz { .. } => "q",
            ItemDetails::Reading { .. } => "r",
            ItemDetails::Assignment { .. } => "a",
        };
        Item { id: fresh_id(prefix), title: self.title, details }
    }
}

/// Model reply as a JSON course, with gaps filled from the parsed text.
fn course_from_json(reply: &str, parsed: &ParsedCourse) -> Option<Course> {
    let block = extract_json_block(reply)?;
    let ai: AiCourse = match serde_json::from_str(block) {
        Ok(c) => c,
        Err(e) => {
            warn!("Model course JSON did not parse: {}", e);
            return None;
        }
    };
    if ai.modules.is_empty() {
        return None;
    }
    let modules = ai.modules
        .into_iter()
        .map(|m| Module {
            id: fresh_id("m"),
            name: m.name,
            items: m.items.into_iter().map(AiItem::into_item).collect(),
        })
        .collect();
    Some(Course {
        id: Uuid::new_v4().to_string(),
        name: non_blank(ai.name)
            .or_else(|| parsed.title.clone())
            .unwrap_or_else(|| "Untitled Course".to_string()),
        code: non_blank(ai.code)
            .or_else(|| parsed.code.clone())
            .unwrap_or_else(|| "TBD".to_string()),
        instructor: non_blank(ai.instructor)
            .or_else(|| (!parsed.instructors.is_empty()).then(|| parsed.instructors.join(", ")))
            .unwrap_or_else(|| "TBA".to_string()),
        term: non_blank(ai.term)
            .or_else(|| parsed.term_label())
            .unwrap_or_else(|| "TBD".to_string()),
        description: non_blank(ai.description).or_else(|| parsed.description.clone()),
        modules,
    })
}

/// `Module 1: Foo` / `Week 2 - Bar` headings from a prose reply, each with a
/// reading and an assignment.
fn course_from_headings(reply: &str, parsed: &ParsedCourse, course_type: CourseType) -> Option<Course> {
    let modules: Vec<Module> = MODULE_HEADING.captures_iter(reply)
        .map(|caps| {
            let topic = caps[2].trim().to_string();
            Module {
                id: fresh_id("m"),
                name: format!("Module {}: {}", &caps[1], topic),
                items: vec![
                    Item {
                        id: fresh_id("r"),
                        title: format!("{} Reading", topic),
                        details: ItemDetails::Reading {
                            content: String::new(),
                            key_points: Vec::new(),
                            videos: Vec::new(),
                        },
                    },
                    Item {
                        id: fresh_id("a"),
                        title: format!("{} Assignment", topic),
                        details: ItemDetails::Assignment {
                            description: String::new(),
                            points: 10,
                            due_date: None,
                        },
                    }
                ],
            }
        })
        .collect();
    if modules.is_empty() {
        return None;
    }
    let mut course = generate_skeleton(parsed, course_type, 1);
    course.modules = modules;
    Some(course)
}

fn title_case(text: &str) -> String {
    const SMALL: &[&str] = &["a", "an", "and", "of", "the", "to", "in", "for", "on", "with"];
    text.split_whitespace()
        .enumerate()
        .map(|(i, w)| {
            if i > 0 && SMALL.contains(&w.to_lowercase().as_str()) {
                return w.to_lowercase();
            }
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Topic and week count from a request like "Create a 6 week introduction to Python course".
pub fn parse_course_request(request: &str) -> (String, Option<u32>) {
    let weeks = WEEK_COUNT.captures(request)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|w| *w > 0)
        .map(|w| w.min(MAX_WEEKS));
    let first_sentence = request.split(['.', '!', '?', '\n']).next().unwrap_or(request);
    let stripped = REQUEST_PREAMBLE.replace(first_sentence, "");
    let stripped = TRAILING_COURSE.replace(&stripped, "");
    let topic = stripped.trim().trim_end_matches([',', ';', ':']).trim();
    let topic = if topic.is_empty() { request.trim() } else { topic };
    (title_case(topic), weeks)
}

pub struct CourseGenerator {
    client: Option<Arc<dyn ChatClient>>,
    prompts: Arc<PromptConfig>,
    catalog: Arc<dyn CourseCatalog>,
}

impl CourseGenerator {
    pub fn new(
        client: Option<Arc<dyn ChatClient>>,
        prompts: Arc<PromptConfig>,
        catalog: Arc<dyn CourseCatalog>
    ) -> Self {
        Self { client, prompts, catalog }
    }

    pub fn set_prompts(&mut self, prompts: Arc<PromptConfig>) {
        self.prompts = prompts;
    }

    async fn ask_model(&self, prompt: Result<String, prompt::PromptError>) -> Option<String> {
        let client = self.client.as_ref()?;
        let prompt = match prompt {
            Ok(p) => p,
            Err(e) => {
                warn!("Course prompt unavailable: {}", e);
                return None;
            }
        };
        match client.complete(&prompt).await {
            Ok(resp) => Some(resp.response),
            Err(e) => {
                warn!("Model course generation failed, using template: {}", e);
                None
            }
        }
    }

    fn register(&self, generated: GeneratedCourse) -> GeneratedCourse {
        info!(
            "Generated course '{}' ({}, {} modules, source={:?})",
            generated.course.name,
            generated.course_type,
            generated.course.modules.len(),
            generated.source
        );
        self.catalog.add_course(generated.course.clone());
        generated
    }

    /// Builds a course from pasted catalog or syllabus text.
    pub async fn from_text(&self, text: &str) -> GeneratedCourse {
        let parsed = parse_course_text(text);
        let course_type = classify(&parsed);

        let detected = serde_json::to_string_pretty(&parsed).unwrap_or_default();
        if let Some(reply) = self.ask_model(prompt::get_course_text_prompt(&self.prompts, &detected, text)).await {
            if let Some(course) = course_from_json(&reply, &parsed) {
                return self.register(GeneratedCourse { course, course_type, source: GenerationSource::Ai, parsed });
            }
            if let Some(course) = course_from_headings(&reply, &parsed, course_type) {
                return self.register(GeneratedCourse { course, course_type, source: GenerationSource::Ai, parsed });
            }
            warn!("Model reply held no usable course outline, using template");
        }

        let course = generate_skeleton(&parsed, course_type, term_weeks(&parsed));
        self.register(GeneratedCourse { course, course_type, source: GenerationSource::Template, parsed })
    }

    /// Builds a course from a free-text request.
    pub async fn from_prompt(&self, request: &str) -> GeneratedCourse {
        let (topic, weeks) = parse_course_request(request);
        let parsed = ParsedCourse {
            title: Some(topic),
            description: Some(request.trim().to_string()),
            ..ParsedCourse::default()
        };
        let course_type = classify(&parsed);

        if let Some(reply) = self.ask_model(prompt::get_course_request_prompt(&self.prompts, request)).await {
            if let Some(course) = course_from_json(&reply, &parsed) {
                return self.register(GeneratedCourse { course, course_type, source: GenerationSource::Ai, parsed });
            }
            if let Some(course) = course_from_headings(&reply, &parsed, course_type) {
                return self.register(GeneratedCourse { course, course_type, source: GenerationSource::Ai, parsed });
            }
            warn!("Model reply held no usable course outline, using template");
        }

        let weeks = weeks.unwrap_or_else(|| term_weeks(&parsed));
        let course = generate_skeleton(&parsed, course_type, weeks);
        self.register(GeneratedCourse { course, course_type, source: GenerationSource::Template, parsed })
    }
}
