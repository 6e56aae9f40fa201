use chrono::{ Duration, NaiveDate };
use uuid::Uuid;

use super::classify::CourseType;
use super::parser::ParsedCourse;
use crate::models::course::{ Course, Item, ItemDetails, Module, QuizQuestion };

const DEFAULT_WEEKS: u32 = 15;
const SHORT_SESSION_WEEKS: u32 = 8;
const MAX_WEEKS: u32 = 20;

/// Length of the term in weeks.
pub fn term_weeks(parsed: &ParsedCourse) -> u32 {
    if let (Some(start), Some(end)) = (parsed.start_date, parsed.end_date) {
        let days = (end - start).num_days() + 1;
        if days > 0 {
            let weeks = ((days + 6) / 7) as u32;
            return weeks.clamp(1, MAX_WEEKS);
        }
    }
    match parsed.session {
        Some('A') | Some('B') => SHORT_SESSION_WEEKS,
        _ => DEFAULT_WEEKS,
    }
}

struct Theme {
    assignment: &'static str,
    points: u32,
    topics: &'static [&'static str],
    final_item: &'static str,
}

fn theme(course_type: CourseType) -> Theme {
    match course_type {
        CourseType::Project =>
            Theme {
                assignment: "Project Milestone",
                points: 50,
                topics: &[
                    "Project Proposal",
                    "Needs Analysis",
                    "Design Document",
                    "Prototype",
                    "Implementation",
                    "Evaluation Plan",
                    "Revision",
                ],
                final_item: "Final Project Report and Presentation",
            },
        CourseType::Technical =>
            Theme {
                assignment: "Lab",
                points: 25,
                topics: &[
                    "Foundations",
                    "Core Concepts",
                    "Tools and Workflow",
                    "Data and Structures",
                    "Design Patterns",
                    "Testing and Debugging",
                    "Applied Problems",
                ],
                final_item: "Final Project",
            },
        CourseType::Science =>
            Theme {
                assignment: "Lab Report",
                points: 30,
                topics: &[
                    "Scientific Method",
                    "Core Principles",
                    "Systems and Processes",
                    "Measurement and Data",
                    "Experimental Design",
                    "Applications",
                ],
                final_item: "Final Exam",
            },
        CourseType::Business =>
            Theme {
                assignment: "Case Study",
                points: 40,
                topics: &[
                    "Foundations",
                    "Markets and Strategy",
                    "Operations",
                    "Financial Perspectives",
                    "Leadership",
                    "Ethics and Responsibility",
                ],
                final_item: "Final Business Plan",
            },
        CourseType::Humanities =>
            Theme {
                assignment: "Response Paper",
                points: 40,
                topics: &[
                    "Context and Sources",
                    "Key Texts",
                    "Movements and Ideas",
                    "Critical Perspectives",
                    "Interpretation",
                    "Legacy",
                ],
                final_item: "Final Paper",
            },
        CourseType::General =>
            Theme {
                assignment: "Activity",
                points: 20,
                topics: &["Foundations", "Key Concepts", "Practice", "Application", "Reflection"],
                final_item: "Final Reflection",
            },
    }
}

fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

fn due_after(start: Option<NaiveDate>, week: u32) -> Option<NaiveDate> {
    start.map(|s| s + Duration::days(i64::from(week) * 7 - 1))
}

fn key_points(description: Option<&str>) -> Vec<String> {
    description
        .map(|d| {
            d.split_terminator(['.', ';'])
                .map(str::trim)
                .filter(|s| s.split_whitespace().count() >= 3)
                .take(3)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn reading(title: String, content: String, key_points: Vec<String>) -> Item {
    Item {
        id: new_id("r"),
        title,
        details: ItemDetails::Reading { content, key_points, videos: Vec::new() },
    }
}

fn assignment(title: String, description: String, points: u32, due_date: Option<NaiveDate>) -> Item {
    Item {
        id: new_id("a"),
        title,
        details: ItemDetails::Assignment { description, points, due_date },
    }
}

fn quiz(title: String, topic: &str, due_date: Option<NaiveDate>) -> Item {
    Item {
        id: new_id("q"),
        title,
        details: ItemDetails::Quiz {
            questions: vec![QuizQuestion {
                question: format!("Summarize the central idea of {} in your own words.", topic.to_lowercase()),
                options: Vec::new(),
                answer_index: None,
            }],
            time_limit_minutes: Some(20),
            due_date,
        },
    }
}

/// Builds a fixed-shape course: orientation, one module per week block, wrap-up.
pub fn generate_skeleton(parsed: &ParsedCourse, course_type: CourseType, weeks: u32) -> Course {
    let weeks = weeks.max(1);
    let theme = theme(course_type);
    let title = parsed.title.clone().unwrap_or_else(|| "Untitled Course".to_string());
    let start = parsed.start_date;
    let mut modules = Vec::new();

    modules.push(Module {
        id: new_id("m"),
        name: "Getting Started".to_string(),
        items: vec![
            reading(
                "Course Overview and Syllabus".to_string(),
                parsed.description
                    .clone()
                    .unwrap_or_else(|| format!("Welcome to {}. Review the syllabus and schedule.", title)),
                key_points(parsed.description.as_deref())
            ),
            assignment(
                "Introduce Yourself".to_string(),
                "Share your background and what you hope to learn in this course.".to_string(),
                5,
                due_after(start, 1)
            )
        ],
    });

    // The last week is reserved for the wrap-up module.
    let content_weeks = weeks.saturating_sub(1).max(1);
    let block = if content_weeks > 8 { 2 } else { 1 };
    let mut week = 1;
    let mut n = 1;
    while week <= content_weeks {
        let last = (week + block - 1).min(content_weeks);
        let topic = theme.topics[(n - 1) % theme.topics.len()];
        let label = if last == week {
            format!("Week {}: {}", week, topic)
        } else {
            format!("Weeks {}-{}: {}", week, last, topic)
        };
        let due = due_after(start, last);

        let mut items = Vec::new();
        items.push(
            reading(
                format!("{} Reading", topic),
                format!("Readings and notes on {} for {}.", topic.to_lowercase(), title),
                Vec::new()
            )
        );
        let assignment_title = match course_type {
            CourseType::Project => format!("{}: {}", theme.assignment, topic),
            _ => format!("{} {}", theme.assignment, n),
        };
        items.push(
            assignment(
                assignment_title,
                format!("Apply this module's work on {}.", topic.to_lowercase()),
                theme.points,
                due
            )
        );
        match course_type {
            CourseType::Technical | CourseType::Science => {
                items.push(quiz(format!("{} Quiz", topic), topic, due));
            }
            CourseType::Humanities => {
                items.push(
                    reading(
                        format!("Primary Source: {}", topic),
                        format!("Selected primary sources on {}.", topic.to_lowercase()),
                        Vec::new()
                    )
                );
            }
            _ => {}
        }

        modules.push(Module { id: new_id("m"), name: label, items });
        week = last + 1;
        n += 1;
    }

    let final_due = parsed.end_date.or_else(|| due_after(start, weeks));
    let final_item = if course_type == CourseType::Science {
        quiz(theme.final_item.to_string(), &title, final_due)
    } else {
        assignment(
            theme.final_item.to_string(),
            format!("Bring together what you have learned in {}.", title),
            theme.points * 2,
            final_due
        )
    };
    modules.push(Module {
        id: new_id("m"),
        name: "Wrap-Up".to_string(),
        items: vec![final_item],
    });

    Course {
        id: Uuid::new_v4().to_string(),
        name: title,
        code: parsed.code.clone().unwrap_or_else(|| "TBD".to_string()),
        instructor: if parsed.instructors.is_empty() {
            "TBA".to_string()
        } else {
            parsed.instructors.join(", ")
        },
        term: parsed.term_label().unwrap_or_else(|| "TBD".to_string()),
        description: parsed.description.clone(),
        modules,
    }
}
