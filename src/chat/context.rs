use log::debug;

use crate::catalog::CourseCatalog;
use crate::models::chat::{ ChatContext, ContextKind, Message };
use crate::models::course::ItemDetails;

const DASHBOARD_KEY: &str = "dashboard";

/// Maps a chat-session id (a context key such as `course-101`) to its context.
///
/// Stored history wins over the catalog so a conversation keeps the title it was
/// opened with. Returns `None` for ids that name nothing the catalog knows.
pub fn resolve_context(
    chat_id: &str,
    history: &[Message],
    catalog: &dyn CourseCatalog
) -> Option<ChatContext> {
    let chat_id = chat_id.trim();
    if chat_id.is_empty() {
        return None;
    }

    if
        let Some(ctx) = history
            .iter()
            .filter_map(|m| m.context.as_ref())
            .find(|ctx| ctx.key() == chat_id)
    {
        debug!("Context for '{}' found in stored history", chat_id);
        return Some(ctx.clone());
    }

    if chat_id == DASHBOARD_KEY {
        return Some(ChatContext::dashboard());
    }

    let (kind, id) = chat_id.split_once('-')?;
    let kind: ContextKind = kind.parse().ok()?;
    if id.is_empty() {
        return None;
    }

    match kind {
        ContextKind::Dashboard => {
            if id == DASHBOARD_KEY { Some(ChatContext::dashboard()) } else { None }
        }
        ContextKind::Course => {
            let course = catalog.course(id)?;
            Some(ChatContext {
                kind,
                id: Some(course.id.clone()),
                course_id: Some(course.id),
                title: Some(course.name),
            })
        }
        ContextKind::Assignment => {
            let loc = catalog.find_item(id)?;
            Some(ChatContext {
                kind,
                id: Some(loc.item.id),
                course_id: Some(loc.course.id),
                title: Some(loc.item.title),
            })
        }
        ContextKind::Module => {
            let (course, module) = catalog.find_module(id)?;
            Some(ChatContext {
                kind,
                id: Some(module.id),
                course_id: Some(course.id),
                title: Some(module.name),
            })
        }
    }
}

/// One-paragraph description of the material behind a context, for prompts.
pub fn describe_context(context: &ChatContext, catalog: &dyn CourseCatalog) -> String {
    match context.kind {
        ContextKind::Dashboard => {
            let courses = catalog.courses();
            let listing = courses
                .iter()
                .map(|c| format!("{} {} ({})", c.code, c.name, c.term))
                .collect::<Vec<_>>()
                .join("; ");
            format!("The student is on their dashboard. Enrolled courses: {}.", listing)
        }
        ContextKind::Course => {
            let Some(course) = context.id.as_deref().and_then(|id| catalog.course(id)) else {
                return format!("Course: {}", context.title.as_deref().unwrap_or("unknown"));
            };
            let modules = course.modules
                .iter()
                .map(|m| {
                    let items = m.items
                        .iter()
                        .map(|i| format!("{} ({})", i.title, i.details.kind()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("- {}: {}", m.name, items)
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Course: {} {} taught by {} ({}).\n{}\nModules:\n{}",
                course.code,
                course.name,
                course.instructor,
                course.term,
                course.description.as_deref().unwrap_or(""),
                modules
            )
        }
        ContextKind::Assignment => {
            let Some(loc) = context.id.as_deref().and_then(|id| catalog.find_item(id)) else {
                return format!("Assignment: {}", context.title.as_deref().unwrap_or("unknown"));
            };
            let detail = match &loc.item.details {
                ItemDetails::Assignment { description, points, due_date } =>
                    format!(
                        "Instructions: {}\nPoints: {}{}",
                        description,
                        points,
                        due_date.map(|d| format!("\nDue: {}", d)).unwrap_or_default()
                    ),
                ItemDetails::Quiz { questions, .. } =>
                    format!(
                        "Quiz with {} questions:\n{}",
                        questions.len(),
                        questions
                            .iter()
                            .map(|q| format!("- {}", q.question))
                            .collect::<Vec<_>>()
                            .join("\n")
                    ),
                ItemDetails::Reading { content, key_points, .. } =>
                    format!("Reading: {}\nKey points: {}", content, key_points.join("; ")),
            };
            format!(
                "{} \"{}\" in {} {} (module \"{}\").\n{}",
                loc.item.details.kind(),
                loc.item.title,
                loc.course.code,
                loc.course.name,
                loc.module.name,
                detail
            )
        }
        ContextKind::Module => {
            let Some((course, module)) = context.id
                .as_deref()
                .and_then(|id| catalog.find_module(id)) else {
                return format!("Module: {}", context.title.as_deref().unwrap_or("unknown"));
            };
            let items = module.items
                .iter()
                .map(|i| format!("- {} ({})", i.title, i.details.kind()))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Module \"{}\" of {} {}.\nItems:\n{}", module.name, course.code, course.name, items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalog;
    use crate::models::chat::Role;

    #[test]
    fn test_resolves_from_history_first() {
        let catalog = MockCatalog::seeded().unwrap();
        let stored = ChatContext {
            kind: ContextKind::Course,
            id: Some("101".into()),
            course_id: Some("101".into()),
            title: Some("Renamed in an earlier session".into()),
        };
        let history = vec![Message::new(Role::User, "hi", Some(stored.clone()))];
        assert_eq!(resolve_context("course-101", &history, &catalog), Some(stored));
    }

    #[test]
    fn test_resolves_from_catalog() {
        let catalog = MockCatalog::seeded().unwrap();

        let course = resolve_context("course-202", &[], &catalog).unwrap();
        assert_eq!(course.title.as_deref(), Some("World History: The Modern Era"));

        let assignment = resolve_context("assignment-a101-1", &[], &catalog).unwrap();
        assert_eq!(assignment.kind, ContextKind::Assignment);
        assert_eq!(assignment.course_id.as_deref(), Some("101"));
        assert_eq!(assignment.key(), "assignment-a101-1");

        let module = resolve_context("module-m303-1", &[], &catalog).unwrap();
        assert_eq!(module.title.as_deref(), Some("Cells"));

        assert_eq!(resolve_context("dashboard", &[], &catalog), Some(ChatContext::dashboard()));
        assert_eq!(
            resolve_context("dashboard-dashboard", &[], &catalog),
            Some(ChatContext::dashboard())
        );
    }

    #[test]
    fn test_unknown_ids_resolve_to_none() {
        let catalog = MockCatalog::seeded().unwrap();
        assert!(resolve_context("course-999", &[], &catalog).is_none());
        assert!(resolve_context("syllabus-1", &[], &catalog).is_none());
        assert!(resolve_context("course-", &[], &catalog).is_none());
        assert!(resolve_context("", &[], &catalog).is_none());
    }

    #[test]
    fn test_describe_assignment_mentions_instructions() {
        let catalog = MockCatalog::seeded().unwrap();
        let ctx = resolve_context("assignment-a202-1", &[], &catalog).unwrap();
        let text = describe_context(&ctx, &catalog);
        assert!(text.contains("Primary Source Analysis Essay"));
        assert!(text.contains("Points: 100"));
    }
}
