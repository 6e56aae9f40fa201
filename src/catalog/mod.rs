//! In-process stand-in for the LMS backend.

use log::info;
use std::sync::{ PoisonError, RwLock };

use crate::models::course::{ Course, Item, Module };

const SEED_COURSES: &str = include_str!("../../json/mock_courses.json");
const NAME_MATCH_THRESHOLD: f64 = 0.85;

/// An item together with the module and course that hold it.
#[derive(Clone, Debug)]
pub struct ItemLocation {
    pub course: Course,
    pub module: Module,
    pub item: Item,
}

pub trait CourseCatalog: Send + Sync {
    fn courses(&self) -> Vec<Course>;

    fn course(&self, id: &str) -> Option<Course> {
        self.courses()
            .into_iter()
            .find(|c| c.id == id)
    }

    fn find_item(&self, item_id: &str) -> Option<ItemLocation> {
        self.courses()
            .into_iter()
            .find_map(|course| {
                let (module, item) = course.item(item_id).map(|(m, i)| (m.clone(), i.clone()))?;
                Some(ItemLocation { course, module, item })
            })
    }

    fn find_module(&self, module_id: &str) -> Option<(Course, Module)> {
        self.courses()
            .into_iter()
            .find_map(|course| {
                let module = course.modules
                    .iter()
                    .find(|m| m.id == module_id)
                    .cloned()?;
                Some((course, module))
            })
    }

    fn add_course(&self, course: Course);
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Looks a course up by code or name, tolerating small typos.
pub fn find_course_by_name(catalog: &dyn CourseCatalog, name: &str) -> Option<Course> {
    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    let courses = catalog.courses();

    if
        let Some(exact) = courses
            .iter()
            .find(|c| normalize(&c.name) == wanted || normalize(&c.code) == wanted)
    {
        return Some(exact.clone());
    }

    let mut best: Option<&Course> = None;
    let mut best_score = 0.0;
    for course in &courses {
        let score = strsim::jaro_winkler(&wanted, &normalize(&course.name));
        if score > best_score {
            best_score = score;
            best = Some(course);
        }
    }
    if best_score >= NAME_MATCH_THRESHOLD {
        return best.cloned();
    }
    None
}

pub struct MockCatalog {
    courses: RwLock<Vec<Course>>,
}

impl MockCatalog {
    pub fn new(courses: Vec<Course>) -> Self {
        Self { courses: RwLock::new(courses) }
    }

    pub fn seeded() -> Result<Self, serde_json::Error> {
        let courses: Vec<Course> = serde_json::from_str(SEED_COURSES)?;
        info!("Mock catalog seeded with {} courses", courses.len());
        Ok(Self::new(courses))
    }
}

impl CourseCatalog for MockCatalog {
    fn courses(&self) -> Vec<Course> {
        self.courses.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn add_course(&self, course: Course) {
        let mut guard = self.courses.write().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|c| c.id != course.id);
        guard.push(course);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_parses_and_resolves_items() {
        let catalog = MockCatalog::seeded().unwrap();
        assert_eq!(catalog.courses().len(), 3);

        let loc = catalog.find_item("a202-1").unwrap();
        assert_eq!(loc.course.id, "202");
        assert_eq!(loc.module.id, "m202-1");
        assert_eq!(loc.item.title, "Primary Source Analysis Essay");

        let (course, module) = catalog.find_module("m101-2").unwrap();
        assert_eq!(course.code, "CSE 110");
        assert_eq!(module.items.len(), 2);
    }

    #[test]
    fn test_find_course_by_name_fuzzy() {
        let catalog = MockCatalog::seeded().unwrap();
        assert_eq!(find_course_by_name(&catalog, "cse110").unwrap().id, "101");
        assert_eq!(find_course_by_name(&catalog, "General Biolgy I").unwrap().id, "303");
        assert!(find_course_by_name(&catalog, "Quantum Field Theory").is_none());
    }

    #[test]
    fn test_add_course_replaces_same_id() {
        let catalog = MockCatalog::new(Vec::new());
        let mut course = Course {
            id: "x".into(),
            name: "Draft".into(),
            code: "TST 100".into(),
            instructor: "TBA".into(),
            term: "2026 Spring".into(),
            description: None,
            modules: Vec::new(),
        };
        catalog.add_course(course.clone());
        course.name = "Final".into();
        catalog.add_course(course);
        let courses = catalog.courses();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].name, "Final");
    }
}
