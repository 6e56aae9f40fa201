pub mod classify;
pub mod generator;
pub mod parser;
pub mod template;

pub use classify::{ classify, CourseType };
pub use generator::{ CourseGenerator, GeneratedCourse, GenerationSource };
pub use parser::{ parse_course_text, ParsedCourse };
pub use template::{ generate_skeleton, term_weeks };
