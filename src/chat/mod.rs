pub mod context;
pub mod intent;
pub mod similarity;

pub use context::{ describe_context, resolve_context };
pub use intent::{ is_direct_answer_request, is_greeting };
pub use similarity::{ find_similar_conversation, similarity, DEFAULT_THRESHOLD };
