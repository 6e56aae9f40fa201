pub mod cleanup;

pub use cleanup::{ clean_text, CleanupResult, CleanupSource, Suggestion, TextCleaner };
