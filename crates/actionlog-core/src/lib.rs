pub mod entry;
pub mod similarity;
pub mod terms;

pub use entry::{LogEntry, Precedence, parse_logged_date, precedence};
pub use similarity::similarity;
pub use terms::{TermSet, TopicOverlap, Vocabulary, VocabularyError};
