pub mod alignment;
pub mod matching;

pub use alignment::{align, Alignment};
pub use matching::{MatchResult, MoleculeMatcher};
