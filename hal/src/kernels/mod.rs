pub mod harris;
pub mod matching;
pub mod ransac;
