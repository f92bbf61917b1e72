pub mod harris;
pub mod matcher;

pub use harris::CornerDetector;
pub use matcher::KeypointMatcher;
