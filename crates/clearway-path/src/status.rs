//! Outcome of a channel search

use std::fmt;

/// Result of [`crate::PathQuery::find_path`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PathQueryState {
    /// Start is outside the domain or inside an obstacle's radius
    StartInvalid,
    /// Goal is outside the domain or inside an obstacle's radius
    GoalInvalid,
    /// Both endpoints are valid but no corridor admits the disc
    NoPath,
    /// A channel was found; gates and triangle ids are available
    PathFound,
}

impl PathQueryState {
    pub fn is_found(self) -> bool {
        self == PathQueryState::PathFound
    }
}

impl fmt::Display for PathQueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PathQueryState::StartInvalid => "start position is blocked",
            PathQueryState::GoalInvalid => "goal position is blocked",
            PathQueryState::NoPath => "no path",
            PathQueryState::PathFound => "path found",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert!(PathQueryState::PathFound.is_found());
        assert!(!PathQueryState::NoPath.is_found());
        assert_eq!(PathQueryState::GoalInvalid.to_string(), "goal position is blocked");
    }
}
