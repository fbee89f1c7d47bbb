use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const MAX_SLUG_LEN: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub slug: String,
    pub views: i64,
    pub likes: i64,
    pub created_at: i64,
}

/// Result of a "record view" call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewOutcome {
    pub slug: String,
    pub views: i64,
    /// Whether this request created the view record
    pub counted: bool,
}

/// Result of an "apply like" call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeOutcome {
    pub slug: String,
    pub likes: i64,
    pub visitor_likes: i64,
    /// Delta actually applied after clamping
    pub applied: i64,
}

/// Counters for one post as seen by one visitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostStats {
    pub slug: String,
    pub views: i64,
    pub likes: i64,
    pub visitor_likes: i64,
    pub viewed: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecordViewRequest {
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplyLikeRequest {
    pub slug: String,
    pub delta: i64,
}

/// Per-visitor like count after applying `delta` under the `max` bound.
///
/// A like never lowers the count and an unlike never raises it, even when
/// `max` has been reduced below a count stored earlier.
pub fn next_like_count(current: i64, delta: i64, max: i64) -> i64 {
    if delta >= 0 {
        current.saturating_add(delta).min(max).max(current)
    } else {
        current.saturating_add(delta).max(0).min(current)
    }
}

/// Slugs are lowercase ASCII words joined by `-` or `_`
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_like_count_clamps() {
        assert_eq!(next_like_count(0, 1, 3), 1);
        assert_eq!(next_like_count(3, 1, 3), 3);
        assert_eq!(next_like_count(1, 1, 1), 1);
        assert_eq!(next_like_count(1, -1, 3), 0);
        assert_eq!(next_like_count(0, -1, 3), 0);
    }

    #[test]
    fn test_next_like_count_with_lowered_max() {
        // Count stored under an older, larger bound
        assert_eq!(next_like_count(5, 1, 3), 5);
        assert_eq!(next_like_count(5, -1, 3), 4);
    }

    #[test]
    fn test_valid_slugs() {
        assert!(is_valid_slug("hello-world"));
        assert!(is_valid_slug("post_2024"));
        assert!(is_valid_slug("a"));
        assert!(is_valid_slug(&"x".repeat(MAX_SLUG_LEN)));
    }

    #[test]
    fn test_invalid_slugs() {
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug("Hello-World"));
        assert!(!is_valid_slug("with space"));
        assert!(!is_valid_slug("../etc/passwd"));
        assert!(!is_valid_slug("héllo"));
        assert!(!is_valid_slug(&"x".repeat(MAX_SLUG_LEN + 1)));
    }
}
