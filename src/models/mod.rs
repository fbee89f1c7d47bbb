pub mod post;

pub use post::{
    is_valid_slug, next_like_count, ApplyLikeRequest, LikeOutcome, Post, PostStats,
    RecordViewRequest, ViewOutcome, MAX_SLUG_LEN,
};
