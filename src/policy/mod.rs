//! Authorization policy for complaints and comments
//!
//! - [`visibility`] - per-record read/write decisions
//! - [`comment_filter`] - applies the comment rules across a list

pub mod comment_filter;
pub mod visibility;

pub use comment_filter::filter_visible_comments;
pub use visibility::{
    can_mutate_complaint_status, can_post_comment, can_view_comment, can_view_complaint,
};
