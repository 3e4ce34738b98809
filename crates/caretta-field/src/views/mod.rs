//! Read-side view models derived from fetched records.
//!
//! Nothing here talks to the backend; callers fetch and pass slices in.

pub mod dashboard;
pub mod nest_details;
pub mod records;
pub mod turtle_details;
