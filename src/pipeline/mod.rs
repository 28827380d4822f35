pub mod combine;
pub mod reconcile;
pub mod run;
pub mod summary;

pub use run::{FeedSet, Pipeline, RunSettings};
