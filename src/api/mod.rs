pub mod client;
pub mod error;

pub use client::{Backend, BackendClient, Question, RatingSubmission};
pub use error::ApiError;
