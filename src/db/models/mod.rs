pub mod submission;
pub mod visit;

pub use submission::{Submission, SubmissionKind, SubmissionStatus};
pub use visit::{Visit, VisitStatus};
