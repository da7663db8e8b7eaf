pub mod context;
pub mod controller;
pub mod screen;
pub mod screens;
pub mod session;

pub use context::{Capabilities, Journal, NavRequest, Navigator, ScreenBoard, ScreenContext};
pub use controller::{FlowController, FlowHandle};
pub use screen::{
    FlowSnapshot, PendingSubmission, QuestionState, ScanPhase, Screen, ScreenStatus,
    SubmissionState,
};
pub use screens::ScreenController;
pub use session::{Session, UserInput};
