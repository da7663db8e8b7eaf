pub mod latch;
pub mod scope;
pub mod timer;

pub use latch::{GateState, TransitionGate};
pub use scope::ScreenScope;
pub use timer::ScopedTimer;
