pub mod controller;
pub mod decoder;
pub mod deduper;
pub mod grammar;

pub use controller::{AcceptedReceiver, ScanController};
pub use decoder::{DecodeEvent, QrDecoder};
pub use deduper::{AcceptedCode, ScanDeduper};
pub use grammar::{CodeGrammar, CodePolicy};
