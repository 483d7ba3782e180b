//! Domain types for diagnosis conversations

mod context;
mod field;
mod request;
mod signal;
mod turn;

pub use context::DiagnosisContext;
pub use field::FieldSeed;
pub use request::{ChatResponse, DiagnosisRequest, DiagnosisResponse, Prediction, crop_from_class};
pub use signal::PrimarySignal;
pub use turn::{Sender, Turn};
