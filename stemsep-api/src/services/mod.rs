//! Service modules for the separation workflow
//!
//! Leaf to root: engine invocation, output resolution, session allocation,
//! and the job runner tying them together.

pub mod engine;
pub mod output_resolver;
pub mod separation;
pub mod session_manager;

pub use engine::{
    EngineRequest, ExitResult, NativeEngine, ProcessEngine, SeparatedStem, SeparationEngine,
    StemSeparator, ENCODER_ENV,
};
pub use output_resolver::OutputResolver;
pub use separation::SeparationService;
pub use session_manager::{sanitize_filename, validate_model, InputGuard, SessionManager};
