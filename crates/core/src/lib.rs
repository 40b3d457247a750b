pub mod generation;
pub mod mode;
pub mod policy;
pub mod transcription;

pub use mode::Mode;
