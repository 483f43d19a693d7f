//! Topic names threading a request through the stages.

/// Intake publishes question envelopes here.
pub const QUESTIONS: &str = "questions";

/// The retrieval stage republishes id + question + contexts here.
pub const GENERATION: &str = "generation";
