//! Generation client, bundled example fetching and the session controller that
//! ties them to the creation store.

mod examples;
mod generation;
mod session;

pub use examples::HttpExampleSource;
pub use generation::{
    generation_system_instruction, resolve_prompt, strip_code_fence, FileInput,
    GeminiGenerationClient, GenerationConfig, GenerationError, GenerationService,
    DEFAULT_DEMO_PROMPT, FILE_ANALYSIS_DIRECTIVE, REVISION_SYSTEM_INSTRUCTION,
};
pub use session::{
    classify_generation_failure, GenerationJob, PendingGeneration, SessionController,
    SessionEvent, SessionState,
};
