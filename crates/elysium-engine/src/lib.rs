//! Turn pipeline for the Elysium storyteller: scene text from a completion
//! model, a derived visual prompt, and an illustration from an image model.

pub mod config;
pub mod error;
pub mod illustration;
pub mod illustrator;
pub mod session;
pub mod text;
pub mod visual;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{load_dotenv, EngineConfig, ImageConfig, LoadingRetryPolicy, TextConfig};
pub use error::ProviderError;
pub use illustration::Illustration;
pub use illustrator::{HuggingFaceImageModel, IllustrationClient, ImageModel};
pub use session::{Scene, StoryEngine, StorySession};
pub use text::{CompletionClient, GeminiTextModel, TextModel, COMPLETION_SENTINEL};
pub use visual::VisualPromptDeriver;
