pub mod events;
pub mod prompts;
pub mod protocol;
pub mod story;
