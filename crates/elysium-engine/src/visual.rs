use elysium_contracts::prompts::{clean_visual_prompt, visual_prompt_instruction};

use crate::text::CompletionClient;

/// Compresses a scene into a short image prompt via the completion model.
#[derive(Clone)]
pub struct VisualPromptDeriver {
    completion: CompletionClient,
}

impl VisualPromptDeriver {
    pub fn new(completion: CompletionClient) -> Self {
        Self { completion }
    }

    pub async fn derive(&self, scene: &str) -> String {
        let raw = self
            .completion
            .complete(&visual_prompt_instruction(scene))
            .await;
        clean_visual_prompt(&raw)
    }
}
