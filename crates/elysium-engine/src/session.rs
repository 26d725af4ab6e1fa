use std::sync::Arc;

use elysium_contracts::events::{EventPayload, EventWriter};
use elysium_contracts::prompts::{continuation_prompt, opening_scene_prompt};
use elysium_contracts::story::{Choice, ContextWindow, EntryKind, Transcript};
use serde_json::{json, Value};

use crate::config::{EngineConfig, LoadingRetryPolicy};
use crate::illustration::Illustration;
use crate::illustrator::{HuggingFaceImageModel, IllustrationClient, ImageModel};
use crate::text::{CompletionClient, GeminiTextModel, TextModel, COMPLETION_SENTINEL};
use crate::visual::VisualPromptDeriver;

/// One generated narrative passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub text: String,
    /// True when `text` is the completion sentinel rather than model output.
    pub fallback: bool,
}

impl Scene {
    fn from_completion(text: String) -> Self {
        let fallback = text == COMPLETION_SENTINEL;
        Self { text, fallback }
    }
}

/// Shared, immutable wiring of the turn pipeline. Sessions borrow it via `Arc`.
pub struct StoryEngine {
    completion: CompletionClient,
    deriver: VisualPromptDeriver,
    illustrator: IllustrationClient,
    context: ContextWindow,
    events: Option<EventWriter>,
}

impl StoryEngine {
    pub fn new(
        text: Arc<dyn TextModel>,
        image: Option<Arc<dyn ImageModel>>,
        retry: LoadingRetryPolicy,
        context: ContextWindow,
    ) -> Self {
        let completion = CompletionClient::new(text);
        Self {
            deriver: VisualPromptDeriver::new(completion.clone()),
            completion,
            illustrator: IllustrationClient::new(image, retry),
            context,
            events: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(GeminiTextModel::new(config.text.clone())),
            HuggingFaceImageModel::configured(&config.image),
            config.retry,
            config.context,
        )
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn text_model(&self) -> &str {
        self.completion.model_name()
    }

    pub fn image_enabled(&self) -> bool {
        self.illustrator.enabled()
    }

    pub fn context(&self) -> ContextWindow {
        self.context
    }

    pub fn session(self: &Arc<Self>, session_id: impl Into<String>) -> StorySession {
        let session_id = session_id.into();
        let events = self
            .events
            .as_ref()
            .map(|writer| writer.scoped(session_id.clone()));
        StorySession {
            engine: Arc::clone(self),
            session_id,
            transcript: Transcript::new(),
            events,
        }
    }
}

/// Per-user story state. Single writer; every step runs to completion before
/// the next one starts.
pub struct StorySession {
    engine: Arc<StoryEngine>,
    session_id: String,
    transcript: Transcript,
    events: Option<EventWriter>,
}

impl StorySession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Records the premise and generates the opening scene.
    pub async fn begin(&mut self, premise: &str) -> Scene {
        self.transcript.record_premise(premise);
        self.emit(
            "session_started",
            json!({
                "premise": premise,
                "text_model": self.engine.text_model(),
                "image_enabled": self.engine.image_enabled(),
            }),
        );
        let prompt = opening_scene_prompt(premise);
        self.narrate(&prompt).await
    }

    /// Records `choice` and continues the story from the context window.
    pub async fn advance(&mut self, choice: Choice) -> Scene {
        self.transcript.record_choice(choice);
        self.emit(
            "choice_recorded",
            json!({ "choice": choice.as_str(), "turn": self.turns() }),
        );
        let prompt = continuation_prompt(&self.transcript.window(&self.engine.context));
        self.narrate(&prompt).await
    }

    /// Derives a visual prompt for `scene` and requests its illustration.
    pub async fn illustrate(&self, scene: &Scene) -> Option<Illustration> {
        let visual_prompt = self.engine.deriver.derive(&scene.text).await;
        tracing::info!(session = %self.session_id, visual_prompt = %visual_prompt, "derived visual prompt");
        self.emit(
            "visual_prompt_derived",
            json!({ "visual_prompt": visual_prompt }),
        );

        let illustration = self.engine.illustrator.illustrate(&visual_prompt).await;
        match illustration.as_ref() {
            Some(found) => self.emit(
                "illustration_ready",
                json!({
                    "width": found.width(),
                    "height": found.height(),
                    "bytes": found.png().len(),
                }),
            ),
            None => self.emit(
                "illustration_skipped",
                json!({ "image_enabled": self.engine.image_enabled() }),
            ),
        }
        illustration
    }

    /// Number of choices made so far.
    pub fn turns(&self) -> usize {
        self.transcript
            .entries()
            .iter()
            .filter(|entry| entry.kind == EntryKind::Choice)
            .count()
    }

    pub fn finish(&self, reason: &str) {
        self.emit(
            "session_finished",
            json!({
                "reason": reason,
                "turns": self.turns(),
                "transcript_entries": self.transcript.len(),
            }),
        );
    }

    async fn narrate(&mut self, prompt: &str) -> Scene {
        let scene = Scene::from_completion(self.engine.completion.complete(prompt).await);
        self.transcript.record_scene(&scene.text);
        self.emit(
            "scene_generated",
            json!({
                "turn": self.turns(),
                "fallback": scene.fallback,
                "chars": scene.text.chars().count(),
            }),
        );
        scene
    }

    /// Appends inline on the current worker so events land in turn order.
    /// Each write is one short line under the shared sink lock.
    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = events.emit(event_type, payload) {
            tracing::warn!(session = %self.session_id, event_type, error = %err, "event write failed");
        }
    }
}
