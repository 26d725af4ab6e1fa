//! Scripted providers for exercising the pipeline without network access.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use crate::error::ProviderError;
use crate::illustrator::ImageModel;
use crate::text::TextModel;

/// Replays queued results, then answers `reply {n}` (1-based call count).
#[derive(Default)]
pub struct ScriptedText {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedText {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|rows| rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TextModel for ScriptedText {
    fn name(&self) -> &str {
        "scripted-text"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let call = {
            let mut prompts = self.prompts.lock().map_err(|_| ProviderError::Decode {
                provider: "scripted-text",
                detail: "prompt log poisoned".to_string(),
            })?;
            prompts.push(prompt.to_string());
            prompts.len()
        };
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| Ok(format!("reply {call}")))
    }
}

/// Replays queued results, then answers with a small PNG.
#[derive(Default)]
pub struct ScriptedImage {
    script: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedImage {
    pub fn new(script: Vec<Result<Vec<u8>, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|rows| rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ImageModel for ScriptedImage {
    fn name(&self) -> &str {
        "scripted-image"
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| Ok(tiny_png()))
    }
}

/// A 4x3 solid-colour PNG.
pub fn tiny_png() -> Vec<u8> {
    let mut image = RgbImage::new(4, 3);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([40, 90, 160]);
    }
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    buffer.into_inner()
}

/// Serves `app` on an ephemeral localhost port and returns its base URL.
#[cfg(test)]
pub async fn serve_stub(app: axum::Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}
