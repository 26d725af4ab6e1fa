use std::time::Duration;

/// Failure at the text/image provider seam.
///
/// None of these reach the end user directly: the completion path swaps
/// them for a sentinel sentence, the illustration path for "no image".
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} not set")]
    MissingCredential(&'static str),

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} request failed ({code}): {body}")]
    Status {
        provider: &'static str,
        code: u16,
        body: String,
    },

    #[error("{provider} returned an unreadable payload: {detail}")]
    Decode {
        provider: &'static str,
        detail: String,
    },

    #[error("{provider} returned no candidates")]
    EmptyResponse { provider: &'static str },

    #[error("{provider} model is loading (estimated {estimated:?})")]
    ModelLoading {
        provider: &'static str,
        estimated: Duration,
    },
}

impl ProviderError {
    pub fn is_model_loading(&self) -> bool {
        matches!(self, ProviderError::ModelLoading { .. })
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
