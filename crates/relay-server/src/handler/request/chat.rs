use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request payload for `POST /chat/stream`.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StreamChat {
    /// Prompt handed to the text producer.
    #[validate(length(min = 1, max = 32768))]
    pub prompt: String,
    /// Deliver the whole answer as paced `partial` events instead of
    /// streaming fragments as they are produced.
    #[serde(default)]
    pub chunked: bool,
}
