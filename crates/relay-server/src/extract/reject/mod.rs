//! Drop-in replacements for axum extractors whose rejections are converted
//! into the server's JSON error responses.

pub mod enhanced_json;
pub mod validated_json;

pub use self::enhanced_json::Json;
pub use self::validated_json::ValidateJson;
