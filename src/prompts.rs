//! Prompts for VLM-based slide recreation.
//!
//! The prompt is configuration, not logic: callers override it through
//! [`crate::config::ConversionConfig::prompt`] and the constant here is used
//! only when no override is given. Whatever prompt is used, the extractor in
//! [`crate::pipeline::extract`] accepts the reply shapes models actually
//! produce, so a prompt change never requires a parser change.

/// Default prompt asking the model to recreate one slide as a standalone
/// HTML document, wrapped in a JSON object under the `output` key.
pub const DEFAULT_RECREATE_PROMPT: &str = r#"Create an HTML container section of 16:9 ratio that looks exactly like the image attached here. It should be a single HTML file using cdn.tailwindcss.com and google font cdn. Replace all moustache variables with dummy data. Output should be strictly json: "output":"your response"
"#;
