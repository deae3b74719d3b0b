//! Rendering decoded payloads as text.
//!
//! A payload with a known message type is rendered as protobuf JSON. Without a type the payload
//! is parsed as an [`UnknownFieldSet`] and rendered in the protobuf text format.

use snafu::Snafu;
use tracing::trace;

use crate::context::{Context, MessageRef};
use crate::json::message_to_json;
use crate::unknown::UnknownFieldSet;

/// Error rendering a payload.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RenderError
{
    /// The payload is not valid protobuf wire data for the message.
    #[snafu(display("malformed wire data: {}", reason))]
    MalformedWireData
    {
        /// What could not be read.
        reason: String,
    },

    /// An `Any` refers to a type that is not part of the context.
    #[snafu(display("cannot resolve type '{}' of Any", type_url))]
    UnresolvableAny
    {
        /// The type URL stored in the `Any`.
        type_url: String,
    },

    /// A well known type holds a value that has no JSON representation.
    #[snafu(display("invalid {} value: {}", type_name, reason))]
    InvalidWellKnownType
    {
        /// Full name of the type.
        type_name: String,

        /// Why the value is invalid.
        reason: String,
    },
}

/// Format of a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat
{
    /// Protobuf JSON mapping.
    Json,

    /// Protobuf text format of unknown fields.
    Text,
}

impl MessageFormat
{
    /// Name of the format as exposed to callers.
    pub fn as_str(self) -> &'static str
    {
        match self {
            MessageFormat::Json => "json",
            MessageFormat::Text => "text",
        }
    }
}

impl std::fmt::Display for MessageFormat
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// A message type within the context that owns it.
#[derive(Debug, Clone, Copy)]
pub struct MessageSchema<'a>
{
    /// Context holding the message and every type it refers to.
    pub context: &'a Context,

    /// The message type.
    pub message: MessageRef,
}

/// Rendered payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered
{
    /// The rendered text.
    pub text: String,

    /// Format of `text`.
    pub format: MessageFormat,
}

/// Renders a payload.
///
/// With a schema the result is pretty printed JSON, an empty payload rendering as `{}`. Without
/// one the result is the text format of the unknown fields, an empty payload rendering as an
/// empty string.
pub fn render(payload: &[u8], schema: Option<MessageSchema>) -> Result<Rendered, RenderError>
{
    match schema {
        Some(schema) => render_json(payload, schema),
        None => render_text(payload),
    }
}

fn render_json(payload: &[u8], schema: MessageSchema) -> Result<Rendered, RenderError>
{
    let info = schema.context.resolve_message(schema.message);
    trace!(message = %info.full_name, len = payload.len(), "Rendering payload as JSON");

    if payload.is_empty() {
        return Ok(Rendered {
            text: "{}".to_string(),
            format: MessageFormat::Json,
        });
    }

    let msg = info.decode(payload, schema.context);
    if let Some(reason) = msg.find_defect(schema.context) {
        return Err(RenderError::MalformedWireData { reason });
    }

    let json = message_to_json(&msg, schema.context)?;
    let text = serde_json::to_string_pretty(&json).map_err(|e| RenderError::MalformedWireData {
        reason: e.to_string(),
    })?;

    Ok(Rendered {
        text,
        format: MessageFormat::Json,
    })
}

fn render_text(payload: &[u8]) -> Result<Rendered, RenderError>
{
    trace!(len = payload.len(), "Rendering payload as text format");

    let set = UnknownFieldSet::parse(payload).map_err(|e| RenderError::MalformedWireData {
        reason: e.to_string(),
    })?;

    Ok(Rendered {
        text: set.to_text(),
        format: MessageFormat::Text,
    })
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn empty_payload_without_schema()
    {
        let rendered = render(b"", None).unwrap();
        assert_eq!(rendered.text, "");
        assert_eq!(rendered.format, MessageFormat::Text);
    }

    #[test]
    fn malformed_payload_without_schema()
    {
        match render(b"\x0a\x05ab", None) {
            Err(RenderError::MalformedWireData { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn format_names()
    {
        assert_eq!(MessageFormat::Json.as_str(), "json");
        assert_eq!(MessageFormat::Text.to_string(), "text");
    }
}
