//! Decoding gRPC-Web messages for a proxy callout.
//!
//! [`decode_message`] runs the whole pipeline for one message: resolve the method, strip the
//! frame and render the payload. Failures never escape it. When the method cannot be resolved
//! the payload is still rendered without a schema, and when the payload cannot be decoded the
//! outcome simply has no output. Both cases are reported through [`Diagnostics`].
//!
//! [`Callout`] adapts the pipeline to a host that exposes flow variables and message bodies.

use bytes::Bytes;
use snafu::{ResultExt, Snafu};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::config::{CalloutConfig, Properties, Variables, VariablesMut};
use crate::frame::{decode_frame, FrameError};
use crate::render::{render, MessageFormat, MessageSchema, RenderError, Rendered};
use crate::resolve::{resolve_method, resolve_method_base64, ResolveError, ResolvedMethod};

pub use crate::resolve::MessageTarget;

/// Prefix of the variables published by the callout.
pub const VAR_PREFIX: &str = "pb-decoder";

/// Receives the format of the decoded message.
pub const VAR_MESSAGE_FORMAT: &str = "pb-decoder.message-format";

/// Receives the decoded message.
pub const VAR_MESSAGE_DATA: &str = "pb-decoder.message-data";

/// Receives the informational diagnostics.
pub const VAR_INFO_STDOUT: &str = "pb-decoder.info.stdout";

/// Receives the error diagnostics.
pub const VAR_INFO_STDERR: &str = "pb-decoder.info.stderr";

/// Error decoding a message body.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError
{
    /// The frame could not be stripped.
    #[snafu(display("{}", source))]
    Frame
    {
        source: FrameError
    },

    /// The payload could not be rendered.
    #[snafu(display("{}", source))]
    Render
    {
        source: RenderError
    },
}

/// How the descriptor set is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorEncoding
{
    /// Serialized `FileDescriptorSet`.
    Binary,

    /// Base64 text of a serialized `FileDescriptorSet`.
    Base64,
}

/// Everything needed to decode one message.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a>
{
    /// Serialized descriptor set.
    pub descriptor_set: Option<&'a [u8]>,

    /// Encoding of `descriptor_set`.
    pub descriptor_encoding: DescriptorEncoding,

    /// Request path, such as `/package.Service/Method`.
    pub request_path: Option<&'a str>,

    /// Whether the body holds the method input or output.
    pub target: MessageTarget,

    /// The gRPC-Web body.
    pub body: &'a [u8],

    /// Whether the body is base64 encoded.
    pub body_is_base64: bool,
}

impl<'a> DecodeRequest<'a>
{
    /// A request for decoding a body without any schema information.
    pub fn new(body: &'a [u8]) -> Self
    {
        DecodeRequest {
            descriptor_set: None,
            descriptor_encoding: DescriptorEncoding::Base64,
            request_path: None,
            target: MessageTarget::Request,
            body,
            body_is_base64: false,
        }
    }
}

/// Diagnostic lines, kept apart from the decoded output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics
{
    /// Informational lines.
    pub info: Vec<String>,

    /// Error lines.
    pub error: Vec<String>,
}

impl Diagnostics
{
    /// Info lines, each terminated by a newline.
    pub fn stdout(&self) -> String
    {
        join_lines(&self.info)
    }

    /// Error lines, each terminated by a newline.
    pub fn stderr(&self) -> String
    {
        join_lines(&self.error)
    }
}

fn join_lines(lines: &[String]) -> String
{
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

/// Result of decoding one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOutcome
{
    /// Format of `decoded`. Only set when the message was decoded.
    pub format: Option<MessageFormat>,

    /// The decoded message.
    pub decoded: Option<String>,

    /// What went wrong along the way.
    pub diagnostics: Diagnostics,
}

/// Decodes a gRPC-Web message body.
pub fn decode_message(request: &DecodeRequest) -> DecodeOutcome
{
    let mut outcome = DecodeOutcome::default();

    let method = match resolve(request) {
        Ok(method) => Some(method),
        Err(e) => {
            info!(error = %e, "Method not resolved; decoding without a schema");
            outcome
                .diagnostics
                .info
                .push(format!("could not find protobuf service/method. {}", e));
            None
        }
    };

    let schema = method.as_ref().map(|m| m.schema(request.target));
    match decode_body(request.body, request.body_is_base64, schema) {
        Ok(rendered) => {
            debug!(format = %rendered.format, len = rendered.text.len(), "Decoded message");
            outcome.format = Some(rendered.format);
            outcome.decoded = Some(rendered.text);
        }
        Err(e) => {
            warn!(error = %e, "Message not decoded");
            outcome
                .diagnostics
                .error
                .push(format!("could not decode protobuf. {}", e));
        }
    }

    outcome
}

fn resolve(request: &DecodeRequest) -> Result<ResolvedMethod, ResolveError>
{
    let descriptor_set = request.descriptor_set.unwrap_or_default();
    let request_path = request.request_path.unwrap_or_default();
    match request.descriptor_encoding {
        DescriptorEncoding::Binary => resolve_method(descriptor_set, request_path),
        DescriptorEncoding::Base64 => {
            let text = std::str::from_utf8(descriptor_set).map_err(|e| {
                ResolveError::MalformedDescriptor {
                    reason: e.to_string(),
                }
            })?;
            resolve_method_base64(text, request_path)
        }
    }
}

/// Strips the frame from a body and renders its payload.
pub fn decode_body(
    body: &[u8],
    is_base64: bool,
    schema: Option<MessageSchema>,
) -> Result<Rendered, DecodeError>
{
    let payload = decode_frame(body, is_base64).context(Frame {})?;
    render(&payload, schema).context(Render {})
}

/// Host message context: flow variables plus the message bodies.
pub trait MessageContext: VariablesMut
{
    /// Content of the request or response body.
    fn content(&self, target: MessageTarget) -> Bytes;
}

/// Result of running the callout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult
{
    /// The flow continues.
    Success,

    /// The flow is stopped.
    Abort,
}

/// In-memory message context.
#[derive(Debug, Clone, Default)]
pub struct SimpleMessageContext
{
    /// Flow variables.
    pub variables: BTreeMap<String, String>,

    /// Request body.
    pub request: Bytes,

    /// Response body.
    pub response: Bytes,
}

impl Variables for SimpleMessageContext
{
    fn get_variable(&self, name: &str) -> Option<String>
    {
        self.variables.get_variable(name)
    }
}

impl VariablesMut for SimpleMessageContext
{
    fn set_variable(&mut self, name: &str, value: String)
    {
        self.variables.set_variable(name, value)
    }
}

impl MessageContext for SimpleMessageContext
{
    fn content(&self, target: MessageTarget) -> Bytes
    {
        match target {
            MessageTarget::Request => self.request.clone(),
            MessageTarget::Response => self.response.clone(),
        }
    }
}

/// Callout decoding the request or response message of a flow.
#[derive(Debug, Clone, Default)]
pub struct Callout
{
    properties: Properties,
}

impl Callout
{
    /// Callout with the given properties.
    pub fn new(properties: Properties) -> Self
    {
        Callout { properties }
    }

    /// Decodes the configured message and publishes the result as flow variables.
    ///
    /// Only invalid configuration aborts the callout. Decoding problems are reported through
    /// the diagnostics variables.
    pub fn execute<C: MessageContext + ?Sized>(&self, ctx: &mut C) -> ExecutionResult
    {
        let config = match CalloutConfig::resolve(&self.properties, &*ctx) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Invalid callout configuration");
                ctx.set_variable(VAR_INFO_STDOUT, String::new());
                ctx.set_variable(VAR_INFO_STDERR, format!("{}\n", e));
                return ExecutionResult::Abort;
            }
        };

        let descriptor = config
            .descriptor_var
            .as_deref()
            .and_then(|name| ctx.get_variable(name));
        let path = config
            .service_method_var
            .as_deref()
            .and_then(|name| ctx.get_variable(name));
        let body = ctx.content(config.target);

        let request = DecodeRequest {
            descriptor_set: descriptor.as_deref().map(str::as_bytes),
            descriptor_encoding: match config.descriptor_is_base64 {
                true => DescriptorEncoding::Base64,
                false => DescriptorEncoding::Binary,
            },
            request_path: path.as_deref(),
            target: config.target,
            body: &body,
            body_is_base64: config.message_is_base64,
        };
        let outcome = decode_message(&request);

        if let (Some(format), Some(decoded)) = (outcome.format, &outcome.decoded) {
            ctx.set_variable(VAR_MESSAGE_FORMAT, format.as_str().to_string());
            ctx.set_variable(VAR_MESSAGE_DATA, decoded.clone());
            if let Some(var) = &config.decoded_message_var {
                ctx.set_variable(var, decoded.clone());
            }
        }

        ctx.set_variable(VAR_INFO_STDOUT, outcome.diagnostics.stdout());
        ctx.set_variable(VAR_INFO_STDERR, outcome.diagnostics.stderr());
        ExecutionResult::Success
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn no_descriptor_falls_back_to_text()
    {
        let body = b"\x00\x00\x00\x00\x02\x08\x96\x01";
        let outcome = decode_message(&DecodeRequest::new(&body[..7]));
        assert_eq!(outcome.format, None);
        assert_eq!(outcome.diagnostics.error.len(), 1);

        let body = b"\x00\x00\x00\x00\x03\x08\x96\x01";
        let outcome = decode_message(&DecodeRequest::new(body));
        assert_eq!(outcome.format, Some(MessageFormat::Text));
        assert_eq!(outcome.decoded.as_deref(), Some("1: 150\n"));
        assert_eq!(
            outcome.diagnostics.stdout(),
            "could not find protobuf service/method. invalid input: descriptor set is empty\n"
        );
        assert_eq!(outcome.diagnostics.stderr(), "");
    }

    #[test]
    fn invalid_config_aborts()
    {
        let mut props = Properties::new();
        props.insert(crate::config::PROP_MESSAGE_IS_BASE64, "maybe");

        let mut ctx = SimpleMessageContext::default();
        assert_eq!(Callout::new(props).execute(&mut ctx), ExecutionResult::Abort);
        assert!(ctx.variables[VAR_INFO_STDERR].contains("pb-message-is-base64"));
    }
}
