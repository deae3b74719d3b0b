//!
//! grpcweb-decoder renders gRPC-Web message bodies as readable text using protobuf descriptors
//! supplied at runtime. The descriptors arrive as a serialized `FileDescriptorSet`; the method
//! named by the request path selects the message type, and the message is rendered as protobuf
//! JSON. When no schema can be resolved the message is still rendered as a dump of its raw
//! wire fields.
//!
//! ```
//! use grpcweb_decoder::{decode_body, encode_frame, resolve_method, MessageFormat, MessageTarget};
//! use prost::Message;
//! use prost_types::{
//!     field_descriptor_proto::{Label, Type},
//!     DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
//!     MethodDescriptorProto, ServiceDescriptorProto,
//! };
//!
//! let message = |name: &str| DescriptorProto {
//!     name: Some(name.to_string()),
//!     field: vec![FieldDescriptorProto {
//!         name: Some("name".to_string()),
//!         number: Some(1),
//!         label: Some(Label::Optional as i32),
//!         r#type: Some(Type::String as i32),
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let set = FileDescriptorSet {
//!     file: vec![FileDescriptorProto {
//!         name: Some("fish.proto".to_string()),
//!         package: Some("fish".to_string()),
//!         syntax: Some("proto3".to_string()),
//!         message_type: vec![message("Request"), message("Response")],
//!         service: vec![ServiceDescriptorProto {
//!             name: Some("Pond".to_string()),
//!             method: vec![MethodDescriptorProto {
//!                 name: Some("Swim".to_string()),
//!                 input_type: Some(".fish.Request".to_string()),
//!                 output_type: Some(".fish.Response".to_string()),
//!                 ..Default::default()
//!             }],
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     }],
//! };
//!
//! let method = resolve_method(&set.encode_to_vec(), "/fish.Pond/Swim").unwrap();
//! assert_eq!(method.input().full_name, "fish.Request");
//!
//! let body = encode_frame(b"\x0a\x05Perch");
//! let rendered = decode_body(&body, false, Some(method.schema(MessageTarget::Request))).unwrap();
//! assert_eq!(rendered.format, MessageFormat::Json);
//! assert_eq!(rendered.text, "{\n  \"name\": \"Perch\"\n}");
//!
//! let rendered = decode_body(&body, false, None).unwrap();
//! assert_eq!(rendered.format, MessageFormat::Text);
//! assert_eq!(rendered.text, "1: \"Perch\"\n");
//! ```
#![warn(missing_docs)]
#![allow(clippy::match_bool)]

pub mod callout;
pub mod config;
pub mod context;
pub mod decode;
pub mod encode;
pub mod frame;
pub mod render;
pub mod resolve;
pub mod unknown;

mod json;

pub use callout::{
    decode_body, decode_message, Callout, DecodeOutcome, DecodeRequest, DescriptorEncoding,
    Diagnostics, ExecutionResult, MessageContext,
};
pub use config::{CalloutConfig, ConfigError, Properties, VarResolver, Variables};
pub use context::{BuildCache, BuildError, Context, FileRef, MessageInfo, MessageRef};
pub use decode::{FieldValue, MessageValue, UnknownValue, Value};
pub use frame::{decode_frame, decode_frames, encode_frame, encode_trailers, FrameError};
pub use render::{render, MessageFormat, MessageSchema, RenderError, Rendered};
pub use resolve::{
    resolve_method, resolve_method_base64, MessageTarget, RequestPath, ResolveError,
    ResolvedMethod,
};
pub use unknown::UnknownFieldSet;
