//! Resolving gRPC methods from request paths.
//!
//! A request path such as `/helloworld.Greeter/SayHello` names a service and one of its methods.
//! The service is located in a descriptor set through a [`ServiceIndex`], after which only the
//! declaring file and its dependencies are built into a [`Context`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::context::*;
use crate::render::MessageSchema;

/// Error resolving a method.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResolveError
{
    /// The descriptor set or the request path is unusable.
    #[snafu(display("invalid input: {}", reason))]
    InvalidInput
    {
        /// What is wrong with the input.
        reason: String,
    },

    /// The descriptor set could not be decoded.
    #[snafu(display("malformed descriptor set: {}", reason))]
    MalformedDescriptor
    {
        /// Decoder error.
        reason: String,
    },

    /// The file declaring the service could not be built.
    #[snafu(display("{}", source))]
    Descriptor
    {
        /// Build error.
        source: BuildError,
    },

    /// No file declares the service.
    #[snafu(display("service '{}' not found", service))]
    ServiceNotFound
    {
        /// Service name from the request path.
        service: String,
    },

    /// The service has no such method.
    #[snafu(display("method '{}' not found in service '{}'", method, service))]
    MethodNotFound
    {
        /// Full name of the service.
        service: String,

        /// Method name from the request path.
        method: String,
    },
}

/// Which message of a method to work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget
{
    /// The method input.
    Request,

    /// The method output.
    Response,
}

/// Service and method named by a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath
{
    /// Service name as it appears in the path, usually qualified with the package.
    pub service: String,

    /// Last dot separated segment of `service`.
    pub short_service: String,

    /// Method name.
    pub method: String,
}

impl RequestPath
{
    /// Parses a `/package.Service/Method` path.
    ///
    /// The last segment is the method and the one before it the service. Trailing empty
    /// segments are ignored. Both the service and the method must be non-empty.
    pub fn parse(path: &str) -> Result<Self, ResolveError>
    {
        let mut segments: Vec<&str> = path.split('/').collect();
        while segments.last() == Some(&"") {
            segments.pop();
        }

        if segments.len() < 2 || segments[segments.len() - 2].is_empty() {
            return Err(ResolveError::InvalidInput {
                reason: format!("request path '{}' does not name a service and method", path),
            });
        }

        let method = segments[segments.len() - 1];
        let service = segments[segments.len() - 2];
        let short_service = service.rsplit('.').next().unwrap_or(service);

        Ok(RequestPath {
            service: service.to_string(),
            short_service: short_service.to_string(),
            method: method.to_string(),
        })
    }
}

/// Index from short service names to the files declaring them.
#[derive(Debug)]
pub struct ServiceIndex<'a>
{
    by_name: HashMap<&'a str, Vec<(String, &'a FileDescriptorProto)>>,
}

impl<'a> ServiceIndex<'a>
{
    /// Scans every file for declared services.
    pub fn new(files: &'a [FileDescriptorProto]) -> Self
    {
        let mut by_name: HashMap<&str, Vec<_>> = HashMap::new();
        for file in files {
            for service in &file.service {
                let full_name = match file.package() {
                    "" => service.name().to_string(),
                    pkg => format!("{}.{}", pkg, service.name()),
                };
                by_name
                    .entry(service.name())
                    .or_default()
                    .push((full_name, file));
            }
        }

        ServiceIndex { by_name }
    }

    /// Finds the file declaring the service of a request path.
    ///
    /// A file declaring the service under exactly the qualified name of the path is preferred.
    /// Otherwise the last file declaring a service with the same short name is used.
    pub fn lookup(&self, path: &RequestPath) -> Option<&'a FileDescriptorProto>
    {
        let candidates = self.by_name.get(path.short_service.as_str())?;
        if let Some((_, file)) = candidates.iter().find(|(name, _)| *name == path.service) {
            return Some(*file);
        }

        if candidates.len() > 1 {
            warn!(
                service = %path.service,
                candidates = candidates.len(),
                "Ambiguous service name; using the last declaring file"
            );
        }
        candidates.last().map(|(_, file)| *file)
    }

    /// Number of indexed services.
    pub fn len(&self) -> usize
    {
        self.by_name.values().map(Vec::len).sum()
    }

    /// True if no file declares a service.
    pub fn is_empty(&self) -> bool
    {
        self.by_name.is_empty()
    }
}

/// A method resolved from a descriptor set, together with the context holding its types.
#[derive(Debug)]
pub struct ResolvedMethod
{
    context: Context,
    file: FileRef,
    service: ServiceRef,
    rpc: usize,
}

impl ResolvedMethod
{
    /// The context built for the method's declaring file.
    pub fn context(&self) -> &Context
    {
        &self.context
    }

    /// The file declaring the service.
    pub fn file(&self) -> &FileInfo
    {
        self.context.resolve_file(self.file)
    }

    /// The service declaring the method.
    pub fn service(&self) -> &Service
    {
        self.context.resolve_service(self.service)
    }

    /// The method.
    pub fn method(&self) -> &Rpc
    {
        &self.service().rpcs[self.rpc]
    }

    /// The input message type.
    pub fn input(&self) -> &MessageInfo
    {
        self.message(MessageTarget::Request)
    }

    /// The output message type.
    pub fn output(&self) -> &MessageInfo
    {
        self.message(MessageTarget::Response)
    }

    /// The input or output message type.
    pub fn message(&self, target: MessageTarget) -> &MessageInfo
    {
        self.context.resolve_message(self.message_ref(target))
    }

    /// The input or output message type for rendering.
    pub fn schema(&self, target: MessageTarget) -> MessageSchema<'_>
    {
        MessageSchema {
            context: &self.context,
            message: self.message_ref(target),
        }
    }

    fn message_ref(&self, target: MessageTarget) -> MessageRef
    {
        let rpc = self.method();
        match target {
            MessageTarget::Request => rpc.input.message,
            MessageTarget::Response => rpc.output.message,
        }
    }
}

/// Resolves the method of a request path from a binary `FileDescriptorSet`.
pub fn resolve_method(descriptor_set: &[u8], request_path: &str)
    -> Result<ResolvedMethod, ResolveError>
{
    if descriptor_set.is_empty() {
        return Err(ResolveError::InvalidInput {
            reason: "descriptor set is empty".to_string(),
        });
    }
    if request_path.is_empty() {
        return Err(ResolveError::InvalidInput {
            reason: "request path is empty".to_string(),
        });
    }

    let path = RequestPath::parse(request_path)?;
    let set = FileDescriptorSet::decode(descriptor_set).map_err(|e| {
        ResolveError::MalformedDescriptor {
            reason: e.to_string(),
        }
    })?;

    resolve_in_set(&set, &path)
}

/// Resolves the method of a request path from a base64 encoded `FileDescriptorSet`.
pub fn resolve_method_base64(descriptor_set: &str, request_path: &str)
    -> Result<ResolvedMethod, ResolveError>
{
    let text = descriptor_set.trim();
    if text.is_empty() {
        return Err(ResolveError::InvalidInput {
            reason: "descriptor set is empty".to_string(),
        });
    }

    let bytes = STANDARD
        .decode(text)
        .map_err(|e| ResolveError::MalformedDescriptor {
            reason: format!("invalid base64: {}", e),
        })?;
    resolve_method(&bytes, request_path)
}

/// Resolves a request path within an already decoded descriptor set.
pub fn resolve_in_set(set: &FileDescriptorSet, path: &RequestPath)
    -> Result<ResolvedMethod, ResolveError>
{
    let index = ServiceIndex::new(&set.file);
    let declaring = index
        .lookup(path)
        .ok_or_else(|| ResolveError::ServiceNotFound {
            service: path.service.clone(),
        })?;

    let files_by_name = index_files(&set.file);
    let mut cache = BuildCache::new();
    let file = cache
        .build(declaring, &files_by_name)
        .context(Descriptor {})?;
    let context = cache.into_context();

    let service = context
        .resolve_file(file)
        .find_service(&context, &path.short_service)
        .ok_or_else(|| ResolveError::ServiceNotFound {
            service: path.service.clone(),
        })?;

    let rpc = service
        .rpcs
        .iter()
        .position(|rpc| rpc.name == path.method)
        .ok_or_else(|| ResolveError::MethodNotFound {
            service: service.full_name.clone(),
            method: path.method.clone(),
        })?;

    debug!(
        service = %service.full_name,
        method = %path.method,
        file = declaring.name(),
        "Resolved method"
    );

    let service = service.self_ref;
    Ok(ResolvedMethod {
        context,
        file,
        service,
        rpc,
    })
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn request_paths()
    {
        let path = RequestPath::parse("/helloworld.Greeter/SayHello").unwrap();
        assert_eq!(path.service, "helloworld.Greeter");
        assert_eq!(path.short_service, "Greeter");
        assert_eq!(path.method, "SayHello");

        let path = RequestPath::parse("Greeter/SayHello/").unwrap();
        assert_eq!(path.short_service, "Greeter");
        assert_eq!(path.method, "SayHello");

        let path = RequestPath::parse("/prefix/a.b.Svc/Call").unwrap();
        assert_eq!(path.service, "a.b.Svc");
        assert_eq!(path.short_service, "Svc");

        for path in &["SayHello", "/SayHello", "/SayHello/", "//SayHello", ""] {
            match RequestPath::parse(path) {
                Err(ResolveError::InvalidInput { .. }) => {}
                other => panic!("Unexpected result for '{}': {:?}", path, other),
            }
        }
    }

    #[test]
    fn empty_inputs()
    {
        match resolve_method(b"", "/a.B/C") {
            Err(ResolveError::InvalidInput { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
        match resolve_method(b"\x0a\x00", "") {
            Err(ResolveError::InvalidInput { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
        match resolve_method_base64("  ", "/a.B/C") {
            Err(ResolveError::InvalidInput { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn malformed_descriptors()
    {
        match resolve_method(b"\xff\xff", "/a.B/C") {
            Err(ResolveError::MalformedDescriptor { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
        match resolve_method_base64("!!!", "/a.B/C") {
            Err(ResolveError::MalformedDescriptor { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
