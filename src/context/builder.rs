use std::borrow::Cow;
use std::collections::HashSet;
use std::convert::TryFrom;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet, ServiceDescriptorProto,
};
use tracing::debug;

use super::modify_api::to_json_name;
use super::*;

/// Lookup of all available file descriptor protos by file name.
pub type FilesByName<'a> = HashMap<&'a str, &'a FileDescriptorProto>;

/// Indexes file descriptor protos by their file name.
///
/// If the same name appears more than once, the last one wins.
pub fn index_files(files: &[FileDescriptorProto]) -> FilesByName<'_>
{
    files.iter().map(|f| (f.name(), f)).collect()
}

/// Builds file descriptor protos into a [`Context`].
///
/// Each file is built at most once: building a file that is already part of the cache returns
/// the existing [`FileRef`]. Dependencies are built before the files that depend on them, so by
/// the time a file is inserted every type it can refer to is already present.
///
/// The cache is meant for a single resolution. Descriptor sets may differ between requests, so
/// a cache should not be reused across them.
#[derive(Default, Debug)]
pub struct BuildCache
{
    context: Context,
    in_progress: HashSet<String>,
}

impl BuildCache
{
    /// Creates an empty build cache.
    pub fn new() -> Self
    {
        Default::default()
    }

    /// Builds a file and, recursively, all of its dependencies.
    pub fn build(
        &mut self,
        file: &FileDescriptorProto,
        files_by_name: &FilesByName,
    ) -> Result<FileRef, BuildError>
    {
        let name = file.name();
        if let Some(existing) = self.context.get_file(name) {
            return Ok(existing.self_ref);
        }

        if !self.in_progress.insert(name.to_string()) {
            return Err(BuildError::CyclicDependency {
                file: name.to_string(),
            });
        }

        let result = self.build_uncached(file, files_by_name);
        self.in_progress.remove(name);
        result
    }

    /// The context holding everything built so far.
    pub fn context(&self) -> &Context
    {
        &self.context
    }

    /// Consumes the cache, returning the built context.
    pub fn into_context(self) -> Context
    {
        self.context
    }

    fn build_uncached(
        &mut self,
        file: &FileDescriptorProto,
        files_by_name: &FilesByName,
    ) -> Result<FileRef, BuildError>
    {
        let name = file.name();

        let mut dependencies = Vec::with_capacity(file.dependency.len());
        for dependency in &file.dependency {
            let dep_file = files_by_name.get(dependency.as_str()).ok_or_else(|| {
                BuildError::MissingDependency {
                    file: name.to_string(),
                    dependency: dependency.clone(),
                }
            })?;
            dependencies.push(self.build(dep_file, files_by_name)?);
        }

        let syntax = match file.syntax() {
            "proto3" => Syntax::Proto3,
            _ => Syntax::Proto2,
        };
        let package_name = match file.package() {
            "" => None,
            p => Some(p.to_string()),
        };
        let package = self
            .context
            .insert_package(Package::new(package_name))
            .unwrap_or_else(|existing| existing);

        // Declare all types first so fields may refer to types declared later in the file or to
        // the message itself.
        let mut declared = vec![];
        let mut types = vec![];
        for message in &file.message_type {
            let msg_ref =
                self.declare_message(message, TypeParent::Package(package), &mut declared)?;
            types.push(TypeRef::Message(msg_ref));
        }
        for en in &file.enum_type {
            let enum_ref = self.declare_enum(en, TypeParent::Package(package))?;
            types.push(TypeRef::Enum(enum_ref));
        }

        for (msg_ref, message) in declared {
            self.resolve_fields(msg_ref, message, syntax)?;
        }

        let services = file
            .service
            .iter()
            .map(|service| self.build_service(service, package))
            .collect::<Result<Vec<_>, _>>()?;

        let mut info = FileInfo::new(name.to_string(), package, syntax);
        info.dependencies = dependencies;
        info.types = types;
        info.services = services;
        let file_ref = self
            .context
            .insert_file(info)
            .map_err(|_| BuildError::DuplicateType {
                name: name.to_string(),
            })?;

        debug!(file = name, "built file descriptor");
        Ok(file_ref)
    }

    /// Inserts the message and its inner types into the context without fields.
    ///
    /// The declared messages are collected into `declared` for the field resolution pass.
    fn declare_message<'a>(
        &mut self,
        message: &'a DescriptorProto,
        parent: TypeParent,
        declared: &mut Vec<(MessageRef, &'a DescriptorProto)>,
    ) -> Result<MessageRef, BuildError>
    {
        let mut info = MessageInfo::new(message.name().to_string(), parent);
        info.map_entry = message
            .options
            .as_ref()
            .map(|o| o.map_entry())
            .unwrap_or(false);
        for oneof in &message.oneof_decl {
            // The oneof has no fields yet so the only possible failure is a name conflict.
            info.add_oneof(Oneof::new(oneof.name().to_string()))
                .map_err(|_| BuildError::DuplicateType {
                    name: format!("{}.{}", message.name(), oneof.name()),
                })?;
        }

        let msg_ref = self
            .context
            .insert_message(info)
            .map_err(|e| self.duplicate_type(e))?;
        declared.push((msg_ref, message));

        for inner in &message.nested_type {
            self.declare_message(inner, TypeParent::Message(msg_ref), declared)?;
        }
        for inner in &message.enum_type {
            self.declare_enum(inner, TypeParent::Message(msg_ref))?;
        }

        Ok(msg_ref)
    }

    fn declare_enum(
        &mut self,
        en: &EnumDescriptorProto,
        parent: TypeParent,
    ) -> Result<EnumRef, BuildError>
    {
        let mut info = EnumInfo::new(en.name().to_string(), parent);
        for value in &en.value {
            let field = EnumField::new(value.name().to_string(), i64::from(value.number()));

            // Aliased values (`allow_alias`) keep the first name for the value.
            if let Err(e) = info.add_field(field) {
                debug!(
                    enum_name = en.name(),
                    value = value.name(),
                    "skipping enum value: {:?}",
                    e
                );
            }
        }

        self.context
            .insert_enum(info)
            .map_err(|e| self.duplicate_type(e))
    }

    fn resolve_fields(
        &mut self,
        msg_ref: MessageRef,
        message: &DescriptorProto,
        syntax: Syntax,
    ) -> Result<(), BuildError>
    {
        let scope = self.context.resolve_message(msg_ref).full_name.clone();
        for field in &message.field {
            let field_type = match self.field_type(field, &scope)? {
                Some(vt) => vt,
                None => {
                    debug!(
                        message = scope.as_str(),
                        field = field.name(),
                        "group fields are decoded as unknown fields"
                    );
                    continue;
                }
            };

            let number = u64::try_from(field.number()).unwrap_or(0);
            let mut info = MessageField::new(field.name().to_string(), number, field_type);
            info.multiplicity = resolve_multiplicity(field, &info.field_type, syntax);
            if let Some(json_name) = field.json_name.as_deref().filter(|n| !n.is_empty()) {
                info.json_name = json_name.to_string();
            }
            info.oneof = field
                .oneof_index
                .map(|idx| OneofRef(InternalRef(usize::try_from(idx).unwrap_or(usize::MAX))));

            self.context
                .resolve_message_mut(msg_ref)
                .add_field(info)
                .map_err(|reason| BuildError::InvalidField {
                    field: field.name().to_string(),
                    message: scope.clone(),
                    reason,
                })?;
        }

        Ok(())
    }

    /// Resolves the value type of a field. `None` for `group` fields.
    fn field_type(
        &self,
        field: &FieldDescriptorProto,
        scope: &str,
    ) -> Result<Option<ValueType>, BuildError>
    {
        // Some descriptor producers leave the type unset and only fill in the type name.
        if field.r#type.is_none() {
            return self.resolve_type_name(field.type_name(), scope, None).map(Some);
        }

        Ok(Some(match field.r#type() {
            Type::Double => ValueType::Double,
            Type::Float => ValueType::Float,
            Type::Int64 => ValueType::Int64,
            Type::Uint64 => ValueType::UInt64,
            Type::Int32 => ValueType::Int32,
            Type::Fixed64 => ValueType::Fixed64,
            Type::Fixed32 => ValueType::Fixed32,
            Type::Bool => ValueType::Bool,
            Type::String => ValueType::String,
            Type::Bytes => ValueType::Bytes,
            Type::Uint32 => ValueType::UInt32,
            Type::Sfixed32 => ValueType::SFixed32,
            Type::Sfixed64 => ValueType::SFixed64,
            Type::Sint32 => ValueType::SInt32,
            Type::Sint64 => ValueType::SInt64,
            Type::Message => {
                self.resolve_type_name(field.type_name(), scope, Some(ItemType::Message))?
            }
            Type::Enum => self.resolve_type_name(field.type_name(), scope, Some(ItemType::Enum))?,
            Type::Group => return Ok(None),
        }))
    }

    fn resolve_type_name(
        &self,
        name: &str,
        scope: &str,
        expected: Option<ItemType>,
    ) -> Result<ValueType, BuildError>
    {
        let type_ref =
            self.lookup_type(name, scope)
                .ok_or_else(|| BuildError::TypeNotFound {
                    name: name.to_string(),
                    context: scope.to_string(),
                })?;

        let (vt, actual) = match type_ref {
            TypeRef::Message(m) => (ValueType::Message(m), ItemType::Message),
            TypeRef::Enum(e) => (ValueType::Enum(e), ItemType::Enum),
        };

        match expected {
            Some(expected) if expected != actual => Err(BuildError::InvalidTypeKind {
                type_name: name.to_string(),
                context: "field type",
                expected,
                actual,
            }),
            _ => Ok(vt),
        }
    }

    fn build_service(
        &mut self,
        service: &ServiceDescriptorProto,
        package: PackageRef,
    ) -> Result<ServiceRef, BuildError>
    {
        let scope = match self.context.resolve_package(package).name() {
            Some(p) => format!("{}.{}", p, service.name()),
            None => service.name().to_string(),
        };

        let mut info = Service::new(service.name().to_string(), package);
        for method in &service.method {
            let input = self.rpc_arg(method.input_type(), &scope, method.client_streaming())?;
            let output = self.rpc_arg(method.output_type(), &scope, method.server_streaming())?;
            info.add_rpc(Rpc::new(method.name().to_string(), input, output))
                .map_err(|reason| BuildError::InvalidField {
                    field: method.name().to_string(),
                    message: scope.clone(),
                    reason,
                })?;
        }

        self.context
            .insert_service(info)
            .map_err(|_| BuildError::DuplicateType { name: scope })
    }

    fn rpc_arg(&self, type_name: &str, scope: &str, stream: bool) -> Result<RpcArg, BuildError>
    {
        let type_ref =
            self.lookup_type(type_name, scope)
                .ok_or_else(|| BuildError::TypeNotFound {
                    name: type_name.to_string(),
                    context: scope.to_string(),
                })?;

        // All rpc input/output types must be messages.
        match type_ref {
            TypeRef::Message(message) => Ok(RpcArg::new(message, stream)),
            TypeRef::Enum(..) => Err(BuildError::InvalidTypeKind {
                type_name: type_name.to_string(),
                context: "service input/output",
                expected: ItemType::Message,
                actual: ItemType::Enum,
            }),
        }
    }

    /// Resolves a possibly relative type name from within the `current_path` scope.
    fn lookup_type(&self, relative_name: &str, mut current_path: &str) -> Option<TypeRef>
    {
        if let Some(full_name) = relative_name.strip_prefix('.') {
            return self.context.get_type_ref(full_name);
        }

        loop {
            let lookup: Cow<str> = match current_path.is_empty() {
                true => relative_name.into(),
                false => format!("{}.{}", current_path, relative_name).into(),
            };

            if let Some(t) = self.context.get_type_ref(&lookup) {
                return Some(t);
            }

            if current_path.is_empty() {
                return None;
            }

            match current_path.rfind('.') {
                Some(i) => {
                    let (start, _) = current_path.split_at(i);
                    current_path = start;
                }
                None => {
                    current_path = "";
                }
            }
        }
    }

    fn duplicate_type(&self, e: InsertError) -> BuildError
    {
        let name = match e {
            InsertError::TypeExists {
                original: TypeRef::Message(m),
            } => self.context.resolve_message(m).full_name.clone(),
            InsertError::TypeExists {
                original: TypeRef::Enum(en),
            } => self.context.resolve_enum(en).full_name.clone(),
            other => format!("{:?}", other),
        };
        BuildError::DuplicateType { name }
    }
}

fn resolve_multiplicity(
    field: &FieldDescriptorProto,
    field_type: &ValueType,
    syntax: Syntax,
) -> Multiplicity
{
    match field.label() {
        Label::Repeated => {
            // Only scalar fields can be packed. Proto3 packs them unless told otherwise.
            let packed = field
                .options
                .as_ref()
                .and_then(|o| o.packed)
                .unwrap_or(syntax == Syntax::Proto3);
            match field_type.is_packable() && packed {
                true => Multiplicity::RepeatedPacked,
                false => Multiplicity::Repeated,
            }
        }
        Label::Required => Multiplicity::Optional,
        Label::Optional => {
            let explicit_presence = syntax == Syntax::Proto2
                || field.proto3_optional()
                || field.oneof_index.is_some()
                || matches!(field_type, ValueType::Message(..));
            match explicit_presence {
                true => Multiplicity::Optional,
                false => Multiplicity::Single,
            }
        }
    }
}

impl Context
{
    /// Builds every file of a descriptor set into a new context.
    pub fn from_file_descriptor_set(set: &FileDescriptorSet) -> Result<Self, BuildError>
    {
        let files_by_name = index_files(&set.file);
        let mut cache = BuildCache::new();
        for file in &set.file {
            cache.build(file, &files_by_name)?;
        }
        Ok(cache.into_context())
    }
}
