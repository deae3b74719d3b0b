//! Decoding context built from protobuf file descriptors.
//!
//! The [`Context`] is an arena holding every package, type, service and file that has been built
//! so far. Items are referred to through small copyable handles such as [`MessageRef`] or
//! [`FileRef`] which can be resolved back to the item through the context that produced them.

use snafu::Snafu;
use std::collections::{BTreeMap, HashMap};

mod api;
mod builder;
mod modify_api;

pub use builder::{index_files, BuildCache, FilesByName};
pub(crate) use modify_api::to_json_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InternalRef(usize);

/// A reference to a message. Can be resolved to `MessageInfo` through a `Context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef(InternalRef);

/// A reference to an enum. Can be resolved to `EnumInfo` through a `Context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumRef(InternalRef);

/// A reference to a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageRef(InternalRef);

/// A reference to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceRef(InternalRef);

/// A reference to a oneof within its owning message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OneofRef(InternalRef);

/// A reference to a built file. Can be resolved to `FileInfo` through a `Context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRef(InternalRef);

/// Error building file descriptors into a context.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum BuildError
{
    /// A file depends on a file that is not part of the descriptor set.
    #[snafu(display("proto dependency '{}' of '{}' not found", dependency, file))]
    MissingDependency
    {
        /// The file declaring the dependency.
        file: String,

        /// The missing dependency.
        dependency: String,
    },

    /// A file was reached again while it was still being built.
    #[snafu(display("cyclic dependency detected at '{}'", file))]
    CyclicDependency
    {
        /// The file that closed the cycle.
        file: String,
    },

    /// Duplicate type.
    #[snafu(display("Duplicate type: {}", name))]
    DuplicateType
    {
        /// Type.
        name: String,
    },

    /// Unknown type reference.
    #[snafu(display("Unknown type '{}' in '{}'", name, context))]
    TypeNotFound
    {
        /// Type name.
        name: String,
        /// Type that referred to the unknown type.
        context: String,
    },

    /// Wrong kind of type used in a specific context.
    #[snafu(display(
        "Invalid type '{}' ({:?}) for {}, expected {:?}",
        type_name,
        actual,
        context,
        expected
    ))]
    InvalidTypeKind
    {
        /// Type that is of the wrong kind.
        type_name: String,

        /// The context where the type was used.
        context: &'static str,

        /// Expected item type.
        expected: ItemType,

        /// Actual item type.
        actual: ItemType,
    },

    /// A field could not be added to its message.
    #[snafu(display("Invalid field '{}' in '{}': {:?}", field, message, reason))]
    InvalidField
    {
        /// Field name.
        field: String,

        /// Full name of the message.
        message: String,

        /// Reason the field was rejected.
        reason: MemberInsertError,
    },
}

/// Error modifying the context.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum InsertError
{
    /// A type conflicts with an existing type.
    TypeExists
    {
        /// The previous type that conflicts with the new one.
        original: TypeRef,
    },

    /// A service conflicts with an existing service.
    ServiceExists
    {
        /// The previous service with the same name.
        original: ServiceRef,
    },

    /// A file with the same name has already been inserted.
    FileExists
    {
        /// The previous file with the same name.
        original: FileRef,
    },
}

/// Error modifying a type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MemberInsertError
{
    /// A field with the same number already exists.
    NumberConflict,

    /// A field with the same name already exists.
    NameConflict,

    /// A field refers to a oneof that does not exist.
    MissingOneof,
}

/// Error modifying a type.
#[derive(Debug)]
#[non_exhaustive]
pub enum OneofInsertError
{
    /// A oneof with the same name already exists.
    NameConflict,

    /// The oneof refers to a field that doesn't exist.
    FieldNotFound
    {
        /// Field number the Oneof referenced.
        field: u64,
    },
}

/// Type reference that references either message or enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef
{
    /// Message type reference.
    Message(MessageRef),

    /// Enum type reference.
    Enum(EnumRef),
}

/// Protobuf item type
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ItemType
{
    /// `message` item
    Message,

    /// `enum` item
    Enum,

    /// `service` item
    Service,
}

/// Decoding context.
///
/// Contains type information built from the file descriptors. Required for decoding
/// incoming Protobuf messages.
#[derive(Default, Debug, PartialEq)]
pub struct Context
{
    packages: Vec<Package>,
    types: Vec<TypeInfo>,
    types_by_name: HashMap<String, usize>,
    services: Vec<Service>,
    services_by_name: HashMap<String, usize>,
    files: Vec<FileInfo>,
    files_by_name: HashMap<String, usize>,
}

/// Package details.
#[derive(Debug, PartialEq)]
pub struct Package
{
    /// Package name. None for an anonymous package.
    name: Option<String>,

    /// Package self reference.
    self_ref: PackageRef,

    /// Top level types.
    types: Vec<TypeRef>,

    /// Services.
    services: Vec<ServiceRef>,
}

/// Protobuf syntax level of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax
{
    /// `syntax = "proto2"`, also the default when the descriptor does not say.
    Proto2,

    /// `syntax = "proto3"`
    Proto3,
}

/// Built file details.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct FileInfo
{
    /// File name as given in the descriptor set, such as `greeter/v1/greeter.proto`.
    pub name: String,

    /// `FileRef` that references this file.
    pub self_ref: FileRef,

    /// Package the file declares its items in.
    pub package: PackageRef,

    /// Syntax level of the file.
    pub syntax: Syntax,

    /// Dependencies in declaration order.
    pub dependencies: Vec<FileRef>,

    /// Top level types declared in the file.
    pub types: Vec<TypeRef>,

    /// Services declared in the file.
    pub services: Vec<ServiceRef>,
}

/// Message or enum type.
#[derive(Debug, PartialEq)]
pub enum TypeInfo
{
    /// Message.
    Message(MessageInfo),

    /// Enum.
    Enum(EnumInfo),
}

/// Message details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct MessageInfo
{
    /// Message name.
    pub name: String,

    /// Full message name, including package and parent type names.
    pub full_name: String,

    /// Parent
    pub parent: TypeParent,

    /// `MessageRef` that references this message.
    pub self_ref: MessageRef,

    /// `oneof` structures defined within the message.
    pub oneofs: Vec<Oneof>,

    /// References to the inner types defined within this message.
    pub inner_types: Vec<TypeRef>,

    /// True, if this is the synthesized entry type of a `map<K, V>` field.
    pub map_entry: bool,

    // Using BTreeMap here to ensure ordering.
    fields: BTreeMap<u64, MessageField>,
    fields_by_name: BTreeMap<String, u64>,
}

/// Reference to a type parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeParent
{
    /// Reference to a package for top-level types.
    Package(PackageRef),

    /// Reference to a message for inner types.
    Message(MessageRef),
}

/// Enum details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct EnumInfo
{
    /// Enum name.
    pub name: String,

    /// Full message name, including package and parent type names.
    pub full_name: String,

    /// Parent
    pub parent: TypeParent,

    /// `EnumRef` that references this enum.
    pub self_ref: EnumRef,

    fields_by_value: BTreeMap<i64, EnumField>,
    fields_by_name: BTreeMap<String, i64>,
}

/// Message field details.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct MessageField
{
    /// Field name.
    pub name: String,

    /// Name used for the field in JSON output.
    pub json_name: String,

    /// Field number.
    pub number: u64,

    /// Field type
    pub field_type: ValueType,

    /// True, if this field is a repeated field.
    pub multiplicity: Multiplicity,

    /// Index to the ´oneof` structure in the parent type if this field is part of a `oneof`.
    pub oneof: Option<OneofRef>,
}

/// Defines the multiplicity of the field values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Multiplicity
{
    /// Field is not repeated and has no presence tracking; default values are not emitted.
    Single,

    /// Field is not repeated, but tracks presence.
    Optional,

    /// Field may be repeated.
    Repeated,

    /// Field is repeated by packing.
    RepeatedPacked,
}

/// Message `oneof` details.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct Oneof
{
    /// Name of the `oneof` structure.
    pub name: String,

    /// Self reference of the `Oneof` in the owning type.
    pub self_ref: OneofRef,

    /// Field numbers of the fields contained in the `oneof`.
    pub fields: Vec<u64>,
}

/// Enum field details.
#[derive(Debug, PartialEq, Clone)]
#[non_exhaustive]
pub struct EnumField
{
    /// Enum field name.
    pub name: String,

    /// Enum field value.
    pub value: i64,
}

/// Field value types.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueType
{
    /// `double`
    Double,

    /// `float`
    Float,

    /// `int32`
    Int32,

    /// `int64`
    Int64,

    /// `uint32`
    UInt32,

    /// `uint64`
    UInt64,

    /// `sint32`
    SInt32,

    /// `sint64`
    SInt64,

    /// `fixed32`
    Fixed32,

    /// `fixed64`
    Fixed64,

    /// `sfixed32`
    SFixed32,

    /// `sfixed64`
    SFixed64,

    /// `bool`
    Bool,

    /// `string`
    String,

    /// `bytes`
    Bytes,

    /// A message type.
    Message(MessageRef),

    /// An enum type.
    Enum(EnumRef),
}

/// Service details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct Service
{
    /// Service name.
    pub name: String,

    /// Full service name, including the package name.
    pub full_name: String,

    /// Service self reference.
    pub self_ref: ServiceRef,

    /// Package that contains the service.
    pub parent: PackageRef,

    /// List of `rpc` operations defined in the service.
    pub rpcs: Vec<Rpc>,

    rpcs_by_name: HashMap<String, usize>,
}

/// Rpc operation
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct Rpc
{
    /// Operation name.
    pub name: String,

    /// Input details.
    pub input: RpcArg,

    /// Output details.
    pub output: RpcArg,
}

/// Rpc operation input or output details.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct RpcArg
{
    /// References to the message type.
    pub message: MessageRef,

    /// True, if this is a stream.
    pub stream: bool,
}
