use super::*;

impl Context
{
    /// Insert a new message definition to the context.
    pub fn insert_message(&mut self, ty: MessageInfo) -> Result<MessageRef, InsertError>
    {
        self.insert_type(TypeInfo::Message(ty)).map(MessageRef)
    }

    /// Insert a new enum definition to the context.
    pub fn insert_enum(&mut self, ty: EnumInfo) -> Result<EnumRef, InsertError>
    {
        self.insert_type(TypeInfo::Enum(ty)).map(EnumRef)
    }

    /// Insert a new package to the context.
    ///
    /// Returns an error if the package with the same name already exists.
    pub fn insert_package(&mut self, mut pkg: Package) -> Result<PackageRef, PackageRef>
    {
        let pkg_ref = PackageRef(InternalRef(self.packages.len()));
        for existing in &self.packages {
            if existing.name == pkg.name {
                return Err(existing.self_ref);
            }
        }

        pkg.self_ref = pkg_ref;
        self.packages.push(pkg);
        Ok(pkg_ref)
    }

    /// Insert a new service to the context.
    ///
    /// The full name of the service is derived from its parent package.
    pub fn insert_service(&mut self, mut service: Service) -> Result<ServiceRef, InsertError>
    {
        use std::collections::hash_map::Entry;

        let service_ref = ServiceRef(InternalRef(self.services.len()));
        let package = &self.packages[service.parent.0 .0];
        service.full_name = match &package.name {
            Some(package_name) => format!("{}.{}", package_name, service.name),
            None => service.name.clone(),
        };

        let vacant = match self.services_by_name.entry(service.full_name.clone()) {
            Entry::Occupied(occupied) => {
                return Err(InsertError::ServiceExists {
                    original: ServiceRef(InternalRef(*occupied.get())),
                })
            }
            Entry::Vacant(vacant) => vacant,
        };

        // From here on, we're modifying the context.
        service.self_ref = service_ref;
        vacant.insert(service_ref.0 .0);
        self.packages[service.parent.0 .0]
            .services
            .push(service_ref);
        self.services.push(service);

        Ok(service_ref)
    }

    /// Record a built file in the context.
    ///
    /// The types and services the file declares should be inserted before the file itself.
    pub fn insert_file(&mut self, mut file: FileInfo) -> Result<FileRef, InsertError>
    {
        use std::collections::hash_map::Entry;

        let file_ref = FileRef(InternalRef(self.files.len()));
        let vacant = match self.files_by_name.entry(file.name.clone()) {
            Entry::Occupied(occupied) => {
                return Err(InsertError::FileExists {
                    original: FileRef(InternalRef(*occupied.get())),
                })
            }
            Entry::Vacant(vacant) => vacant,
        };

        file.self_ref = file_ref;
        vacant.insert(file_ref.0 .0);
        self.files.push(file);

        Ok(file_ref)
    }

    /// Get mutable access to a message that is already part of the context.
    ///
    /// Fields can be added to messages after insertion, which allows self-referential and
    /// mutually referential messages to be built.
    ///
    /// Will **panic** if the message does not exist in this context.
    pub fn resolve_message_mut(&mut self, tr: MessageRef) -> &mut MessageInfo
    {
        match self.types.get_mut(tr.0 .0) {
            Some(TypeInfo::Message(msg)) => msg,
            _ => panic!("Message did not exist in this context"),
        }
    }

    fn insert_type(&mut self, mut ty: TypeInfo) -> Result<InternalRef, InsertError>
    {
        use std::collections::hash_map::Entry;

        // First validate the operation. We'll want to ensure the operation succeeds before we make
        // _any_ changes to the context to avoid making partial changes in case of a failure.

        let internal_ref = InternalRef(self.types.len());
        let parent = ty.parent();

        let full_name = match parent {
            TypeParent::Package(p) => {
                let package = &self.packages[p.0 .0];
                match &package.name {
                    Some(package_name) => format!("{}.{}", package_name, ty.name()),
                    None => ty.name().to_string(),
                }
            }
            TypeParent::Message(m) => {
                let msg = &self.types[m.0 .0];
                format!("{}.{}", msg.full_name(), ty.name())
            }
        };

        match &mut ty {
            TypeInfo::Message(m) => m.full_name = full_name.clone(),
            TypeInfo::Enum(e) => e.full_name = full_name.clone(),
        }

        let vacant = match self.types_by_name.entry(full_name) {
            Entry::Occupied(occupied) => {
                let original_ref = InternalRef(*occupied.get());
                let original = match self.types[original_ref.0] {
                    TypeInfo::Message(..) => TypeRef::Message(MessageRef(original_ref)),
                    TypeInfo::Enum(..) => TypeRef::Enum(EnumRef(original_ref)),
                };
                return Err(InsertError::TypeExists { original });
            }
            Entry::Vacant(vacant) => vacant,
        };

        let type_ref = match &mut ty {
            TypeInfo::Message(m) => {
                m.self_ref = MessageRef(internal_ref);
                TypeRef::Message(m.self_ref)
            }
            TypeInfo::Enum(e) => {
                e.self_ref = EnumRef(internal_ref);
                TypeRef::Enum(e.self_ref)
            }
        };

        // From here on, we're modifying the context.
        // All validations should be done now.

        // Add to the parent collection. Either to the package types or message inner types.
        match parent {
            TypeParent::Package(p) => {
                let package = &mut self.packages[p.0 .0];
                package.types.push(type_ref);
            }
            TypeParent::Message(m) => {
                let ty_info = &mut self.types[m.0 .0];
                match ty_info {
                    TypeInfo::Message(msg) => msg.inner_types.push(type_ref),
                    _ => panic!("Inner type for a non-Message"),
                }
            }
        };

        vacant.insert(internal_ref.0);
        self.types.push(ty);

        Ok(internal_ref)
    }
}

impl Package
{
    /// Create a new package.
    pub fn new(name: Option<String>) -> Self
    {
        Self {
            name,
            self_ref: PackageRef(InternalRef(0)),
            types: vec![],
            services: vec![],
        }
    }
}

impl FileInfo
{
    /// Create a new file info.
    ///
    /// `self_ref` is not valid before the file is inserted into a [`Context`].
    pub fn new(name: String, package: PackageRef, syntax: Syntax) -> Self
    {
        Self {
            name,
            self_ref: FileRef(InternalRef(0)),
            package,
            syntax,
            dependencies: vec![],
            types: vec![],
            services: vec![],
        }
    }
}

impl MessageInfo
{
    /// Create a new message info.
    ///
    /// Before inserting the message info into a [`Context`] certain fields such as `self_ref` or
    /// `full_name` are not valid.
    pub fn new(name: String, parent: TypeParent) -> Self
    {
        MessageInfo {
            name,
            parent,

            full_name: String::new(),
            self_ref: MessageRef(InternalRef(0)),
            oneofs: vec![],
            inner_types: vec![],
            map_entry: false,

            fields: BTreeMap::new(),
            fields_by_name: BTreeMap::new(),
        }
    }

    /// Add a field to the type.
    pub fn add_field(&mut self, field: MessageField) -> Result<(), MemberInsertError>
    {
        use std::collections::btree_map::Entry;

        let num = field.number;
        let num_entry = self.fields.entry(num);
        let name_entry = self.fields_by_name.entry(field.name.to_string());

        let (vacant_num, vacant_name) = match (num_entry, name_entry) {
            (Entry::Occupied(..), _) => return Err(MemberInsertError::NumberConflict),
            (_, Entry::Occupied(..)) => return Err(MemberInsertError::NameConflict),
            (Entry::Vacant(num), Entry::Vacant(name)) => (num, name),
        };

        if let Some(oneof_ref) = field.oneof {
            let oneof = self
                .oneofs
                .get_mut(oneof_ref.0 .0)
                .ok_or(MemberInsertError::MissingOneof)?;
            oneof.fields.push(num);
        }

        vacant_num.insert(field);
        vacant_name.insert(num);

        Ok(())
    }

    /// Add a oneof record to the message.
    pub fn add_oneof(&mut self, mut oneof: Oneof) -> Result<OneofRef, OneofInsertError>
    {
        let oneof_ref = OneofRef(InternalRef(self.oneofs.len()));
        for o in &self.oneofs {
            if o.name == oneof.name {
                return Err(OneofInsertError::NameConflict);
            }
        }

        for f in &oneof.fields {
            self.fields
                .get(f)
                .ok_or(OneofInsertError::FieldNotFound { field: *f })?;
        }

        // From here on we're making changes to self.
        // No error should be raised anymore to avoid partial changes.

        for f in &oneof.fields {
            if let Some(field) = self.fields.get_mut(f) {
                field.oneof = Some(oneof_ref);
            }
        }

        oneof.self_ref = oneof_ref;
        self.oneofs.push(oneof);

        Ok(oneof_ref)
    }
}

impl MessageField
{
    /// Create a new message field.
    ///
    /// The JSON name defaults to the lowerCamelCase form of the field name.
    pub fn new(name: String, number: u64, field_type: ValueType) -> Self
    {
        Self {
            json_name: to_json_name(&name),
            name,
            number,
            field_type,
            multiplicity: Multiplicity::Single,
            oneof: None,
        }
    }
}

impl Service
{
    /// Create a new service.
    ///
    /// `full_name` and `self_ref` are assigned when the service is inserted into a [`Context`].
    pub fn new(name: String, parent: PackageRef) -> Self
    {
        Self {
            name,
            full_name: String::new(),
            self_ref: ServiceRef(InternalRef(0)),
            parent,
            rpcs: vec![],
            rpcs_by_name: HashMap::new(),
        }
    }

    /// Add an rpc operation to the service.
    pub fn add_rpc(&mut self, rpc: Rpc) -> Result<(), MemberInsertError>
    {
        if self.rpcs_by_name.contains_key(&rpc.name) {
            return Err(MemberInsertError::NameConflict);
        }

        self.rpcs_by_name.insert(rpc.name.clone(), self.rpcs.len());
        self.rpcs.push(rpc);
        Ok(())
    }
}

impl Rpc
{
    /// Create a new rpc operation.
    pub fn new(name: String, input: RpcArg, output: RpcArg) -> Self
    {
        Self {
            name,
            input,
            output,
        }
    }
}

impl RpcArg
{
    /// Create a new rpc input or output.
    pub fn new(message: MessageRef, stream: bool) -> Self
    {
        Self { message, stream }
    }
}

impl Oneof
{
    /// Create a new Oneof definition.
    pub fn new(name: String) -> Self
    {
        Self {
            name,
            self_ref: OneofRef(InternalRef(0)),
            fields: vec![],
        }
    }
}

impl EnumInfo
{
    /// Create a new enum info.
    pub fn new(name: String, parent: TypeParent) -> Self
    {
        Self {
            name,
            parent,
            full_name: String::new(),
            self_ref: EnumRef(InternalRef(0)),
            fields_by_value: BTreeMap::new(),
            fields_by_name: BTreeMap::new(),
        }
    }

    /// Add a field to the enum definition.
    pub fn add_field(&mut self, field: EnumField) -> Result<(), MemberInsertError>
    {
        use std::collections::btree_map::Entry;

        let value = field.value;
        let value_entry = self.fields_by_value.entry(value);
        let name_entry = self.fields_by_name.entry(field.name.to_string());

        let (vacant_value, vacant_name) = match (value_entry, name_entry) {
            (Entry::Occupied(..), _) => return Err(MemberInsertError::NumberConflict),
            (_, Entry::Occupied(..)) => return Err(MemberInsertError::NameConflict),
            (Entry::Vacant(value), Entry::Vacant(name)) => (value, name),
        };

        vacant_value.insert(field);
        vacant_name.insert(value);

        Ok(())
    }
}

impl EnumField
{
    /// Create a new enum field.
    pub fn new(name: String, value: i64) -> Self
    {
        Self { name, value }
    }
}

/// Converts a field name into its JSON form, `foo_bar_baz` becoming `fooBarBaz`.
pub(crate) fn to_json_name(name: &str) -> String
{
    let mut out = String::with_capacity(name.len());
    let mut capitalize_next = false;
    for c in name.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn json_names()
    {
        assert_eq!(to_json_name("name"), "name");
        assert_eq!(to_json_name("user_id"), "userId");
        assert_eq!(to_json_name("a_b_c"), "aBC");
        assert_eq!(to_json_name("trailing_"), "trailing");
    }

    #[test]
    fn duplicate_service()
    {
        let mut ctx = Context::new();
        let pkg = ctx
            .insert_package(Package::new(Some("fish".to_string())))
            .unwrap();
        let first = ctx
            .insert_service(Service::new("Swim".to_string(), pkg))
            .unwrap();

        assert_eq!(ctx.get_service("fish.Swim").unwrap().self_ref, first);
        match ctx.insert_service(Service::new("Swim".to_string(), pkg)) {
            Err(InsertError::ServiceExists { original }) => assert_eq!(original, first),
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
