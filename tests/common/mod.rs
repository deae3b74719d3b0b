#![allow(dead_code)]

use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FieldOptions, FileDescriptorProto, FileDescriptorSet, MessageOptions, MethodDescriptorProto,
    OneofDescriptorProto, ServiceDescriptorProto,
};

pub fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto
{
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

pub fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto
{
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty)
    }
}

pub fn repeated(mut field: FieldDescriptorProto) -> FieldDescriptorProto
{
    field.label = Some(Label::Repeated as i32);
    field
}

pub fn optional(mut field: FieldDescriptorProto) -> FieldDescriptorProto
{
    field.proto3_optional = Some(true);
    field
}

pub fn unpacked(mut field: FieldDescriptorProto) -> FieldDescriptorProto
{
    field.options = Some(FieldOptions {
        packed: Some(false),
        ..Default::default()
    });
    field
}

pub fn in_oneof(mut field: FieldDescriptorProto, index: i32) -> FieldDescriptorProto
{
    field.oneof_index = Some(index);
    field
}

pub fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto
{
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

pub fn map_entry(name: &str, key: FieldDescriptorProto, value: FieldDescriptorProto)
    -> DescriptorProto
{
    DescriptorProto {
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..message(name, vec![key, value])
    }
}

pub fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto
{
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(*number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub fn service(name: &str, methods: &[(&str, &str, &str)]) -> ServiceDescriptorProto
{
    ServiceDescriptorProto {
        name: Some(name.to_string()),
        method: methods
            .iter()
            .map(|(name, input, output)| MethodDescriptorProto {
                name: Some(name.to_string()),
                input_type: Some(input.to_string()),
                output_type: Some(output.to_string()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub fn file(name: &str, package: &str, dependencies: &[&str]) -> FileDescriptorProto
{
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: match package {
            "" => None,
            p => Some(p.to_string()),
        },
        dependency: dependencies.iter().map(|d| d.to_string()).collect(),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// The classic `helloworld.Greeter` service.
pub fn helloworld() -> FileDescriptorProto
{
    FileDescriptorProto {
        message_type: vec![
            message("HelloRequest", vec![field("name", 1, Type::String)]),
            message("HelloReply", vec![field("message", 1, Type::String)]),
        ],
        service: vec![service(
            "Greeter",
            &[("SayHello", ".helloworld.HelloRequest", ".helloworld.HelloReply")],
        )],
        ..file("helloworld.proto", "helloworld", &[])
    }
}

/// A subset of the well known types.
pub fn well_known_types() -> FileDescriptorProto
{
    FileDescriptorProto {
        message_type: vec![
            message(
                "Timestamp",
                vec![field("seconds", 1, Type::Int64), field("nanos", 2, Type::Int32)],
            ),
            message(
                "Duration",
                vec![field("seconds", 1, Type::Int64), field("nanos", 2, Type::Int32)],
            ),
            message(
                "Any",
                vec![field("type_url", 1, Type::String), field("value", 2, Type::Bytes)],
            ),
            message("StringValue", vec![field("value", 1, Type::String)]),
            message("Int64Value", vec![field("value", 1, Type::Int64)]),
            message("FieldMask", vec![repeated(field("paths", 1, Type::String))]),
            message("Empty", vec![]),
        ],
        ..file("google/protobuf/wkt.proto", "google.protobuf", &[])
    }
}

/// Types shared by the shop files.
pub fn shop_common() -> FileDescriptorProto
{
    FileDescriptorProto {
        message_type: vec![message(
            "Money",
            vec![field("currency", 1, Type::String), field("units", 2, Type::Int64)],
        )],
        enum_type: vec![enumeration(
            "Status",
            &[("STATUS_UNKNOWN", 0), ("ACTIVE", 1), ("SUSPENDED", 2)],
        )],
        ..file("shop/common.proto", "shop.common", &[])
    }
}

/// The shop order service, depending on the common types and the well known types.
pub fn shop_orders() -> FileDescriptorProto
{
    let mut order = message(
        "Order",
        vec![
            field("order_id", 1, Type::String),
            field("quantity", 2, Type::Uint64),
            typed("status", 3, Type::Enum, "common.Status"),
            repeated(field("codes", 4, Type::Int32)),
            repeated(typed("counts", 5, Type::Message, "CountsEntry")),
            typed("item", 6, Type::Message, "Item"),
            repeated(typed("items", 7, Type::Message, ".shop.Order.Item")),
            typed("total", 8, Type::Message, ".shop.common.Money"),
            field("blob", 9, Type::Bytes),
            field("gift", 10, Type::Bool),
            typed("created", 11, Type::Message, ".google.protobuf.Timestamp"),
            field("ratio", 12, Type::Float),
            unpacked(repeated(field("tags", 13, Type::Sint32))),
            in_oneof(field("note", 14, Type::String), 0),
            in_oneof(field("rush", 15, Type::Bool), 0),
            typed("ttl", 16, Type::Message, ".google.protobuf.Duration"),
            typed("extra", 17, Type::Message, ".google.protobuf.Any"),
        ],
    );
    order.nested_type = vec![
        message(
            "Item",
            vec![field("sku", 1, Type::String), field("price", 2, Type::Double)],
        ),
        map_entry(
            "CountsEntry",
            field("key", 1, Type::String),
            field("value", 2, Type::Int32),
        ),
    ];
    order.oneof_decl = vec![OneofDescriptorProto {
        name: Some("instructions".to_string()),
        ..Default::default()
    }];

    FileDescriptorProto {
        message_type: vec![
            order,
            message(
                "Receipt",
                vec![
                    field("order_id", 1, Type::String),
                    typed("status", 2, Type::Enum, "shop.common.Status"),
                ],
            ),
        ],
        service: vec![service(
            "Orders",
            &[
                ("Place", ".shop.Order", ".shop.Receipt"),
                ("Lookup", "Receipt", "Order"),
            ],
        )],
        ..file(
            "shop/orders.proto",
            "shop",
            &["shop/common.proto", "google/protobuf/wkt.proto"],
        )
    }
}

/// All fixture files, dependents before their dependencies.
pub fn descriptor_set() -> FileDescriptorSet
{
    FileDescriptorSet {
        file: vec![shop_orders(), helloworld(), shop_common(), well_known_types()],
    }
}

pub fn descriptor_bytes() -> Vec<u8>
{
    descriptor_set().encode_to_vec()
}
