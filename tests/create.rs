mod common;

use common::*;
use grpcweb_decoder::context::{
    Context, EnumField, EnumInfo, MessageField, MessageInfo, Multiplicity, Oneof, Package,
    TypeParent, ValueType,
};
use prost_types::field_descriptor_proto::Type;
use prost_types::{FileDescriptorProto, FileDescriptorSet, OneofDescriptorProto};

fn named_file() -> FileDescriptorProto
{
    let mut msg = message(
        "Message",
        vec![
            field("immediate", 1, Type::Bool),
            in_oneof(field("a1", 10, Type::String), 0),
            in_oneof(field("a2", 11, Type::String), 0),
            in_oneof(field("b1", 20, Type::Uint32), 1),
            in_oneof(field("b2", 21, Type::Uint32), 1),
        ],
    );
    msg.oneof_decl = ["a", "b"]
        .iter()
        .map(|name| OneofDescriptorProto {
            name: Some(name.to_string()),
            ..Default::default()
        })
        .collect();
    msg.enum_type = vec![enumeration("Inner", &[("value1", 1), ("value2", 2)])];

    FileDescriptorProto {
        message_type: vec![msg],
        ..file("named.proto", "Named", &[])
    }
}

#[test]
fn create_context_by_hand()
{
    let built_context = Context::from_file_descriptor_set(&FileDescriptorSet {
        file: vec![named_file()],
    })
    .unwrap();

    let mut handbuilt_context = Context::new();
    let package = handbuilt_context
        .insert_package(Package::new(Some("Named".to_string())))
        .unwrap();
    let mut message = MessageInfo::new("Message".to_string(), TypeParent::Package(package));

    let immediate = MessageField::new("immediate".to_string(), 1, ValueType::Bool);
    message.add_field(immediate).unwrap();

    // Here we add the oneof first and the fields refer to it.
    let oneof_first = Oneof::new("a".to_string());
    let oneof_ref = message.add_oneof(oneof_first).unwrap();

    let mut field_a1 = MessageField::new("a1".to_string(), 10, ValueType::String);
    field_a1.oneof = Some(oneof_ref);
    field_a1.multiplicity = Multiplicity::Optional;
    message.add_field(field_a1).unwrap();

    let mut field_a2 = MessageField::new("a2".to_string(), 11, ValueType::String);
    field_a2.oneof = Some(oneof_ref);
    field_a2.multiplicity = Multiplicity::Optional;
    message.add_field(field_a2).unwrap();

    // For b-fields add the fields first and then refer to them in the oneof.
    let mut field_b1 = MessageField::new("b1".to_string(), 20, ValueType::UInt32);
    field_b1.multiplicity = Multiplicity::Optional;
    message.add_field(field_b1).unwrap();
    let mut field_b2 = MessageField::new("b2".to_string(), 21, ValueType::UInt32);
    field_b2.multiplicity = Multiplicity::Optional;
    message.add_field(field_b2).unwrap();

    let mut oneof_b = Oneof::new("b".to_string());
    oneof_b.fields = vec![20, 21];
    message.add_oneof(oneof_b).unwrap();

    let message_ref = handbuilt_context.insert_message(message).unwrap();

    let mut inner_enum = EnumInfo::new("Inner".to_string(), TypeParent::Message(message_ref));
    inner_enum
        .add_field(EnumField::new("value1".to_string(), 1))
        .unwrap();
    inner_enum
        .add_field(EnumField::new("value2".to_string(), 2))
        .unwrap();

    handbuilt_context.insert_enum(inner_enum).unwrap();

    assert_eq!(
        built_context.get_message("Named.Message"),
        handbuilt_context.get_message("Named.Message")
    );
    assert_eq!(
        built_context.get_type("Named.Message.Inner"),
        handbuilt_context.get_type("Named.Message.Inner")
    );
}

#[test]
fn multiplicities()
{
    let built = Context::from_file_descriptor_set(&FileDescriptorSet {
        file: vec![FileDescriptorProto {
            message_type: vec![message(
                "Message",
                vec![
                    field("s", 1, Type::String),
                    repeated(field("b", 2, Type::Bytes)),
                    optional(field("large", 3, Type::Int64)),
                    repeated(field("signed", 4, Type::Sint32)),
                    typed("child", 10, Type::Message, "Message"),
                ],
            )],
            ..file("anonymous.proto", "", &[])
        }],
    })
    .unwrap();

    let msg = built.get_message("Message").unwrap();
    let multiplicity = |n| msg.get_field(n).unwrap().multiplicity;
    assert_eq!(multiplicity(1), Multiplicity::Single);
    assert_eq!(multiplicity(2), Multiplicity::Repeated);
    assert_eq!(multiplicity(3), Multiplicity::Optional);
    assert_eq!(multiplicity(4), Multiplicity::RepeatedPacked);
    assert_eq!(multiplicity(10), Multiplicity::Optional);
    assert_eq!(
        msg.get_field(10).unwrap().field_type,
        ValueType::Message(msg.self_ref)
    );
}
