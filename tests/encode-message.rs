mod common;

#[test]
fn encode_message()
{
    use grpcweb_decoder::{
        context::TypeRef,
        decode::{EnumValue, FieldValue, MessageValue, PackedArray, Value},
        Context,
    };

    let context = Context::from_file_descriptor_set(&common::descriptor_set()).unwrap();

    let order = context.get_message("shop.Order").unwrap();
    let item = context.get_message("shop.Order.Item").unwrap();
    let status = match context.get_type_ref("shop.common.Status") {
        Some(TypeRef::Enum(e)) => e,
        other => panic!("Unexpected type: {:?}", other),
    };

    let original = MessageValue {
        msg_ref: order.self_ref,
        garbage: None,
        fields: vec![
            FieldValue {
                number: 1,
                value: Value::String("A-1".to_string()),
            },
            FieldValue {
                number: 2,
                value: Value::UInt64(12356),
            },
            FieldValue {
                number: 3,
                value: Value::Enum(EnumValue {
                    enum_ref: status,
                    value: 2,
                }),
            },
            FieldValue {
                number: 4,
                value: Value::Packed(PackedArray::Int32(vec![1, -1, 300])),
            },
            FieldValue {
                number: 6,
                value: Value::Message(Box::new(MessageValue {
                    msg_ref: item.self_ref,
                    garbage: None,
                    fields: vec![
                        FieldValue {
                            number: 1,
                            value: Value::String("child".to_string()),
                        },
                        FieldValue {
                            number: 2,
                            value: Value::Double(1.2345),
                        },
                    ],
                })),
            },
            FieldValue {
                number: 10,
                value: Value::Bool(true),
            },
            FieldValue {
                number: 12,
                value: Value::Float(0.5),
            },
            FieldValue {
                number: 13,
                value: Value::SInt32(-123),
            },
        ],
    };

    let expected = original.encode();
    let decoded = order.decode(&expected, &context);
    let actual = decoded.encode();

    assert_eq!(original, decoded);
    assert_eq!(expected, actual);
}

#[test]
fn unknown_fields_are_kept()
{
    use grpcweb_decoder::Context;

    let context = Context::from_file_descriptor_set(&common::descriptor_set()).unwrap();
    let receipt = context.get_message("shop.Receipt").unwrap();

    // Field 9 is not part of the receipt. Field 1 is sent with the wrong wire type.
    let payload = b"\x0a\x02ok\x48\x2a\x08\x01\x55\x01\x02\x03\x04";
    let decoded = receipt.decode(payload, &context);

    assert_eq!(decoded.find_defect(&context), None);
    assert_eq!(&decoded.encode()[..], &payload[..]);
}
