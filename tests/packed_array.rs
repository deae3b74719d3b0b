mod common;

#[test]
fn repeated()
{
    use bytes::BufMut;
    use grpcweb_decoder::{
        decode::{FieldValue, PackedArray},
        Context, MessageValue, Value,
    };

    let context = Context::from_file_descriptor_set(&common::descriptor_set()).unwrap();

    let mut payload = bytes::BytesMut::new();

    payload.put_u8(4 << 3 | 2); // Packed integer array.
    payload.put_slice(b"\x06"); // Length
    payload.put_slice(b"\x01");
    payload.put_slice(b"\x80\x01");
    payload.put_slice(b"\x80\x80\x02");

    payload.put_u8(4 << 3); // Unpacked element of the same field.
    payload.put_u8(5);

    payload.put_u8(13 << 3 | 2); // Packed even though declared unpacked.
    payload.put_slice(b"\x80\x01"); // Length
    payload.put_slice(&(b"\x02".repeat(128)));

    let msg = context.get_message("shop.Order").unwrap();
    let value = msg.decode(&payload, &context);

    assert_eq!(
        value,
        MessageValue {
            msg_ref: msg.self_ref,
            garbage: None,
            fields: vec![
                FieldValue {
                    number: 4,
                    value: Value::Packed(PackedArray::Int32(vec![1, 1 << 7, 1 << 15])),
                },
                FieldValue {
                    number: 4,
                    value: Value::Int32(5),
                },
                FieldValue {
                    number: 13,
                    value: Value::Packed(PackedArray::SInt32(
                        std::iter::repeat(1).take(128).collect()
                    )),
                },
            ]
        }
    );
}

#[test]
fn truncated_packed_array()
{
    use grpcweb_decoder::{Context, Value};

    let context = Context::from_file_descriptor_set(&common::descriptor_set()).unwrap();
    let msg = context.get_message("shop.Order").unwrap();

    // The last varint of the array is cut short.
    let value = msg.decode(b"\x22\x02\x01\x80", &context);
    match &value.fields[0].value {
        Value::Incomplete(..) => {}
        other => panic!("Unexpected value: {:?}", other),
    }
    assert!(value.find_defect(&context).is_some());
}
