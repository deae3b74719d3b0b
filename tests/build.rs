mod common;

use common::*;
use grpcweb_decoder::context::{index_files, BuildCache, BuildError, Context, Syntax};
use prost_types::{FileDescriptorProto, FileDescriptorSet};

#[test]
fn building_twice_returns_the_same_file()
{
    let set = descriptor_set();
    let files = index_files(&set.file);
    let orders = files["shop/orders.proto"];

    let mut cache = BuildCache::new();
    let first = cache.build(orders, &files).unwrap();
    let first_info: *const _ = cache.context().resolve_file(first);
    let second = cache.build(orders, &files).unwrap();

    assert_eq!(first, second);
    assert!(std::ptr::eq(first_info, cache.context().resolve_file(second)));
}

#[test]
fn dependencies_are_built_first_and_once()
{
    let set = descriptor_set();
    let files = index_files(&set.file);

    let mut cache = BuildCache::new();
    let orders = cache.build(files["shop/orders.proto"], &files).unwrap();
    let common = cache.build(files["shop/common.proto"], &files).unwrap();

    let context = cache.into_context();
    let names: Vec<_> = context.iter_files().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "shop/common.proto",
            "google/protobuf/wkt.proto",
            "shop/orders.proto"
        ]
    );

    let orders = context.resolve_file(orders);
    assert_eq!(orders.dependencies[0], common);
    assert_eq!(orders.syntax, Syntax::Proto3);
    assert_eq!(
        context.resolve_file(orders.dependencies[1]).name,
        "google/protobuf/wkt.proto"
    );

    // Only the requested file and its dependencies are built.
    assert!(context.get_file("helloworld.proto").is_none());
}

#[test]
fn missing_dependency_names_the_file()
{
    let set = FileDescriptorSet {
        file: vec![shop_orders(), shop_common()],
    };
    let files = index_files(&set.file);

    match BuildCache::new().build(files["shop/orders.proto"], &files) {
        Err(BuildError::MissingDependency { file, dependency }) => {
            assert_eq!(file, "shop/orders.proto");
            assert_eq!(dependency, "google/protobuf/wkt.proto");
        }
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[test]
fn cycles_fail_fast()
{
    let a = file("a.proto", "a", &["b.proto"]);
    let b = file("b.proto", "b", &["a.proto"]);
    let files = vec![a, b];
    let by_name = index_files(&files);

    match BuildCache::new().build(&files[0], &by_name) {
        Err(BuildError::CyclicDependency { file }) => assert_eq!(file, "a.proto"),
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[test]
fn whole_set()
{
    let context = Context::from_file_descriptor_set(&descriptor_set()).unwrap();

    let mut services: Vec<_> = context
        .iter_services()
        .map(|s| s.full_name.as_str())
        .collect();
    services.sort_unstable();
    assert_eq!(services, vec!["helloworld.Greeter", "shop.Orders"]);

    let order = context.get_message("shop.Order").unwrap();
    let counts = order.get_field_by_name("counts").unwrap();
    match counts.field_type {
        grpcweb_decoder::context::ValueType::Message(entry) => {
            let entry = context.resolve_message(entry);
            assert!(entry.map_entry);
            assert_eq!(entry.full_name, "shop.Order.CountsEntry");
        }
        ref other => panic!("Unexpected type: {:?}", other),
    }

    let lookup = context
        .get_service("shop.Orders")
        .unwrap()
        .rpc_by_name("Lookup")
        .unwrap();
    assert_eq!(
        context.resolve_message(lookup.input.message).full_name,
        "shop.Receipt"
    );
}

#[test]
fn unknown_field_type()
{
    let broken = FileDescriptorProto {
        message_type: vec![message(
            "Broken",
            vec![typed(
                "missing",
                1,
                prost_types::field_descriptor_proto::Type::Message,
                "Nowhere",
            )],
        )],
        ..file("broken.proto", "broken", &[])
    };

    match Context::from_file_descriptor_set(&FileDescriptorSet { file: vec![broken] }) {
        Err(BuildError::TypeNotFound { name, .. }) => assert_eq!(name, "Nowhere"),
        other => panic!("Unexpected result: {:?}", other),
    }
}
