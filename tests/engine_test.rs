//! End-to-end tests of the resource engine against the in-memory manager.

use std::sync::Arc;
use std::thread;

use resource_schema::{
    validate, Api, ApiConfig, ApiError, DefinitionError, FieldSpec, FieldType, Io, MemoryManager,
    Operation, Query, ResourceDef, SchemaSource, Sort,
};
use serde_json::{json, Value};

fn foo_def() -> ResourceDef {
    ResourceDef::new("foo")
        .field(FieldSpec::new("name", FieldType::string()))
        .field(FieldSpec::new("secret", FieldType::string()).io(Io::CREATE))
        .field(FieldSpec::new("slug", FieldType::string()).io(Io::CREATE | Io::READ))
}

fn foo_api() -> Api {
    let mut api = Api::default();
    api.add_resource(foo_def()).unwrap();
    api
}

fn names(items: &[Value]) -> Vec<&str> {
    items.iter().map(|i| i["name"].as_str().unwrap()).collect()
}

mod crud {
    use super::*;

    #[test]
    fn create_hides_write_only_fields() {
        let api = foo_api();
        let created = api
            .create(
                "foo",
                &json!({ "name": "Foo", "secret": "mystery", "slug": "foo" }),
            )
            .unwrap();
        assert_eq!(
            created,
            json!({ "$uri": "/foo/1", "name": "Foo", "slug": "foo" })
        );
    }

    #[test]
    fn update_rejects_create_only_field() {
        let api = foo_api();
        api.create(
            "foo",
            &json!({ "name": "Foo", "secret": "mystery", "slug": "foo" }),
        )
        .unwrap();

        let err = api
            .update("foo", 1, &json!({ "name": "Bar", "secret": "123456" }))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.to_payload(),
            json!({
                "status": 400,
                "message": "Bad Request",
                "errors": [
                    { "validationOf": { "additionalProperties": false }, "path": ["secret"] }
                ]
            })
        );

        // the rejected update changed nothing
        assert_eq!(api.read("foo", 1).unwrap()["name"], "Foo");
    }

    #[test]
    fn update_rejects_null_for_create_only_field() {
        let api = foo_api();
        api.create("foo", &json!({ "name": "Foo", "slug": "foo" }))
            .unwrap();

        let err = api
            .update("foo", 1, &json!({ "slug": null }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "additionalProperties": false }, "path": ["slug"] }])
        );
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let api = foo_api();
        api.create(
            "foo",
            &json!({ "name": "Foo", "secret": "mystery", "slug": "foo" }),
        )
        .unwrap();

        let updated = api.update("foo", 1, &json!({ "name": "Bar" })).unwrap();
        assert_eq!(
            updated,
            json!({ "$uri": "/foo/1", "name": "Bar", "slug": "foo" })
        );
        assert_eq!(api.read("foo", 1).unwrap(), updated);
    }

    #[test]
    fn absent_fields_are_omitted() {
        let api = foo_api();
        let created = api.create("foo", &json!({ "name": "Foo" })).unwrap();
        assert_eq!(created, json!({ "$uri": "/foo/1", "name": "Foo" }));
    }

    #[test]
    fn read_representation_validates_for_create() {
        let api = foo_api();
        let values = api
            .validate("foo", Operation::Create, &json!({ "name": "Foo" }))
            .unwrap();

        let read = api.view("foo", Operation::Read).unwrap();
        let projected = Value::Object(read.project(&values, &api));
        assert_eq!(projected, json!({ "name": "Foo" }));

        let create = api.view("foo", Operation::Create).unwrap();
        assert!(validate(&create, &projected, &api).is_ok());
    }

    #[test]
    fn ids_are_sequential() {
        let api = foo_api();
        for expected in 1..=3 {
            let created = api.create("foo", &json!({ "name": "x" })).unwrap();
            assert_eq!(created["$uri"], format!("/foo/{}", expected));
        }
    }

    #[test]
    fn delete_then_read_is_not_found() {
        let api = foo_api();
        api.create("foo", &json!({ "name": "Foo" })).unwrap();

        api.delete("foo", 1).unwrap();
        assert_eq!(api.read("foo", 1).unwrap_err().status_code(), 404);
        assert_eq!(api.delete("foo", 1).unwrap_err().status_code(), 404);
    }

    #[test]
    fn prefix_applies_to_uris() {
        let mut api = Api::new(
            ApiConfig {
                prefix: "/v1".into(),
                ..ApiConfig::default()
            },
            MemoryManager::factory(),
        );
        api.add_resource(foo_def()).unwrap();

        let created = api.create("foo", &json!({ "name": "Foo" })).unwrap();
        assert_eq!(created["$uri"], "/v1/foo/1");
    }

    #[test]
    fn id_and_type_instead_of_uri() {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("tag")
                .field(FieldSpec::new("label", FieldType::string()))
                .include_id()
                .include_type(),
        )
        .unwrap();

        let created = api.create("tag", &json!({ "label": "red" })).unwrap();
        assert_eq!(created, json!({ "$id": 1, "$type": "tag", "label": "red" }));
    }
}

mod create_rules {
    use super::*;

    fn api() -> Api {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("task")
                .field(FieldSpec::new("title", FieldType::string()).required())
                .field(
                    FieldSpec::new("state", FieldType::string())
                        .required()
                        .with_default(json!("open")),
                )
                .field(FieldSpec::new("note", FieldType::string()).nullable())
                .field(
                    FieldSpec::new("priority", FieldType::integer())
                        .with_default(json!(3)),
                ),
        )
        .unwrap();
        api
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let created = api().create("task", &json!({ "title": "Write" })).unwrap();
        assert_eq!(
            created,
            json!({
                "$uri": "/task/1",
                "title": "Write",
                "state": "open",
                "priority": 3
            })
        );
    }

    #[test]
    fn missing_required_field() {
        let err = api().create("task", &json!({ "note": "x" })).unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "required": ["title"] }, "path": [] }])
        );
    }

    #[test]
    fn update_does_not_require_or_default() {
        let api = api();
        api.create("task", &json!({ "title": "Write", "priority": 1 }))
            .unwrap();

        let updated = api.update("task", 1, &json!({ "note": "soon" })).unwrap();
        assert_eq!(updated["priority"], 1);
        assert_eq!(updated["state"], "open");
        assert_eq!(updated["note"], "soon");
    }

    #[test]
    fn nullable_accepts_null() {
        let api = api();
        api.create("task", &json!({ "title": "Write", "note": "x" }))
            .unwrap();
        let updated = api.update("task", 1, &json!({ "note": null })).unwrap();
        assert_eq!(updated["note"], Value::Null);
    }

    #[test]
    fn every_missing_required_field_is_reported() {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("pair")
                .field(FieldSpec::new("a", FieldType::string()).required())
                .field(FieldSpec::new("b", FieldType::string()).required()),
        )
        .unwrap();

        let err = api.create("pair", &json!({})).unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([
                { "validationOf": { "required": ["a", "b"] }, "path": [] },
                { "validationOf": { "required": ["a", "b"] }, "path": [] }
            ])
        );
    }

    #[test]
    fn null_rejected_when_not_nullable() {
        let err = api()
            .create("task", &json!({ "title": null }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "type": "string" }, "path": ["title"] }])
        );
    }

    #[test]
    fn all_violations_reported_in_order() {
        let err = api()
            .create(
                "task",
                &json!({ "zzz": 1, "priority": "high", "aaa": 2 }),
            )
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([
                { "validationOf": { "required": ["title"] }, "path": [] },
                { "validationOf": { "type": "integer" }, "path": ["priority"] },
                { "validationOf": { "additionalProperties": false }, "path": ["zzz"] },
                { "validationOf": { "additionalProperties": false }, "path": ["aaa"] }
            ])
        );
    }

    #[test]
    fn non_object_payload() {
        let err = api().create("task", &json!(["title"])).unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "type": "object" }, "path": [] }])
        );
    }

    #[test]
    fn created_output_validates_again() {
        let api = api();
        let values = api
            .validate("task", Operation::Create, &json!({ "title": "Write" }))
            .unwrap();

        let read = api.view("task", Operation::Read).unwrap();
        let projected = Value::Object(read.project(&values, &api));
        let create = api.view("task", Operation::Create).unwrap();

        let again = validate(&create, &projected, &api).unwrap();
        assert_eq!(Value::Object(again), projected);
    }
}

mod paths {
    use super::*;

    fn api() -> Api {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("customer")
                .field(FieldSpec::new("name", FieldType::string()).required()),
        )
        .unwrap();
        api.add_resource(
            ResourceDef::new("order")
                .field(FieldSpec::new("customer", FieldType::inline("customer")))
                .field(FieldSpec::new(
                    "address",
                    FieldType::nested(vec![
                        FieldSpec::new("zip", FieldType::string()),
                        FieldSpec::new("verified", FieldType::Boolean).io(Io::READ),
                    ]),
                ))
                .field(FieldSpec::new(
                    "tags",
                    FieldType::array(FieldType::string()),
                )),
        )
        .unwrap();
        api
    }

    #[test]
    fn nested_violation_prefixed_with_field() {
        let err = api()
            .create("order", &json!({ "address": { "zip": 12345 } }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "type": "string" }, "path": ["address", "zip"] }])
        );
    }

    #[test]
    fn nested_read_only_field_rejected_on_create() {
        let err = api()
            .create("order", &json!({ "address": { "verified": true } }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{
                "validationOf": { "additionalProperties": false },
                "path": ["address", "verified"]
            }])
        );
    }

    #[test]
    fn array_item_violation_has_index() {
        let err = api()
            .create("order", &json!({ "tags": ["a", 1] }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "type": "string" }, "path": ["tags", 1] }])
        );
    }

    #[test]
    fn inline_violation_prefixed_with_field() {
        let api = api();
        let err = api
            .create("order", &json!({ "customer": { "name": 5 } }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "type": "string" }, "path": ["customer", "name"] }])
        );

        let err = api
            .create("order", &json!({ "customer": {} }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "required": ["name"] }, "path": ["customer"] }])
        );
    }

    #[test]
    fn map_entry_violation_has_key() {
        let mut api = Api::default();
        api.add_resource(ResourceDef::new("doc").field(FieldSpec::new(
            "labels",
            FieldType::Object {
                values: Some(Box::new(FieldType::nested(vec![FieldSpec::new(
                    "text",
                    FieldType::string(),
                )]))),
            },
        )))
        .unwrap();

        let err = api
            .create("doc", &json!({ "labels": { "en": { "text": 5 } } }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "type": "string" }, "path": ["labels", "en", "text"] }])
        );
    }

    #[test]
    fn self_inline_violation_prefixed_with_field() {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("node")
                .field(FieldSpec::new("name", FieldType::string()))
                .field(FieldSpec::new("parent", FieldType::inline("self")).nullable()),
        )
        .unwrap();

        let err = api
            .create("node", &json!({ "name": "a", "parent": { "name": 5 } }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{ "validationOf": { "type": "string" }, "path": ["parent", "name"] }])
        );

        let created = api
            .create("node", &json!({ "name": "a", "parent": { "name": "b" } }))
            .unwrap();
        assert_eq!(created["parent"], json!({ "name": "b" }));
    }

    #[test]
    fn nested_update_keeps_create_only_fields() {
        let mut api = Api::default();
        api.add_resource(ResourceDef::new("site").field(FieldSpec::new(
            "address",
            FieldType::nested(vec![
                FieldSpec::new("zip", FieldType::string()).io(Io::CREATE | Io::READ),
                FieldSpec::new("city", FieldType::string()),
            ]),
        )))
        .unwrap();

        api.create(
            "site",
            &json!({ "address": { "zip": "10115", "city": "Berlin" } }),
        )
        .unwrap();

        let updated = api
            .update("site", 1, &json!({ "address": { "city": "Bonn" } }))
            .unwrap();
        assert_eq!(updated["address"], json!({ "zip": "10115", "city": "Bonn" }));
        assert_eq!(api.read("site", 1).unwrap(), updated);

        let err = api
            .update("site", 1, &json!({ "address": { "zip": "80331" } }))
            .unwrap_err();
        assert_eq!(
            err.to_payload()["errors"],
            json!([{
                "validationOf": { "additionalProperties": false },
                "path": ["address", "zip"]
            }])
        );
    }

    #[test]
    fn valid_structures_round_trip() {
        let created = api()
            .create(
                "order",
                &json!({
                    "customer": { "name": "Ada" },
                    "address": { "zip": "10115" },
                    "tags": ["a", "b"]
                }),
            )
            .unwrap();
        assert_eq!(
            created,
            json!({
                "$uri": "/order/1",
                "customer": { "name": "Ada" },
                "address": { "zip": "10115" },
                "tags": ["a", "b"]
            })
        );
    }
}

mod errors {
    use super::*;

    #[test]
    fn missing_item_names_type_and_id() {
        let err = foo_api().read("foo", 99).unwrap_err();
        assert_eq!(
            err.to_payload(),
            json!({
                "status": 404,
                "message": "Not Found",
                "item": { "$type": "foo", "$id": 99 }
            })
        );
    }

    #[test]
    fn update_of_missing_item() {
        let err = foo_api()
            .update("foo", 7, &json!({ "name": "x" }))
            .unwrap_err();
        assert!(matches!(err, ApiError::ItemNotFound { id: Some(7), .. }));
    }

    #[test]
    fn natural_key_lookup() {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("user")
                .field(FieldSpec::new("email", FieldType::string()).natural_key())
                .field(FieldSpec::new("name", FieldType::string())),
        )
        .unwrap();
        api.create("user", &json!({ "email": "ada@example.com", "name": "Ada" }))
            .unwrap();

        let found = api
            .read_by_key("user", "email", &json!("ada@example.com"))
            .unwrap();
        assert_eq!(found["name"], "Ada");

        let err = api
            .read_by_key("user", "email", &json!("bob@example.com"))
            .unwrap_err();
        assert_eq!(
            err.to_payload(),
            json!({ "status": 404, "message": "Not Found" })
        );
    }

    #[test]
    fn duplicate_natural_key_is_conflict() {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("user")
                .field(FieldSpec::new("email", FieldType::string()).natural_key()),
        )
        .unwrap();
        api.create("user", &json!({ "email": "ada@example.com" }))
            .unwrap();
        api.create("user", &json!({ "email": "bob@example.com" }))
            .unwrap();

        let err = api
            .update("user", 2, &json!({ "email": "ada@example.com" }))
            .unwrap_err();
        assert_eq!(
            err.to_payload(),
            json!({
                "status": 409,
                "message": "Conflict",
                "data": { "email": "ada@example.com" }
            })
        );
    }
}

mod enumerate {
    use super::*;

    fn api_with_foo_bar() -> Api {
        let api = foo_api();
        api.create("foo", &json!({ "name": "Foo" })).unwrap();
        api.create("foo", &json!({ "name": "Bar" })).unwrap();
        api
    }

    #[test]
    fn sort_descending() {
        let items = api_with_foo_bar()
            .enumerate("foo", &Query::default().sorted(Sort::desc("name")))
            .unwrap();
        assert_eq!(names(&items), ["Foo", "Bar"]);
    }

    #[test]
    fn sort_ascending() {
        let items = api_with_foo_bar()
            .enumerate("foo", &Query::default().sorted(Sort::asc("name")))
            .unwrap();
        assert_eq!(names(&items), ["Bar", "Foo"]);
    }

    #[test]
    fn unsorted_is_insertion_order() {
        let items = api_with_foo_bar()
            .enumerate("foo", &Query::default())
            .unwrap();
        assert_eq!(names(&items), ["Foo", "Bar"]);
    }

    #[test]
    fn resource_default_sort() {
        let mut api = Api::default();
        api.add_resource(foo_def().sort(Sort::asc("name"))).unwrap();
        api.create("foo", &json!({ "name": "Foo" })).unwrap();
        api.create("foo", &json!({ "name": "Bar" })).unwrap();

        let items = api.enumerate("foo", &Query::default()).unwrap();
        assert_eq!(names(&items), ["Bar", "Foo"]);
    }

    #[test]
    fn resource_default_sort_must_be_readable() {
        let mut api = Api::default();
        let err = api
            .add_resource(foo_def().sort(Sort::asc("secret")))
            .unwrap_err();
        assert!(matches!(
            &err,
            DefinitionError::InvalidSort { resource, field }
                if resource == "foo" && field == "secret"
        ));
        assert_eq!(err.exit_code(), 2);
        assert!(api.describe("foo").is_err());
    }

    #[test]
    fn items_use_read_projection() {
        let api = foo_api();
        api.create(
            "foo",
            &json!({ "name": "Foo", "secret": "mystery", "slug": "foo" }),
        )
        .unwrap();

        let items = api.enumerate("foo", &Query::default()).unwrap();
        assert_eq!(
            items,
            [json!({ "$uri": "/foo/1", "name": "Foo", "slug": "foo" })]
        );
    }

    #[test]
    fn pages() {
        let api = foo_api();
        for name in ["a", "b", "c"] {
            api.create("foo", &json!({ "name": name })).unwrap();
        }

        let first = api.enumerate("foo", &Query::default().page(1, 2)).unwrap();
        assert_eq!(names(&first), ["a", "b"]);
        let second = api.enumerate("foo", &Query::default().page(2, 2)).unwrap();
        assert_eq!(names(&second), ["c"]);

        let err = api
            .enumerate("foo", &Query::default().page(3, 2))
            .unwrap_err();
        assert!(matches!(err, ApiError::PageNotFound));
        assert_eq!(
            err.to_payload(),
            json!({ "status": 404, "message": "Not Found" })
        );
    }

    #[test]
    fn empty_first_page() {
        let items = foo_api().enumerate("foo", &Query::default()).unwrap();
        assert!(items.is_empty());
    }
}

mod describe {
    use super::*;

    fn link<'a>(doc: &'a Value, rel: &str) -> &'a Value {
        doc["links"]
            .as_array()
            .unwrap()
            .iter()
            .find(|l| l["rel"] == rel)
            .unwrap()
    }

    #[test]
    fn links_cover_every_route() {
        let doc = foo_api().describe("foo").unwrap();
        let rels: Vec<(&str, &str, &str)> = doc["links"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| {
                (
                    l["rel"].as_str().unwrap(),
                    l["method"].as_str().unwrap(),
                    l["href"].as_str().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            rels,
            [
                ("self", "GET", "/foo/{id}"),
                ("instances", "GET", "/foo"),
                ("create", "POST", "/foo"),
                ("update", "PATCH", "/foo/{id}"),
                ("destroy", "DELETE", "/foo/{id}"),
                ("describedBy", "GET", "/foo/schema"),
            ]
        );
    }

    #[test]
    fn update_link_schema_has_updatable_fields_only() {
        let doc = foo_api().describe("foo").unwrap();
        assert_eq!(
            link(&doc, "update")["schema"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "properties": { "name": { "type": "string" } }
            })
        );
    }

    #[test]
    fn inline_references() {
        let mut api = Api::default();
        api.add_resource(
            ResourceDef::new("customer").field(FieldSpec::new("name", FieldType::string())),
        )
        .unwrap();
        api.add_resource(
            ResourceDef::new("node")
                .field(FieldSpec::new("parent", FieldType::inline("self")))
                .field(FieldSpec::new("owner", FieldType::inline("customer"))),
        )
        .unwrap();

        let doc = api.describe("node").unwrap();
        assert_eq!(doc["properties"]["parent"], json!({ "$ref": "#" }));
        assert_eq!(
            doc["properties"]["owner"],
            json!({ "$ref": "/customer/schema" })
        );
        assert_eq!(link(&doc, "create")["schema"], json!({ "$ref": "#" }));
    }

    #[test]
    fn unknown_resource() {
        let err = foo_api().describe("bar").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn shared_api_across_threads() {
        let api = Arc::new(foo_api());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let api = Arc::clone(&api);
                thread::spawn(move || {
                    api.create("foo", &json!({ "name": format!("t{}", i) }))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let items = api
            .enumerate("foo", &Query::default().page(1, 100))
            .unwrap();
        assert_eq!(items.len(), 8);

        let mut uris: Vec<String> = items
            .iter()
            .map(|i| i["$uri"].as_str().unwrap().to_string())
            .collect();
        uris.sort();
        uris.dedup();
        assert_eq!(uris.len(), 8);
    }
}
