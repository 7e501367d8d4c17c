//! Integration tests for dereferencing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use schema_refs::{dereference, CircularPolicy, ErrorKind, Options, RefError, Source};
use tempfile::TempDir;

fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn source(path: &Path) -> Source {
    Source::Path(path.to_string_lossy().into_owned())
}

fn has_ref(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("$ref") || map.values().any(has_ref),
        Value::Array(items) => items.iter().any(has_ref),
        _ => false,
    }
}

// === Acyclic Documents ===

mod acyclic {
    use super::*;

    #[tokio::test]
    async fn leaves_no_refs_behind() {
        let dir = TempDir::new().unwrap();
        let root = write_temp_file(
            &dir,
            "api.yaml",
            "openapi: 3.0.0\n\
             paths:\n  /pets:\n    get:\n      responses:\n        '200':\n          schema:\n            $ref: '#/components/schemas/Pets'\n\
             components:\n  schemas:\n    Pets:\n      type: array\n      items:\n        $ref: schemas/pet.yaml\n",
        );
        write_temp_file(
            &dir,
            "schemas/pet.yaml",
            "type: object\nproperties:\n  id:\n    $ref: common.json#/Id\n  name:\n    type: string\n",
        );
        write_temp_file(&dir, "schemas/common.json", r#"{"Id": {"type": "integer", "format": "int64"}}"#);

        let document = dereference(source(&root), &Options::new()).await.unwrap();
        assert!(!document.circular());
        assert!(!document.is_cyclic());

        let value = document.to_value().unwrap();
        assert!(!has_ref(&value));
        assert_eq!(
            value["paths"]["/pets"]["get"]["responses"]["200"]["schema"]["items"]["properties"]["id"],
            json!({"type": "integer", "format": "int64"})
        );
    }

    #[tokio::test]
    async fn shared_targets_share_nodes() {
        let dir = TempDir::new().unwrap();
        let root = write_temp_file(
            &dir,
            "root.json",
            r#"{"a": {"$ref": "other.json#/x"}, "b": {"$ref": "other.json#/x"}}"#,
        );
        write_temp_file(&dir, "other.json", r#"{"x": {"value": 42}}"#);

        let document = dereference(source(&root), &Options::new()).await.unwrap();
        assert_eq!(
            document.to_value().unwrap(),
            json!({"a": {"value": 42}, "b": {"value": 42}})
        );
        assert_eq!(document.get("#/a").unwrap(), document.get("#/b").unwrap());
    }

    #[tokio::test]
    async fn extended_refs_keep_their_own_keys() {
        let dir = TempDir::new().unwrap();
        let root = write_temp_file(
            &dir,
            "root.json",
            r#"{"pet": {"$ref": "pet.json", "description": "a pet", "required": ["id"]}}"#,
        );
        write_temp_file(
            &dir,
            "pet.json",
            r#"{"type": "object", "description": "generic", "properties": {"id": {"type": "integer"}}}"#,
        );

        let value = dereference(source(&root), &Options::new())
            .await
            .unwrap()
            .to_value()
            .unwrap();
        assert_eq!(
            value,
            json!({"pet": {
                "type": "object",
                "description": "a pet",
                "required": ["id"],
                "properties": {"id": {"type": "integer"}}
            }})
        );
    }

    #[tokio::test]
    async fn hook_sees_every_substitution() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let options = Options::new().on_dereference(move |reference, path| {
            recorder
                .lock()
                .unwrap()
                .push((reference.to_string(), path.to_string()));
        });

        let doc = json!({
            "definitions": {"id": {"type": "string"}},
            "properties": {"a": {"$ref": "#/definitions/id"}, "b": {"$ref": "#/definitions/id"}}
        });
        dereference(Source::Value(doc), &options).await.unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("#/definitions/id".to_string(), "#/properties/a".to_string()),
                ("#/definitions/id".to_string(), "#/properties/b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn excluded_paths_keep_their_refs() {
        let options = Options::new().exclude_dereference_paths(|p| p.starts_with("#/x-raw"));
        let doc = json!({
            "defs": {"n": {"type": "number"}},
            "x-raw": {"keep": {"$ref": "#/defs/n"}},
            "use": {"$ref": "#/defs/n"}
        });

        let value = dereference(Source::Value(doc), &options)
            .await
            .unwrap()
            .to_value()
            .unwrap();
        assert_eq!(value["x-raw"]["keep"], json!({"$ref": "#/defs/n"}));
        assert_eq!(value["use"], json!({"type": "number"}));
    }

    #[tokio::test]
    async fn value_at_follows_refs() {
        let dir = TempDir::new().unwrap();
        let root = write_temp_file(&dir, "root.json", r#"{"a": {"$ref": "other.json#/x"}}"#);
        write_temp_file(&dir, "other.json", r#"{"x": {"deep": {"n": 7}}}"#);

        let mut document = dereference(source(&root), &Options::new()).await.unwrap();
        assert_eq!(
            document.value_at("#/a/deep", &Options::new()).unwrap(),
            json!({"n": 7})
        );
    }
}

// === Circular References ===

mod circular {
    use super::*;

    fn self_reference() -> Source {
        Source::Value(json!({"foo": {"$ref": "#/foo"}}))
    }

    #[tokio::test]
    async fn direct_self_reference_allowed() {
        let document = dereference(self_reference(), &Options::new()).await.unwrap();
        assert!(document.circular());
        assert_eq!(
            document.to_value().unwrap(),
            json!({"foo": {"$ref": "#/foo"}})
        );
    }

    #[tokio::test]
    async fn direct_self_reference_ignored() {
        let options = Options::new().circular(CircularPolicy::Ignore);
        let document = dereference(self_reference(), &options).await.unwrap();
        assert!(document.circular());
        assert_eq!(
            document.to_value().unwrap(),
            json!({"foo": {"$ref": "#/foo"}})
        );
    }

    #[tokio::test]
    async fn direct_self_reference_rejected() {
        let options = Options::new().circular(CircularPolicy::Error);
        let err = dereference(self_reference(), &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Circular);
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn cross_file_cycle_under_each_policy() {
        let dir = TempDir::new().unwrap();
        let root = write_temp_file(&dir, "root.json", r#"{"node": {"$ref": "node.json"}}"#);
        write_temp_file(
            &dir,
            "node.json",
            r#"{"type": "object", "properties": {"next": {"$ref": "node.json"}}}"#,
        );

        let document = dereference(source(&root), &Options::new()).await.unwrap();
        assert!(document.circular());
        assert!(document.is_cyclic());
        let err = document.to_value().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicValue);

        let node = document.get("#/node").unwrap();
        assert_eq!(document.get("#/node/properties/next").unwrap(), node);

        let ignore = Options::new().circular(CircularPolicy::Ignore);
        let document = dereference(source(&root), &ignore).await.unwrap();
        assert!(document.circular());
        assert_eq!(
            document.to_value().unwrap(),
            json!({"node": {"$ref": "node.json"}})
        );

        let error = Options::new().circular(CircularPolicy::Error);
        let err = dereference(source(&root), &error).await.unwrap_err();
        assert!(matches!(err, RefError::Circular { .. }));
    }
}

// === Errors ===

mod errors {
    use super::*;

    #[tokio::test]
    async fn missing_pointer_names_the_token() {
        let err = dereference(
            Source::Value(json!({"$ref": "#/does/not/exist"})),
            &Options::new(),
        )
        .await
        .unwrap_err();
        match err {
            RefError::MissingPointer { token, pointer } => {
                assert_eq!(token, "does");
                assert_eq!(pointer, "#/does/not/exist");
            }
            other => panic!("expected missing pointer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn continue_on_error_collects_everything() {
        let dir = TempDir::new().unwrap();
        let root = write_temp_file(
            &dir,
            "root.json",
            r##"{"a": {"$ref": "#/missing"}, "b": {"$ref": "nope.json"}, "c": {"$ref": "#/d"}, "d": 1}"##,
        );

        let options = Options::new().continue_on_error(true);
        let err = dereference(source(&root), &options).await.unwrap_err();

        let mut kinds: Vec<ErrorKind> = err.errors().iter().map(|e| e.kind()).collect();
        kinds.sort_by_key(|k| format!("{:?}", k));
        assert_eq!(kinds, vec![ErrorKind::MissingPointer, ErrorKind::Resolver]);
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn depth_limit_is_enforced() {
        let doc = json!({"a": {"b": {"c": {"d": {"e": {"$ref": "#/a"}}}}}});
        let err = dereference(Source::Value(doc), &Options::new().max_depth(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DepthExceeded);
    }
}
