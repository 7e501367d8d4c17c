//! Built-in parsers: JSON, YAML, text and binary.

use std::sync::Arc;

use serde_json::Value;

use crate::error::BoxError;
use crate::plugins::{FileInfo, Parser};

const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".htm", ".html", ".md", ".xml", ".js", ".min", ".map", ".css", ".scss", ".less",
    ".svg",
];

const BINARY_EXTENSIONS: &[&str] = &[".jpeg", ".jpg", ".gif", ".png", ".bmp", ".ico"];

/// The default parser list, in order: json, yaml, text, binary.
pub fn default_parsers() -> Vec<Arc<dyn Parser>> {
    vec![
        Arc::new(JsonParser),
        Arc::new(YamlParser),
        Arc::new(TextParser),
        Arc::new(BinaryParser),
    ]
}

/// Parses `.json` files. Blank input yields `null`.
///
/// If the input does not parse, a second attempt starts at the first `{`,
/// which skips byte-order marks and similar leading junk.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn name(&self) -> &str {
        "json"
    }

    fn order(&self) -> i32 {
        100
    }

    fn allow_empty(&self) -> bool {
        true
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        file.extension == ".json"
    }

    fn parse(&self, file: &FileInfo) -> Result<Value, BoxError> {
        let text = String::from_utf8_lossy(&file.data);
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(err) => match text.find('{') {
                Some(idx) if idx > 0 => Ok(serde_json::from_str(&text[idx..])?),
                _ => Err(err.into()),
            },
        }
    }
}

/// Parses `.yaml`, `.yml` and `.json` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

impl Parser for YamlParser {
    fn name(&self) -> &str {
        "yaml"
    }

    fn order(&self) -> i32 {
        200
    }

    fn allow_empty(&self) -> bool {
        true
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        matches!(file.extension.as_str(), ".yaml" | ".yml" | ".json")
    }

    fn parse(&self, file: &FileInfo) -> Result<Value, BoxError> {
        let text = String::from_utf8_lossy(&file.data);
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: serde_yaml::Value = serde_yaml::from_str(&text)?;
        yaml_to_json(value)
    }
}

/// Converts YAML into JSON, stringifying scalar mapping keys such as the
/// `200:` of an OpenAPI `responses` object.
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, BoxError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut object = serde_json::Map::new();
            for (key, v) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    other => return Err(format!("unsupported mapping key: {:?}", other).into()),
                };
                object.insert(key, yaml_to_json(v)?);
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// Reads text-like files into a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParser;

impl Parser for TextParser {
    fn name(&self) -> &str {
        "text"
    }

    fn order(&self) -> i32 {
        300
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        TEXT_EXTENSIONS.contains(&file.extension.as_str())
    }

    fn parse(&self, file: &FileInfo) -> Result<Value, BoxError> {
        Ok(Value::String(String::from_utf8_lossy(&file.data).into_owned()))
    }
}

/// Keeps image files as an array of byte values.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryParser;

impl Parser for BinaryParser {
    fn name(&self) -> &str {
        "binary"
    }

    fn order(&self) -> i32 {
        400
    }

    fn allow_empty(&self) -> bool {
        true
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        BINARY_EXTENSIONS.contains(&file.extension.as_str())
    }

    fn parse(&self, file: &FileInfo) -> Result<Value, BoxError> {
        Ok(Value::Array(
            file.data.iter().map(|b| Value::from(*b)).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file(name: &str, data: &str) -> FileInfo {
        let mut info = FileInfo::new(name);
        info.data = data.as_bytes().to_vec();
        info
    }

    #[test]
    fn json_valid() {
        let value = JsonParser.parse(&file("/a.json", r#"{"type": "object"}"#)).unwrap();
        assert_eq!(value, json!({"type": "object"}));
    }

    #[test]
    fn json_blank_is_null() {
        assert_eq!(JsonParser.parse(&file("/a.json", "  \n")).unwrap(), Value::Null);
    }

    #[test]
    fn json_skips_leading_junk() {
        let value = JsonParser
            .parse(&file("/a.json", "\u{feff}{\"a\": 1}"))
            .unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn json_invalid() {
        assert!(JsonParser.parse(&file("/a.json", "not valid json")).is_err());
    }

    #[test]
    fn yaml_valid() {
        let value = YamlParser
            .parse(&file("/a.yaml", "type: object\nproperties:\n  id:\n    $ref: '#/defs/id'\n"))
            .unwrap();
        assert_eq!(
            value,
            json!({"type": "object", "properties": {"id": {"$ref": "#/defs/id"}}})
        );
    }

    #[test]
    fn yaml_numeric_keys_become_strings() {
        let value = YamlParser
            .parse(&file("/a.yaml", "responses:\n  200:\n    description: ok\n"))
            .unwrap();
        assert_eq!(value, json!({"responses": {"200": {"description": "ok"}}}));
    }

    #[test]
    fn yaml_matches_json_files_too() {
        assert!(YamlParser.can_parse(&FileInfo::new("/a.json")));
        assert!(YamlParser.can_parse(&FileInfo::new("/a.yml")));
        assert!(!YamlParser.can_parse(&FileInfo::new("/a.txt")));
    }

    #[test]
    fn text_and_binary() {
        assert!(TextParser.can_parse(&FileInfo::new("/readme.md")));
        assert_eq!(
            TextParser.parse(&file("/readme.md", "# hi")).unwrap(),
            json!("# hi")
        );
        assert!(BinaryParser.can_parse(&FileInfo::new("/logo.PNG")));
        assert!(!BinaryParser.can_parse(&FileInfo::new("/a.json")));
        assert_eq!(
            BinaryParser.parse(&file("/blob.bin", "AB")).unwrap(),
            json!([65, 66])
        );
    }
}
