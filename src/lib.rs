//! JSON Reference Resolver
//!
//! Resolution, bundling and dereferencing of `$ref` pointers in JSON and
//! YAML documents.
//!
//! A root document may point at other places in itself (`#/definitions/pet`)
//! or at other files and URLs (`pet.yaml#/Pet`). This library fetches every
//! referenced file once, follows pointer chains including circular ones, and
//! either inlines everything into one self-contained document ([`bundle`])
//! or replaces every reference with its value ([`dereference`]).
//!
//! # Example
//!
//! ```
//! use schema_refs::{dereference, Options, Source};
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let schema = json!({
//!     "definitions": { "id": { "type": "string" } },
//!     "properties": { "id": { "$ref": "#/definitions/id" } }
//! });
//!
//! let document = dereference(Source::Value(schema), &Options::new()).await.unwrap();
//! let value = document.to_value().unwrap();
//!
//! assert_eq!(value["properties"]["id"], json!({ "type": "string" }));
//! # });
//! ```
//!
//! # Circular References
//!
//! | Policy | Effect of a circular `$ref` when dereferencing |
//! |--------|------------------------------------------------|
//! | `true` (default) | Substituted; the result may be a cyclic graph |
//! | `false` | `RefError::Circular` |
//! | `"ignore"` | Left as a `$ref` |
//!
//! A cyclic result cannot become a plain value: [`Document::to_value`]
//! fails with `RefError::CyclicValue`, and [`Document::is_cyclic`] tells
//! beforehand.
//!
//! # Plugins
//!
//! Files are read by [`Resolver`]s and decoded by [`Parser`]s, both passed
//! in [`Options`]. The defaults read local files and HTTP(S) URLs (with the
//! `remote` feature) and decode JSON, YAML, text and binary content.

mod bundle;
mod config;
mod dereference;
mod document;
mod error;
mod external;
mod loader;
mod locator;
mod node;
mod operations;
mod options;
mod parse;
mod parsers;
mod plugins;
mod pointer;
mod refs;

pub use config::{
    BundleSettings, DereferenceSettings, HttpSetting, HttpSettings, ParseSettings,
    ResolveSettings, Settings,
};
pub use document::Document;
pub use error::{BoxError, ErrorKind, RefError, Result};
pub use loader::{default_resolvers, FileResolver, LoadError};
pub use locator::{
    cwd, from_file_system_path, get_extension, get_hash, get_protocol, is_file_system_path,
    is_http, resolve as resolve_url, strip_hash, strip_query, to_file_system_path,
};
pub use node::{Arena, Members, Node, NodeId, REF_KEY};
pub use operations::{bundle, dereference, parse, resolve};
pub use options::{
    BundleOptions, CircularPolicy, DereferenceHook, DereferenceOptions, Options, ParseOptions,
    PathMatcher, ResolveOptions, DEFAULT_MAX_DEPTH,
};
pub use parse::{absolute_locator, Source};
pub use parsers::{default_parsers, BinaryParser, JsonParser, TextParser, YamlParser};
pub use plugins::{Candidates, FileInfo, Parser, Resolver};
pub use pointer::{join_pointer, parse_pointer, Resolution};
pub use refs::{FileRecord, PathType, Refs};

#[cfg(feature = "remote")]
pub use loader::{HttpResolver, HTTP_REDIRECTS, HTTP_TIMEOUT};
