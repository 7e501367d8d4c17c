//! Options controlling parsing, resolution, bundling and dereferencing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::error::RefError;
use crate::loader::default_resolvers;
use crate::parsers::default_parsers;
use crate::plugins::{Parser, Resolver};

/// Default limit on walk depth and reference chain length.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Predicate over a JSON Pointer path from the root (`#/paths/~1pets`).
pub type PathMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Hook called after a reference has been substituted, with the original
/// `$ref` string and the path from the root where it was found.
pub type DereferenceHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// What dereferencing does when it meets a circular reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CircularPolicy {
    /// Substitute anyway; the result is a cyclic node graph (`true`).
    #[default]
    Allow,
    /// Fail with `RefError::Circular` (`false`).
    Error,
    /// Leave circular `$ref` nodes unsubstituted (`"ignore"`).
    Ignore,
}

impl FromStr for CircularPolicy {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(CircularPolicy::Allow),
            "false" => Ok(CircularPolicy::Error),
            "ignore" => Ok(CircularPolicy::Ignore),
            other => Err(RefError::InvalidOption {
                message: format!(
                    "dereference.circular must be true, false or \"ignore\", got \"{}\"",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for CircularPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircularPolicy::Allow => f.write_str("true"),
            CircularPolicy::Error => f.write_str("false"),
            CircularPolicy::Ignore => f.write_str("ignore"),
        }
    }
}

impl<'de> Deserialize<'de> for CircularPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(CircularPolicy::Allow),
            Raw::Flag(false) => Ok(CircularPolicy::Error),
            Raw::Word(word) => word.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Parser plugins, tried by ascending order.
#[derive(Clone)]
pub struct ParseOptions {
    pub parsers: Vec<Arc<dyn Parser>>,
}

/// Resolver plugins and external reference handling.
#[derive(Clone)]
pub struct ResolveOptions {
    /// When false, no external file is ever fetched and external `$ref`s
    /// are left untouched everywhere.
    pub external: bool,
    pub resolvers: Vec<Arc<dyn Resolver>>,
}

#[derive(Clone, Default)]
pub struct DereferenceOptions {
    pub circular: CircularPolicy,
    /// Paths from the root that are left exactly as they are.
    pub excluded_paths: Option<PathMatcher>,
    pub on_dereference: Option<DereferenceHook>,
}

#[derive(Clone, Default)]
pub struct BundleOptions {
    /// Paths from the root whose references are not bundled.
    pub excluded_paths: Option<PathMatcher>,
}

/// Options for every top-level operation.
///
/// Plugins are plain values passed per call; nothing is registered globally.
#[derive(Clone)]
pub struct Options {
    pub parse: ParseOptions,
    pub resolve: ResolveOptions,
    pub dereference: DereferenceOptions,
    pub bundle: BundleOptions,
    /// Record recoverable errors on their file and report them all at the
    /// end instead of failing on the first one.
    pub continue_on_error: bool,
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            parse: ParseOptions {
                parsers: default_parsers(),
            },
            resolve: ResolveOptions {
                external: true,
                resolvers: default_resolvers(),
            },
            dereference: DereferenceOptions::default(),
            bundle: BundleOptions::default(),
            continue_on_error: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parsers: Vec<&str> = self.parse.parsers.iter().map(|p| p.name()).collect();
        let resolvers: Vec<&str> = self.resolve.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("Options")
            .field("parsers", &parsers)
            .field("resolvers", &resolvers)
            .field("external", &self.resolve.external)
            .field("circular", &self.dereference.circular)
            .field("continue_on_error", &self.continue_on_error)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Options {
    /// Default plugins, external resolution on, fail fast, circular allowed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Enable or disable fetching of external files.
    pub fn external(mut self, external: bool) -> Self {
        self.resolve.external = external;
        self
    }

    pub fn circular(mut self, policy: CircularPolicy) -> Self {
        self.dereference.circular = policy;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Add a resolver, replacing any existing one with the same name.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolve.resolvers.retain(|r| r.name() != resolver.name());
        self.resolve.resolvers.push(resolver);
        self
    }

    pub fn without_resolver(mut self, name: &str) -> Self {
        self.resolve.resolvers.retain(|r| r.name() != name);
        self
    }

    /// Add a parser, replacing any existing one with the same name.
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parse.parsers.retain(|p| p.name() != parser.name());
        self.parse.parsers.push(parser);
        self
    }

    pub fn without_parser(mut self, name: &str) -> Self {
        self.parse.parsers.retain(|p| p.name() != name);
        self
    }

    pub fn exclude_dereference_paths<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.dereference.excluded_paths = Some(Arc::new(matcher));
        self
    }

    pub fn exclude_bundle_paths<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.bundle.excluded_paths = Some(Arc::new(matcher));
        self
    }

    pub fn on_dereference<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.dereference.on_dereference = Some(Arc::new(hook));
        self
    }

    /// Whether a `$ref` string takes part in resolution at all.
    ///
    /// Internal references always do; external ones only when external
    /// resolution is enabled.
    pub fn is_allowed_ref(&self, reference: &str) -> bool {
        reference.starts_with('#') || self.resolve.external
    }

    pub(crate) fn is_excluded_from_dereference(&self, path_from_root: &str) -> bool {
        self.dereference
            .excluded_paths
            .as_ref()
            .is_some_and(|matcher| matcher(path_from_root))
    }

    pub(crate) fn is_excluded_from_bundle(&self, path_from_root: &str) -> bool {
        self.bundle
            .excluded_paths
            .as_ref()
            .is_some_and(|matcher| matcher(path_from_root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Options::new();
        assert!(opts.resolve.external);
        assert!(!opts.continue_on_error);
        assert_eq!(opts.dereference.circular, CircularPolicy::Allow);
        assert_eq!(opts.max_depth, DEFAULT_MAX_DEPTH);

        let parsers: Vec<&str> = opts.parse.parsers.iter().map(|p| p.name()).collect();
        assert_eq!(parsers, vec!["json", "yaml", "text", "binary"]);
        let resolvers: Vec<&str> = opts.resolve.resolvers.iter().map(|r| r.name()).collect();
        assert!(resolvers.contains(&"file"));
    }

    #[test]
    fn builder_removes_plugins() {
        let opts = Options::new()
            .without_parser("binary")
            .without_resolver("file")
            .continue_on_error(true)
            .external(false);
        assert!(opts.parse.parsers.iter().all(|p| p.name() != "binary"));
        assert!(opts.resolve.resolvers.iter().all(|r| r.name() != "file"));
        assert!(opts.continue_on_error);
        assert!(!opts.is_allowed_ref("other.json#/a"));
        assert!(opts.is_allowed_ref("#/a"));
    }

    #[test]
    fn circular_policy_from_str() {
        assert_eq!("true".parse::<CircularPolicy>().unwrap(), CircularPolicy::Allow);
        assert_eq!("false".parse::<CircularPolicy>().unwrap(), CircularPolicy::Error);
        assert_eq!("Ignore".parse::<CircularPolicy>().unwrap(), CircularPolicy::Ignore);
        assert!(matches!(
            "sometimes".parse::<CircularPolicy>(),
            Err(RefError::InvalidOption { .. })
        ));
    }

    #[test]
    fn circular_policy_deserialize() {
        let policy: CircularPolicy = serde_json::from_str("true").unwrap();
        assert_eq!(policy, CircularPolicy::Allow);
        let policy: CircularPolicy = serde_json::from_str("false").unwrap();
        assert_eq!(policy, CircularPolicy::Error);
        let policy: CircularPolicy = serde_json::from_str("\"ignore\"").unwrap();
        assert_eq!(policy, CircularPolicy::Ignore);
        assert!(serde_json::from_str::<CircularPolicy>("\"maybe\"").is_err());
        assert!(serde_json::from_str::<CircularPolicy>("3").is_err());
    }

    #[test]
    fn exclusion_matchers() {
        let opts = Options::new()
            .exclude_dereference_paths(|p| p.starts_with("#/x-internal"))
            .exclude_bundle_paths(|p| p == "#/keep");
        assert!(opts.is_excluded_from_dereference("#/x-internal/a"));
        assert!(!opts.is_excluded_from_dereference("#/paths"));
        assert!(opts.is_excluded_from_bundle("#/keep"));
    }
}
