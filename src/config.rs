//! Settings files.
//!
//! A settings file is YAML or JSON (chosen by extension) with camelCase
//! keys mirroring [`Options`]:
//!
//! ```yaml
//! continueOnError: true
//! resolve:
//!   http:
//!     timeout: 5000
//!     headers: { Authorization: "Bearer abc" }
//! dereference:
//!   circular: ignore
//!   excludedPaths: ["#/x-internal"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::RefError;
use crate::locator::get_extension;
use crate::options::{CircularPolicy, Options};

/// Top-level settings. Every field is optional; missing fields keep the
/// defaults of [`Options::new`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Settings {
    pub continue_on_error: Option<bool>,
    pub max_depth: Option<usize>,
    pub resolve: ResolveSettings,
    pub parse: ParseSettings,
    pub dereference: DereferenceSettings,
    pub bundle: BundleSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ResolveSettings {
    pub external: Option<bool>,
    /// `false` removes the file resolver.
    pub file: Option<bool>,
    pub http: Option<HttpSetting>,
}

/// `http: false` or a table of HTTP settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HttpSetting {
    Enabled(bool),
    Configured(HttpSettings),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HttpSettings {
    /// Milliseconds.
    pub timeout: Option<u64>,
    pub redirects: Option<usize>,
    pub headers: BTreeMap<String, String>,
}

/// `false` removes the parser of that name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParseSettings {
    pub json: Option<bool>,
    pub yaml: Option<bool>,
    pub text: Option<bool>,
    pub binary: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DereferenceSettings {
    pub circular: Option<CircularPolicy>,
    pub excluded_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BundleSettings {
    pub excluded_paths: Vec<String>,
}

impl Settings {
    /// Load settings from a `.json`, `.yaml` or `.yml` file.
    ///
    /// # Errors
    ///
    /// `RefError::Resolver` if the file cannot be read,
    /// `RefError::InvalidOption` if it does not describe valid settings.
    pub fn load(path: &Path) -> Result<Self, RefError> {
        let text = std::fs::read_to_string(path).map_err(|source| RefError::Resolver {
            locator: path.display().to_string(),
            source: Box::new(source),
        })?;
        let json = get_extension(&path.to_string_lossy()) == ".json";
        Self::parse(&text, json)
    }

    /// Parse settings text as JSON or YAML.
    pub fn parse(text: &str, json: bool) -> Result<Self, RefError> {
        let invalid = |message: String| RefError::InvalidOption { message };
        if json {
            serde_json::from_str(text).map_err(|e| invalid(e.to_string()))
        } else if text.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))
        }
    }

    /// Apply these settings on top of the default options.
    pub fn into_options(self) -> Result<Options, RefError> {
        self.apply(Options::new())
    }

    /// Apply these settings on top of `options`.
    pub fn apply(self, mut options: Options) -> Result<Options, RefError> {
        if let Some(continue_on_error) = self.continue_on_error {
            options = options.continue_on_error(continue_on_error);
        }
        if let Some(max_depth) = self.max_depth {
            if max_depth == 0 {
                return Err(RefError::InvalidOption {
                    message: "maxDepth must be greater than zero".into(),
                });
            }
            options = options.max_depth(max_depth);
        }

        if let Some(external) = self.resolve.external {
            options = options.external(external);
        }
        if self.resolve.file == Some(false) {
            options = options.without_resolver("file");
        }
        match self.resolve.http {
            None | Some(HttpSetting::Enabled(true)) => {}
            Some(HttpSetting::Enabled(false)) => options = options.without_resolver("http"),
            Some(HttpSetting::Configured(http)) => options = with_http(options, http)?,
        }

        for (name, enabled) in [
            ("json", self.parse.json),
            ("yaml", self.parse.yaml),
            ("text", self.parse.text),
            ("binary", self.parse.binary),
        ] {
            if enabled == Some(false) {
                options = options.without_parser(name);
            }
        }

        if let Some(circular) = self.dereference.circular {
            options = options.circular(circular);
        }
        if !self.dereference.excluded_paths.is_empty() {
            let paths = self.dereference.excluded_paths;
            options = options.exclude_dereference_paths(move |p| matches_any(&paths, p));
        }
        if !self.bundle.excluded_paths.is_empty() {
            let paths = self.bundle.excluded_paths;
            options = options.exclude_bundle_paths(move |p| matches_any(&paths, p));
        }

        Ok(options)
    }
}

#[cfg(feature = "remote")]
fn with_http(options: Options, http: HttpSettings) -> Result<Options, RefError> {
    use std::sync::Arc;
    use std::time::Duration;

    let mut resolver = crate::loader::HttpResolver::new();
    if let Some(timeout) = http.timeout {
        resolver = resolver.timeout(Duration::from_millis(timeout));
    }
    if let Some(redirects) = http.redirects {
        resolver = resolver.redirects(redirects);
    }
    for (name, value) in http.headers {
        resolver = resolver.header(name, value);
    }
    Ok(options.with_resolver(Arc::new(resolver)))
}

#[cfg(not(feature = "remote"))]
fn with_http(_options: Options, _http: HttpSettings) -> Result<Options, RefError> {
    Err(RefError::InvalidOption {
        message: "resolve.http requires the `remote` feature".into(),
    })
}

/// A path matches an excluded path equal to it or to one of its ancestors.
fn matches_any(excluded: &[String], path: &str) -> bool {
    excluded.iter().any(|e| {
        path == e
            || path
                .strip_prefix(e.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_settings_are_defaults() {
        let settings = Settings::parse("", false).unwrap();
        assert_eq!(settings, Settings::default());
        let options = settings.into_options().unwrap();
        assert!(options.resolve.external);
        assert_eq!(options.dereference.circular, CircularPolicy::Allow);
    }

    #[test]
    fn yaml_settings() {
        let settings = Settings::parse(
            r##"
continueOnError: true
maxDepth: 64
resolve:
  external: false
  http: false
parse:
  binary: false
dereference:
  circular: ignore
  excludedPaths: ["#/x-internal"]
"##,
            false,
        )
        .unwrap();
        let options = settings.into_options().unwrap();

        assert!(options.continue_on_error);
        assert_eq!(options.max_depth, 64);
        assert!(!options.resolve.external);
        assert!(options.resolve.resolvers.iter().all(|r| r.name() != "http"));
        assert!(options.parse.parsers.iter().all(|p| p.name() != "binary"));
        assert_eq!(options.dereference.circular, CircularPolicy::Ignore);
        assert!(options.is_excluded_from_dereference("#/x-internal"));
        assert!(options.is_excluded_from_dereference("#/x-internal/a"));
        assert!(!options.is_excluded_from_dereference("#/x-internals"));
    }

    #[test]
    fn json_settings_with_boolean_circular() {
        let settings = Settings::parse(r#"{"dereference": {"circular": false}}"#, true).unwrap();
        assert_eq!(settings.dereference.circular, Some(CircularPolicy::Error));
    }

    #[test]
    fn malformed_circular_is_invalid_option() {
        let err = Settings::parse("dereference:\n  circular: sometimes\n", false).unwrap_err();
        assert!(matches!(err, RefError::InvalidOption { .. }));
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Settings::parse("contineOnError: true\n", false),
            Err(RefError::InvalidOption { .. })
        ));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn http_table_replaces_http_resolver() {
        let settings = Settings::parse(
            "resolve:\n  http:\n    timeout: 1500\n    headers:\n      Authorization: Bearer x\n",
            false,
        )
        .unwrap();
        let options = settings.into_options().unwrap();
        let http: Vec<_> = options
            .resolve
            .resolvers
            .iter()
            .filter(|r| r.name() == "http")
            .collect();
        assert_eq!(http.len(), 1);
    }

    #[test]
    fn load_picks_format_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"maxDepth": 10}}"#).unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.max_depth, Some(10));

        let err = Settings::load(Path::new("/nonexistent/settings.yaml")).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
