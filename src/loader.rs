//! Built-in resolvers: local files and HTTP(S) URLs.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::error::BoxError;
use crate::locator::{is_file_system_path, to_file_system_path};
use crate::plugins::{FileInfo, Resolver};

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (60 seconds).
#[cfg(feature = "remote")]
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of HTTP redirects followed.
#[cfg(feature = "remote")]
pub const HTTP_REDIRECTS: usize = 5;

/// Errors raised by the built-in resolvers.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[cfg(feature = "remote")]
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },
}

/// The default resolver list: `file`, plus `http` with the `remote` feature.
pub fn default_resolvers() -> Vec<Arc<dyn Resolver>> {
    #[allow(unused_mut)]
    let mut resolvers: Vec<Arc<dyn Resolver>> = vec![Arc::new(FileResolver)];
    #[cfg(feature = "remote")]
    resolvers.push(Arc::new(HttpResolver::default()));
    resolvers
}

/// Reads locators that point at the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResolver;

#[async_trait]
impl Resolver for FileResolver {
    fn name(&self) -> &str {
        "file"
    }

    fn order(&self) -> i32 {
        100
    }

    fn can_read(&self, file: &FileInfo) -> bool {
        is_file_system_path(&file.url)
    }

    async fn read(&self, file: &FileInfo) -> Result<Vec<u8>, BoxError> {
        let path = PathBuf::from(to_file_system_path(&file.url));
        debug!(path = %path.display(), "reading file");

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(Box::new(LoadError::FileNotFound { path }))
            }
            Err(source) => Err(Box::new(LoadError::ReadError { path, source })),
        }
    }
}

/// Fetches `http://` and `https://` locators.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpResolver {
    /// Extra request headers, e.g. `Authorization`.
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Maximum number of redirects followed; 0 disables redirects.
    pub redirects: usize,
}

#[cfg(feature = "remote")]
impl Default for HttpResolver {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            timeout: HTTP_TIMEOUT,
            redirects: HTTP_REDIRECTS,
        }
    }
}

#[cfg(feature = "remote")]
impl HttpResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn redirects(mut self, redirects: usize) -> Self {
        self.redirects = redirects;
        self
    }

    fn client(&self) -> reqwest::Result<reqwest::Client> {
        let policy = if self.redirects == 0 {
            reqwest::redirect::Policy::none()
        } else {
            reqwest::redirect::Policy::limited(self.redirects)
        };
        reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(policy)
            .user_agent(concat!("schema-refs/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

#[cfg(feature = "remote")]
#[async_trait]
impl Resolver for HttpResolver {
    fn name(&self) -> &str {
        "http"
    }

    fn order(&self) -> i32 {
        200
    }

    fn can_read(&self, file: &FileInfo) -> bool {
        crate::locator::is_http(&file.url)
    }

    async fn read(&self, file: &FileInfo) -> Result<Vec<u8>, BoxError> {
        let url = file.url.clone();
        let network = |source| LoadError::NetworkError {
            url: url.clone(),
            source,
        };
        debug!(url = %url, "fetching");

        let client = self.client().map_err(network)?;
        let mut request = client.get(&url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(network)?;

        // Check for HTTP errors before reading the body
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Box::new(LoadError::HttpStatus {
                url,
                status: status.as_u16(),
            }));
        }

        let body = response.bytes().await.map_err(network)?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::locator::from_file_system_path;

    fn info_for(path: &std::path::Path) -> FileInfo {
        FileInfo::new(&from_file_system_path(&path.to_string_lossy()))
    }

    #[tokio::test]
    async fn read_existing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "object"}}"#).unwrap();

        let data = FileResolver.read(&info_for(file.path())).await.unwrap();
        assert!(String::from_utf8(data).unwrap().contains("object"));
    }

    #[tokio::test]
    async fn read_missing_file() {
        let err = FileResolver
            .read(&FileInfo::new("/nonexistent/path.json"))
            .await
            .unwrap_err();
        let err = err.downcast::<LoadError>().unwrap();
        assert!(matches!(*err, LoadError::FileNotFound { .. }));
    }

    #[test]
    fn file_resolver_matches_paths_only() {
        assert!(FileResolver.can_read(&FileInfo::new("/a/b.json")));
        assert!(FileResolver.can_read(&FileInfo::new("file:///a/b.json")));
        assert!(!FileResolver.can_read(&FileInfo::new("https://x.org/b.json")));
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[tokio::test]
        async fn fetches_body_with_headers() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/schemas/pet.json")
                .match_header("authorization", "Bearer secret")
                .with_status(200)
                .with_body(r#"{"type": "object"}"#)
                .create_async()
                .await;

            let resolver = HttpResolver::new().header("Authorization", "Bearer secret");
            let url = format!("{}/schemas/pet.json", server.url());
            let data = resolver.read(&FileInfo::new(&url)).await.unwrap();

            assert_eq!(data, br#"{"type": "object"}"#.to_vec());
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn http_error_status() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/missing.json")
                .with_status(404)
                .create_async()
                .await;

            let url = format!("{}/missing.json", server.url());
            let err = HttpResolver::new()
                .read(&FileInfo::new(&url))
                .await
                .unwrap_err();
            let err = err.downcast::<LoadError>().unwrap();
            assert!(matches!(*err, LoadError::HttpStatus { status: 404, .. }));
        }

        #[test]
        fn http_resolver_matches_urls_only() {
            let resolver = HttpResolver::new();
            assert!(resolver.can_read(&FileInfo::new("https://x.org/a.json")));
            assert!(!resolver.can_read(&FileInfo::new("/a.json")));
        }
    }
}
