//! Locator utilities: URL-style resolution of file paths and URLs.
//!
//! Filesystem locators are plain absolute POSIX-style paths
//! (`/home/me/api/schema.json`), while remote locators are full URLs
//! (`https://example.com/schema.json`). Both may carry a `#` fragment
//! holding a JSON Pointer.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Synthetic base used to resolve scheme-less paths with URL semantics.
const RESOLVE_BASE: &str = "resolve:///";
const RESOLVE_SCHEME: &str = "resolve";

/// Returns the current working directory as a locator ending in `/`.
pub fn cwd() -> String {
    let dir = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/".to_string());
    let mut locator = from_file_system_path(&dir);
    if !locator.ends_with('/') {
        locator.push('/');
    }
    locator
}

/// Resolve `to` against `from` the way a browser resolves a link.
///
/// Scheme-less bases are treated as absolute paths and the result is
/// returned without a scheme. If resolution fails `to` is returned as-is.
pub fn resolve(from: &str, to: &str) -> String {
    let base = match Url::parse(RESOLVE_BASE).and_then(|root| root.join(from)) {
        Ok(base) => base,
        Err(_) => return to.to_string(),
    };

    match base.join(to) {
        Ok(resolved) if resolved.scheme() == RESOLVE_SCHEME => {
            let mut out = resolved.path().to_string();
            if let Some(query) = resolved.query() {
                out.push('?');
                out.push_str(query);
            }
            if let Some(fragment) = resolved.fragment() {
                out.push('#');
                out.push_str(fragment);
            }
            out
        }
        Ok(resolved) => resolved.to_string(),
        Err(_) => to.to_string(),
    }
}

/// Returns the lower-cased protocol of a locator (`http`, `file`, ...), if any.
///
/// Single-letter schemes are Windows drive letters, not protocols.
pub fn get_protocol(path: &str) -> Option<String> {
    let idx = path.find("://")?;
    let scheme = &path[..idx];
    let valid = scheme.len() >= 2
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+' || c == '-' || c == '.');
    valid.then(|| scheme.to_ascii_lowercase())
}

/// Returns the lower-cased file extension including the dot (`.json`),
/// ignoring any query string. Returns an empty string when there is none.
pub fn get_extension(path: &str) -> String {
    match path.rfind('.') {
        Some(idx) => strip_query(&path[idx..]).to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Removes the query string from a locator.
pub fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Returns the `#` fragment of a locator, or `#` if it has none.
pub fn get_hash(path: &str) -> &str {
    match path.find('#') {
        Some(idx) => &path[idx..],
        None => "#",
    }
}

/// Removes the `#` fragment from a locator.
pub fn strip_hash(path: &str) -> &str {
    match path.find('#') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Whether the locator is an HTTP or HTTPS URL.
pub fn is_http(path: &str) -> bool {
    matches!(get_protocol(path).as_deref(), Some("http") | Some("https"))
}

/// Whether the locator refers to the local filesystem.
pub fn is_file_system_path(path: &str) -> bool {
    matches!(get_protocol(path).as_deref(), None | Some("file"))
}

/// Converts a filesystem path into a locator.
///
/// Backslashes become forward slashes, drive letters get a leading `/`,
/// characters that are not legal in a URI are percent-encoded, and `#` and
/// `?` are escaped because they are legal in file names.
pub fn from_file_system_path(path: &str) -> String {
    let mut path = path.to_string();
    if path.contains('\\') || has_drive_letter(&path) {
        path = path.replace('\\', "/");
        if has_drive_letter(&path) {
            path.insert(0, '/');
        }
    }
    utf8_percent_encode(&path, URI).to_string()
}

/// Converts a locator back into a filesystem path.
pub fn to_file_system_path(locator: &str) -> String {
    let mut path = decode(locator);
    if path
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("file://"))
    {
        path = path[7..].to_string();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
    }
    if path.starts_with('/') && has_drive_letter(&path[1..]) {
        path.remove(0);
        if cfg!(windows) {
            path = path.replace('/', "\\");
        }
    }
    path
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && bytes.get(2).map_or(true, |b| *b == b'/' || *b == b'\\')
}

/// Everything `encodeURI` escapes, plus `#` and `?`.
const URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Characters escaped in a pointer token inside a URI fragment.
const FRAGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Percent-encodes a pointer token for use in a fragment.
pub(crate) fn encode_fragment(token: &str) -> String {
    utf8_percent_encode(token, FRAGMENT).to_string()
}

/// Percent-decodes a string. Malformed escapes are kept verbatim and a
/// result that is not valid UTF-8 falls back to the input.
pub(crate) fn decode(input: &str) -> String {
    percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| input.to_string())
}
