//! Raw request templates.
//!
//! A template is a human-authored HTTP request in one of two text dialects:
//!
//! ```text
//! GET /activity?until=0 HTTP/1.1        :method: GET
//! Host: example.test                    :scheme: https
//! Accept: text/html                     :authority: example.test
//!                                       :path: /activity?until=0
//!                                       accept: text/html
//! ```
//!
//! The dialect is sniffed from the first non-blank line. Both collapse into a
//! [`CanonicalRequest`] whose header list keeps template line order,
//! duplicates included.

use std::str::FromStr as _;
use std::sync::LazyLock;

use http::Method;
use http::header::{HeaderName, HeaderValue};
use http::uri::{PathAndQuery, Uri};
use regex::{NoExpand, Regex};

use crate::error::TemplateError;

/// Scheme used by status-line templates, which carry no scheme of their own.
pub const DEFAULT_SCHEME: &str = "https";

const HOST_HEADER: &str = "Host";
const SEPARATOR: &str = ": ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    StatusLine,
    PseudoHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    /// Implied by pseudo-header templates.
    pub const HTTP_2: Self = Self { major: 2, minor: 0 };

    /// Parses `HTTP/<major>.<minor>` with decimal components.
    pub fn parse(raw: &str) -> Option<Self> {
        let (major, minor) = raw.strip_prefix("HTTP/")?.split_once('.')?;
        Some(Self {
            major: parse_version_component(major)?,
            minor: parse_version_component(minor)?,
        })
    }
}

fn parse_version_component(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().filter(|n| *n <= 1_000_000)
}

/// An executable request assembled from a template. Built fresh per call.
#[derive(Debug)]
pub struct CanonicalRequest {
    dialect: Dialect,
    method: Method,
    uri: Uri,
    version: ProtocolVersion,
    headers: Vec<HeaderField>,
    body: Option<reqwest::Body>,
}

impl CanonicalRequest {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or_default()
    }

    pub fn authority(&self) -> &str {
        self.uri.authority().map(|a| a.as_str()).unwrap_or_default()
    }

    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/")
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    pub fn body(&self) -> Option<&reqwest::Body> {
        self.body.as_ref()
    }

    pub fn into_parts(self) -> (Method, Uri, Vec<HeaderField>, Option<reqwest::Body>) {
        (self.method, self.uri, self.headers, self.body)
    }
}

/// Parses a template in either dialect. The body is attached as given.
pub fn parse(
    template: &str,
    body: Option<reqwest::Body>,
) -> Result<CanonicalRequest, TemplateError> {
    let mut lines = template.lines().skip_while(|line| line.trim().is_empty());
    let first = lines.next().ok_or(TemplateError::Empty)?;

    let parsed = match detect_dialect(first) {
        Dialect::StatusLine => parse_status_line(first, lines)?,
        Dialect::PseudoHeader => parse_pseudo_headers(first, lines)?,
    };
    parsed.collapse(body)
}

/// A first line shaped like `name: value` selects the pseudo-header dialect,
/// whether or not it is a pseudo-header itself. Header names never contain
/// whitespace, while a request line always has a space after the method.
pub fn detect_dialect(first_line: &str) -> Dialect {
    if first_line.starts_with(':') {
        return Dialect::PseudoHeader;
    }
    match first_line.split_once(SEPARATOR) {
        Some((name, _)) if !name.is_empty() && !name.contains(char::is_whitespace) => {
            Dialect::PseudoHeader
        }
        _ => Dialect::StatusLine,
    }
}

enum ParsedTemplate {
    StatusLine {
        method: String,
        path: String,
        version: ProtocolVersion,
        host: Option<String>,
        headers: Vec<HeaderField>,
    },
    PseudoHeader {
        method: Option<String>,
        scheme: Option<String>,
        authority: Option<String>,
        path: Option<String>,
        headers: Vec<HeaderField>,
    },
}

fn parse_status_line<'a>(
    first: &str,
    rest: impl Iterator<Item = &'a str>,
) -> Result<ParsedTemplate, TemplateError> {
    let parts = first.split(' ').collect::<Vec<_>>();
    let [method, path, version] = parts.as_slice() else {
        return Err(TemplateError::InvalidRequestLine(first.to_owned()));
    };
    let version = ProtocolVersion::parse(version)
        .ok_or_else(|| TemplateError::InvalidVersion((*version).to_owned()))?;

    let mut host = None;
    let mut headers = Vec::new();
    for line in rest {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = split_header_line(line)?;
        if name == HOST_HEADER {
            host = Some(value.to_owned());
        } else {
            headers.push(header_field(name, value)?);
        }
    }

    Ok(ParsedTemplate::StatusLine {
        method: (*method).to_owned(),
        path: (*path).to_owned(),
        version,
        host,
        headers,
    })
}

fn parse_pseudo_headers<'a>(
    first: &'a str,
    rest: impl Iterator<Item = &'a str>,
) -> Result<ParsedTemplate, TemplateError> {
    let mut method = None;
    let mut scheme = None;
    let mut authority = None;
    let mut path = None;
    let mut headers = Vec::new();

    for line in std::iter::once(first).chain(rest) {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = split_header_line(line)?;
        let (slot, label) = match name {
            ":method" => (&mut method, ":method"),
            ":scheme" => (&mut scheme, ":scheme"),
            ":authority" => (&mut authority, ":authority"),
            ":path" => (&mut path, ":path"),
            other if other.starts_with(':') => {
                return Err(TemplateError::UnknownPseudoHeader(other.to_owned()));
            }
            _ => {
                headers.push(header_field(name, value)?);
                continue;
            }
        };
        if slot.replace(value.to_owned()).is_some() {
            return Err(TemplateError::DuplicatePseudoHeader(label));
        }
    }

    Ok(ParsedTemplate::PseudoHeader {
        method,
        scheme,
        authority,
        path,
        headers,
    })
}

/// Splits at the first `": "`; later separators belong to the value.
fn split_header_line(line: &str) -> Result<(&str, &str), TemplateError> {
    line.split_once(SEPARATOR)
        .ok_or_else(|| TemplateError::MissingSeparator(line.to_owned()))
}

fn header_field(name: &str, value: &str) -> Result<HeaderField, TemplateError> {
    if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
        return Err(TemplateError::InvalidHeader {
            name: name.to_owned(),
        });
    }
    Ok(HeaderField {
        name: name.to_owned(),
        value: value.to_owned(),
    })
}

impl ParsedTemplate {
    fn collapse(self, body: Option<reqwest::Body>) -> Result<CanonicalRequest, TemplateError> {
        let (dialect, method, scheme, authority, path, version, headers) = match self {
            Self::StatusLine {
                method,
                path,
                version,
                host,
                headers,
            } => (
                Dialect::StatusLine,
                method,
                DEFAULT_SCHEME.to_owned(),
                host.ok_or(TemplateError::Missing("Host header"))?,
                path,
                version,
                headers,
            ),
            Self::PseudoHeader {
                method,
                scheme,
                authority,
                path,
                headers,
            } => (
                Dialect::PseudoHeader,
                method.ok_or(TemplateError::Missing(":method pseudo-header"))?,
                scheme.ok_or(TemplateError::Missing(":scheme pseudo-header"))?,
                authority.ok_or(TemplateError::Missing(":authority pseudo-header"))?,
                path.ok_or(TemplateError::Missing(":path pseudo-header"))?,
                ProtocolVersion::HTTP_2,
                headers,
            ),
        };

        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| TemplateError::InvalidMethod(method.clone()))?;
        let path_and_query = PathAndQuery::from_str(&rooted_path(&path)).map_err(|source| {
            TemplateError::InvalidPath {
                path: path.clone(),
                source,
            }
        })?;
        let uri = Uri::builder()
            .scheme(scheme.as_str())
            .authority(authority.as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(TemplateError::InvalidUri)?;

        Ok(CanonicalRequest {
            dialect,
            method,
            uri,
            version,
            headers,
            body,
        })
    }
}

/// Relative references such as `activity?until=1` resolve against the root.
fn rooted_path(path: &str) -> std::borrow::Cow<'_, str> {
    if path.starts_with('/') || path == "*" {
        path.into()
    } else {
        format!("/{path}").into()
    }
}

static CURSOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("until=[0-9]+").expect("cursor placeholder pattern is valid"));
static STORY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("stories/[0-9]+").expect("story placeholder pattern is valid"));

/// The single substitution point of a template.
#[derive(Debug, Clone, Copy)]
pub enum Placeholder {
    /// `until=<unix seconds>` in the feed page template.
    Cursor,
    /// `stories/<id>` in the detail template.
    StoryId,
}

impl Placeholder {
    fn pattern(self) -> &'static Regex {
        match self {
            Self::Cursor => &CURSOR_PATTERN,
            Self::StoryId => &STORY_PATTERN,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Cursor => "until=",
            Self::StoryId => "stories/",
        }
    }

    pub fn is_present(self, template: &str) -> bool {
        self.pattern().is_match(template)
    }

    /// Replaces the first occurrence. `value` is inserted literally.
    pub fn fill(self, template: &str, value: &str) -> String {
        let replacement = format!("{}{value}", self.prefix());
        self.pattern()
            .replace(template, NoExpand(&replacement))
            .into_owned()
    }
}
