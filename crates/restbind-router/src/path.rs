//! Path patterns.
//!
//! Literal templates are split into segments:
//!
//! - static segments match exactly (`users`)
//! - parameter segments capture one segment (`:id` or `{id}`)
//! - a trailing wildcard captures the rest (`*` or `*rest`)
//!
//! Regular-expression patterns must match the whole path; named groups become
//! parameters and unnamed groups are exposed as `param0`, `param1`, ...
//!
//! Matrix parameters (`/cars;color=red/...`) are stripped from each segment
//! before matching and collected separately.

use regex::Regex;
use restbind_core::{RestError, RestResult, RoutePath};

use crate::params::Params;

/// Kind of a literal path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Matches exactly.
    Static(String),
    /// Captures one segment.
    Param(String),
    /// Captures the remainder, optionally under a name.
    Wildcard(Option<String>),
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Matches every path.
    Any,
    /// Segment template.
    Template(Vec<SegmentKind>),
    /// Full-match regular expression.
    Pattern(Regex),
}

/// Result of matching a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    /// Captured path parameters.
    pub params: Params,
    /// Matrix parameters found in the path.
    pub matrix: Params,
}

impl PathMatcher {
    /// Compiles a literal template.
    pub fn template(path: &str) -> RestResult<Self> {
        let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (idx, segment) in raw.iter().enumerate() {
            let kind = if let Some(name) = segment.strip_prefix(':') {
                SegmentKind::Param(name.to_string())
            } else if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                SegmentKind::Param(name.to_string())
            } else if let Some(name) = segment.strip_prefix('*') {
                if idx + 1 != raw.len() {
                    return Err(RestError::illegal_argument(format!(
                        "wildcard must be the last segment in '{path}'"
                    )));
                }
                SegmentKind::Wildcard((!name.is_empty()).then(|| name.to_string()))
            } else {
                SegmentKind::Static((*segment).to_string())
            };
            if matches!(&kind, SegmentKind::Param(name) if name.is_empty()) {
                return Err(RestError::illegal_argument(format!(
                    "unnamed path parameter in '{path}'"
                )));
            }
            segments.push(kind);
        }
        Ok(Self::Template(segments))
    }

    /// Compiles a regular expression, anchored at both ends.
    pub fn regex(pattern: &str) -> RestResult<Self> {
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self::Pattern)
            .map_err(|e| RestError::illegal_argument(format!("invalid path pattern '{pattern}': {e}")))
    }

    /// Compiles a definition's path.
    pub fn from_route_path(path: &RoutePath) -> RestResult<Self> {
        match path {
            RoutePath::Literal(path) => Self::template(path),
            RoutePath::Regex(pattern) => Self::regex(pattern),
        }
    }

    /// Matches `path`, returning captured parameters.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let mut matrix = Params::new();
        let clean = strip_matrix(path, &mut matrix);
        let params = match self {
            Self::Any => Params::new(),
            Self::Template(segments) => match_template(segments, &clean)?,
            Self::Pattern(regex) => match_regex(regex, &clean)?,
        };
        Some(PathMatch { params, matrix })
    }
}

fn strip_matrix(path: &str, matrix: &mut Params) -> String {
    if !path.contains(';') {
        return path.to_string();
    }
    path.split('/')
        .map(|segment| {
            let mut parts = segment.split(';');
            let head = parts.next().unwrap_or_default();
            for pair in parts {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                if !name.is_empty() {
                    matrix.push(name, value);
                }
            }
            head
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn match_template(segments: &[SegmentKind], path: &str) -> Option<Params> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut params = Params::new();
    let mut idx = 0;
    for segment in segments {
        match segment {
            SegmentKind::Wildcard(name) => {
                if let Some(name) = name {
                    params.push(name.as_str(), parts[idx.min(parts.len())..].join("/"));
                }
                return Some(params);
            }
            SegmentKind::Static(expected) => {
                if *parts.get(idx)? != expected.as_str() {
                    return None;
                }
            }
            SegmentKind::Param(name) => {
                params.push(name.as_str(), *parts.get(idx)?);
            }
        }
        idx += 1;
    }
    (idx == parts.len()).then_some(params)
}

fn match_regex(regex: &Regex, path: &str) -> Option<Params> {
    let captures = regex.captures(path)?;
    let mut params = Params::new();
    let mut unnamed = 0;
    for (idx, name) in regex.capture_names().enumerate().skip(1) {
        let Some(value) = captures.get(idx) else {
            continue;
        };
        match name {
            Some(name) => params.push(name, value.as_str()),
            None => {
                params.push(format!("param{unnamed}"), value.as_str());
                unnamed += 1;
            }
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_template_params() {
        let matcher = PathMatcher::template("/orgs/:org/users/{user}").unwrap();
        let m = matcher.matches("/orgs/acme/users/42").unwrap();
        assert_eq!(m.params.get("org"), Some("acme"));
        assert_eq!(m.params.get("user"), Some("42"));
        assert!(matcher.matches("/orgs/acme/users").is_none());
        assert!(matcher.matches("/orgs/acme/users/42/extra").is_none());
    }

    #[test]
    fn test_trailing_slash_is_tolerated() {
        let matcher = PathMatcher::template("/widgets").unwrap();
        assert!(matcher.matches("/widgets/").is_some());
        assert!(matcher.matches("/widget").is_none());
    }

    #[test]
    fn test_wildcard_captures_rest() {
        let matcher = PathMatcher::template("/files/*path").unwrap();
        let m = matcher.matches("/files/img/logo.png").unwrap();
        assert_eq!(m.params.get("path"), Some("img/logo.png"));
        assert!(matcher.matches("/files").is_some());

        let anonymous = PathMatcher::template("/static/*").unwrap();
        assert!(anonymous.matches("/static/a/b").unwrap().params.is_empty());
    }

    #[test]
    fn test_wildcard_must_be_last() {
        assert!(PathMatcher::template("/a/*/b").is_err());
    }

    #[test]
    fn test_regex_groups() {
        let matcher = PathMatcher::regex(r"/items/(?P<id>\d+)/(\w+)").unwrap();
        let m = matcher.matches("/items/7/details").unwrap();
        assert_eq!(m.params.get("id"), Some("7"));
        assert_eq!(m.params.get("param0"), Some("details"));
        assert!(matcher.matches("/items/x/details").is_none());
    }

    #[test]
    fn test_regex_is_anchored() {
        let matcher = PathMatcher::regex("/rest/.*").unwrap();
        assert!(matcher.matches("/rest/anything/here").is_some());
        assert!(matcher.matches("/other/rest/x").is_none());
    }

    #[test]
    fn test_matrix_parameters_are_collected() {
        let matcher = PathMatcher::template("/cars/:make").unwrap();
        let m = matcher.matches("/cars;color=red;year=2020/audi").unwrap();
        assert_eq!(m.params.get("make"), Some("audi"));
        assert_eq!(m.matrix.get("color"), Some("red"));
        assert_eq!(m.matrix.get("year"), Some("2020"));
    }

    proptest! {
        #[test]
        fn prop_static_template_matches_itself(segments in proptest::collection::vec("[a-z0-9]{1,6}", 0..5)) {
            let path = format!("/{}", segments.join("/"));
            let matcher = PathMatcher::template(&path).unwrap();
            prop_assert!(matcher.matches(&path).is_some());
            prop_assert!(PathMatcher::Any.matches(&path).is_some());
        }
    }
}
