//! Media types and `Accept` negotiation.

use std::fmt;
use std::str::FromStr;

use crate::error::RestError;

/// A parsed media type such as `application/json` or `text/*`.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaType(mime::Mime);

impl MediaType {
    /// `*/*`
    #[must_use]
    pub fn wildcard() -> Self {
        Self(mime::STAR_STAR)
    }

    /// `application/json`
    #[must_use]
    pub fn json() -> Self {
        Self(mime::APPLICATION_JSON)
    }

    /// `text/plain`
    #[must_use]
    pub fn text() -> Self {
        Self(mime::TEXT_PLAIN)
    }

    /// `text/html`
    #[must_use]
    pub fn html() -> Self {
        Self(mime::TEXT_HTML)
    }

    /// `application/x-www-form-urlencoded`
    #[must_use]
    pub fn form() -> Self {
        Self(mime::APPLICATION_WWW_FORM_URLENCODED)
    }

    /// Parses a media type, returning [`RestError::IllegalArgument`] on failure.
    pub fn parse(value: &str) -> Result<Self, RestError> {
        value
            .trim()
            .parse::<mime::Mime>()
            .map(Self)
            .map_err(|e| RestError::illegal_argument(format!("invalid media type '{value}': {e}")))
    }

    /// Whether this is `*/*`.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0.type_() == mime::STAR && self.0.subtype() == mime::STAR
    }

    /// Wildcard-aware match in either direction; parameters are ignored.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        let types = self.0.type_() == mime::STAR
            || other.0.type_() == mime::STAR
            || self.0.type_() == other.0.type_();
        let subtypes = self.0.subtype() == mime::STAR
            || other.0.subtype() == mime::STAR
            || self.0.subtype() == other.0.subtype();
        types && subtypes
    }

    /// `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> &str {
        self.0.essence_str()
    }

    /// Value of the `q` parameter, defaulting to 1.
    #[must_use]
    pub fn quality(&self) -> f32 {
        self.0
            .get_param("q")
            .and_then(|q| q.as_str().parse::<f32>().ok())
            .unwrap_or(1.0)
    }

    /// Parses an `Accept` header into media types ordered by preference.
    ///
    /// Missing or unparsable headers yield `*/*`. Entries with `q=0` are dropped.
    #[must_use]
    pub fn parse_accept(header: Option<&str>) -> Vec<Self> {
        let mut parsed: Vec<Self> = header
            .unwrap_or_default()
            .split(',')
            .filter_map(|part| Self::parse(part).ok())
            .filter(|media| media.quality() > 0.0)
            .collect();
        if parsed.is_empty() {
            return vec![Self::wildcard()];
        }
        parsed.sort_by(|a, b| b.quality().total_cmp(&a.quality()));
        parsed
    }

    /// The underlying [`mime::Mime`].
    #[must_use]
    pub const fn as_mime(&self) -> &mime::Mime {
        &self.0
    }
}

impl FromStr for MediaType {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<mime::Mime> for MediaType {
    fn from(value: mime::Mime) -> Self {
        Self(value)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wildcards_match_both_ways() {
        let json = MediaType::json();
        assert!(json.matches(&MediaType::wildcard()));
        assert!(MediaType::wildcard().matches(&json));
        assert!(MediaType::parse("application/*").unwrap().matches(&json));
        assert!(!json.matches(&MediaType::text()));
    }

    #[test]
    fn test_parameters_are_ignored() {
        let charset = MediaType::parse("application/json; charset=utf-8").unwrap();
        assert!(charset.matches(&MediaType::json()));
        assert_eq!(charset.essence(), "application/json");
    }

    #[test]
    fn test_accept_is_ordered_by_quality() {
        let accept = MediaType::parse_accept(Some("text/plain;q=0.5, application/json, */*;q=0.1"));
        let essences: Vec<_> = accept.iter().map(MediaType::essence).collect();
        assert_eq!(essences, vec!["application/json", "text/plain", "*/*"]);
    }

    #[test]
    fn test_missing_accept_is_wildcard() {
        assert_eq!(MediaType::parse_accept(None), vec![MediaType::wildcard()]);
        assert_eq!(MediaType::parse_accept(Some("garbage")), vec![MediaType::wildcard()]);
    }

    #[test]
    fn test_zero_quality_is_dropped() {
        let accept = MediaType::parse_accept(Some("text/html;q=0, application/json"));
        assert_eq!(accept, vec![MediaType::json()]);
    }

    proptest! {
        #[test]
        fn prop_wildcard_matches_any_concrete_type(
            ty in "[a-z]{1,8}",
            sub in "[a-z]{1,8}",
        ) {
            let media = MediaType::parse(&format!("{ty}/{sub}")).unwrap();
            prop_assert!(media.matches(&MediaType::wildcard()));
            prop_assert!(media.matches(&media.clone()));
        }
    }
}
