//! Cookie, query string and form decoding into [`Params`].

use restbind_core::{ParamSource, RestError, RestResult};
use restbind_router::Params;

/// Parses a `Cookie` header.
///
/// Pairs without `=` are skipped; surrounding quotes are removed.
///
/// ```
/// use restbind_extract::parse_cookies;
///
/// let cookies = parse_cookies(r#"session=abc; theme="dark"; flag"#);
/// assert_eq!(cookies.get("session"), Some("abc"));
/// assert_eq!(cookies.get("theme"), Some("dark"));
/// assert_eq!(cookies.len(), 2);
/// ```
#[must_use]
pub fn parse_cookies(header_value: &str) -> Params {
    let mut cookies = Params::new();
    for cookie in header_value.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            cookies.push(name, value.trim().trim_matches('"'));
        }
    }
    cookies
}

/// Decodes a query string. A missing query yields no parameters.
pub fn parse_query(query: Option<&str>) -> RestResult<Params> {
    match query {
        None | Some("") => Ok(Params::new()),
        Some(raw) => decode(raw, ParamSource::Query),
    }
}

/// Decodes an `application/x-www-form-urlencoded` body.
pub fn parse_form(body: &[u8]) -> RestResult<Params> {
    let text = std::str::from_utf8(body)
        .map_err(|e| RestError::conversion(ParamSource::Form, "body", "UTF-8 text", e.to_string()))?;
    if text.is_empty() {
        return Ok(Params::new());
    }
    decode(text, ParamSource::Form)
}

fn decode(raw: &str, location: ParamSource) -> RestResult<Params> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
        .map(|pairs| pairs.into_iter().collect())
        .map_err(|e| RestError::conversion(location, "", "url-encoded pairs", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_query_decoding() {
        let params = parse_query(Some("name=Ada%20L&tag=a&tag=b")).unwrap();
        assert_eq!(params.get("name"), Some("Ada L"));
        assert_eq!(params.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(parse_query(None).unwrap().is_empty());
    }

    #[test]
    fn test_form_decoding() {
        let params = parse_form(b"a=1&b=two+words").unwrap();
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get("b"), Some("two words"));
        assert!(parse_form(b"").unwrap().is_empty());
        assert!(parse_form(&[0xff]).is_err());
    }

    #[test]
    fn test_cookie_edge_cases() {
        let cookies = parse_cookies("  a = 1 ;=orphan; b=");
        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get("b"), Some(""));
        assert_eq!(cookies.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_cookie_values_survive(name in "[a-z]{1,8}", value in "[A-Za-z0-9]{0,12}") {
            let cookies = parse_cookies(&format!("{name}={value}"));
            prop_assert_eq!(cookies.get(&name), Some(value.as_str()));
        }
    }
}
