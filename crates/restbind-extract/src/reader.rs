//! Built-in body readers.

use std::marker::PhantomData;

use bytes::Bytes;
use restbind_core::plugin::{ReadValue, ReaderEntry, ValueReader};
use restbind_core::{Anything, BoxedValue, HttpRequest, MediaType, ParamSource, RestError, RestResult, Typed};
use serde::de::DeserializeOwned;

fn body_error(expected: &str, reason: impl ToString) -> RestError {
    RestError::conversion(ParamSource::Body, "body", expected, reason.to_string())
}

/// Parses the body as a JSON document; the binder maps it onto the parameter type.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBodyReader;

impl JsonBodyReader {
    /// Registration entry for `application/json`, any type.
    #[must_use]
    pub fn entry() -> ReaderEntry {
        ReaderEntry::of::<Anything, _>(Self).with_media(MediaType::json())
    }
}

impl ValueReader for JsonBodyReader {
    fn read(&self, body: &Bytes, _request: &HttpRequest) -> RestResult<ReadValue> {
        serde_json::from_slice(body)
            .map(ReadValue::Json)
            .map_err(|e| body_error("JSON", e))
    }
}

/// Hands the body over as UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextBodyReader;

impl TextBodyReader {
    /// Registration entry for `text/plain`, any type.
    #[must_use]
    pub fn entry() -> ReaderEntry {
        ReaderEntry::of::<Anything, _>(Self).with_media(MediaType::text())
    }
}

impl ValueReader for TextBodyReader {
    fn read(&self, body: &Bytes, _request: &HttpRequest) -> RestResult<ReadValue> {
        std::str::from_utf8(body)
            .map(|text| ReadValue::Text(text.to_string()))
            .map_err(|e| body_error("UTF-8 text", e))
    }
}

/// Deserializes a JSON body straight into `T`.
///
/// Useful for vendor media types carrying JSON:
///
/// ```
/// use restbind_extract::TypedJsonReader;
/// use restbind_core::MediaType;
///
/// let entry = TypedJsonReader::<Vec<u32>>::entry()
///     .with_media(MediaType::parse("application/vnd.ids+json").unwrap());
/// assert!(entry.media().is_some());
/// ```
pub struct TypedJsonReader<T>(PhantomData<fn() -> T>);

impl<T> Default for TypedJsonReader<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> std::fmt::Debug for TypedJsonReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedJsonReader")
            .field(&std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Typed + DeserializeOwned> TypedJsonReader<T> {
    /// Registration entry declared to produce `T`, for any media type.
    #[must_use]
    pub fn entry() -> ReaderEntry {
        ReaderEntry::of::<T, _>(Self::default())
    }
}

impl<T: Typed + DeserializeOwned> ValueReader for TypedJsonReader<T> {
    fn read(&self, body: &Bytes, _request: &HttpRequest) -> RestResult<ReadValue> {
        serde_json::from_slice::<T>(body)
            .map(|value| ReadValue::Typed(Box::new(value) as BoxedValue))
            .map_err(|e| body_error(std::any::type_name::<T>(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request() -> HttpRequest {
        HttpRequest::build(Method::POST, "/").unwrap()
    }

    #[test]
    fn test_json_reader_parses_document() {
        let value = JsonBodyReader
            .read(&Bytes::from_static(br#"{"a":1}"#), &request())
            .unwrap();
        assert!(matches!(value, ReadValue::Json(v) if v["a"] == 1));
    }

    #[test]
    fn test_json_reader_rejects_garbage() {
        let err = JsonBodyReader
            .read(&Bytes::from_static(b"{nope"), &request())
            .unwrap_err();
        assert!(matches!(err, RestError::ParameterConversionFailed { .. }));
    }

    #[test]
    fn test_text_reader() {
        let value = TextBodyReader.read(&Bytes::from_static(b"hi"), &request()).unwrap();
        assert!(matches!(value, ReadValue::Text(t) if t == "hi"));
        assert!(TextBodyReader.read(&Bytes::from_static(&[0xff, 0xfe]), &request()).is_err());
    }

    #[test]
    fn test_typed_reader_produces_value() {
        let value = TypedJsonReader::<Vec<u32>>::default()
            .read(&Bytes::from_static(b"[1,2]"), &request())
            .unwrap();
        match value {
            ReadValue::Typed(boxed) => assert_eq!(boxed.downcast_ref::<Vec<u32>>(), Some(&vec![1, 2])),
            other => panic!("unexpected {other:?}"),
        }
    }
}
