//! The uniform `{body, error, metadata}` wire envelope.
//!
//! Every response on the mesh, success or failure, carries this shape:
//!
//! ```text
//! {"body": {...}, "error": "..." | null, "metadata": {...}}
//! ```
//!
//! `body` is never absent. When there is nothing to return it is encoded as
//! `{}` and decoded as [`Body::Empty`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::EnvelopeError;

/// Free-form envelope metadata.
pub type Metadata = serde_json::Map<String, Value>;

/// Envelope carrying a body of type `T`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub body: T,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl<T> Envelope<T> {
    /// Create an envelope with no error and empty metadata.
    pub fn new(body: T) -> Self {
        Self {
            body,
            error: None,
            metadata: Metadata::new(),
        }
    }

    /// Set the error string.
    pub fn with_error<S: Into<String>>(mut self, error: S) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Insert a single metadata entry.
    pub fn insert_metadata<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Map the body, keeping error and metadata.
    pub fn map_body<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            body: f(self.body),
            error: self.error,
            metadata: self.metadata,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encode this envelope to its canonical JSON bytes.
    pub fn to_bytes(&self) -> Result<Bytes, EnvelopeError> {
        encode(&self.body, self.error.as_deref(), Some(&self.metadata))
    }
}

#[derive(Serialize)]
struct WireEnvelope<'a, B: ?Sized> {
    body: &'a B,
    error: Option<&'a str>,
    metadata: &'a Metadata,
}

/// Encode an envelope.
///
/// Unset `error` serializes as `null`, unset `metadata` as `{}`.
pub fn encode<B>(
    body: &B,
    error: Option<&str>,
    metadata: Option<&Metadata>,
) -> Result<Bytes, EnvelopeError>
where
    B: Serialize + ?Sized,
{
    let empty = Metadata::new();
    let wire = WireEnvelope {
        body,
        error,
        metadata: metadata.unwrap_or(&empty),
    };
    serde_json::to_vec(&wire)
        .map(Bytes::from)
        .map_err(|e| EnvelopeError::Encode(e.to_string()))
}

/// An envelope decoded from the wire, before the body is validated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawEnvelope {
    /// `None` when the body was missing, `null`, or blank.
    pub body: Option<Value>,
    pub error: Option<String>,
    pub metadata: Metadata,
}

/// Decode envelope bytes.
///
/// Fails with [`EnvelopeError::Malformed`] when the bytes are not a JSON
/// object and with [`EnvelopeError::Empty`] when there is nothing in them.
pub fn decode(bytes: &[u8]) -> Result<RawEnvelope, EnvelopeError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(EnvelopeError::Empty);
    }

    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let mut object = match value {
        Value::Null => return Err(EnvelopeError::Empty),
        Value::Object(object) => object,
        other => {
            return Err(EnvelopeError::Malformed(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            )));
        }
    };
    if object.is_empty() {
        return Err(EnvelopeError::Empty);
    }

    let error = match object.remove("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };
    let metadata = match object.remove("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => Metadata::new(),
    };
    let body = object.remove("body").filter(|body| !is_blank(body));

    Ok(RawEnvelope {
        body,
        error,
        metadata,
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A received body.
///
/// Callers always get a body back: the typed payload when it validated, the
/// raw JSON when it did not, or an explicit empty placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum Body<T> {
    /// The body validated against `T`.
    Typed(T),
    /// The body was present but did not match `T`.
    Raw(Value),
    /// No body was received.
    Empty,
}

impl<T> Default for Body<T> {
    fn default() -> Self {
        Body::Empty
    }
}

impl<T> Body<T> {
    /// The typed payload, if validation succeeded.
    pub fn typed(&self) -> Option<&T> {
        match self {
            Body::Typed(t) => Some(t),
            _ => None,
        }
    }

    /// The raw JSON, if validation failed.
    pub fn raw(&self) -> Option<&Value> {
        match self {
            Body::Raw(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true for the empty placeholder.
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Consume into the typed payload, if validation succeeded.
    pub fn into_typed(self) -> Option<T> {
        match self {
            Body::Typed(t) => Some(t),
            _ => None,
        }
    }
}

impl<T> Body<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// A JSON object view of the body.
    ///
    /// Available for every variant: an empty placeholder yields the fields of
    /// `T::default()`.
    pub fn fields(&self) -> Metadata {
        let value = match self {
            Body::Typed(t) => serde_json::to_value(t).unwrap_or(Value::Null),
            Body::Raw(v) => v.clone(),
            Body::Empty => serde_json::to_value(T::default()).unwrap_or(Value::Null),
        };
        match value {
            Value::Object(fields) => fields,
            _ => Metadata::new(),
        }
    }

    /// Consume into a `T`, defaulting whatever could not be recovered.
    ///
    /// Raw bodies are overlaid onto the fields of `T::default()`; if the
    /// result still does not validate, `T::default()` is returned.
    pub fn into_typed_or_default(self) -> T {
        match self {
            Body::Typed(t) => t,
            Body::Empty => T::default(),
            Body::Raw(Value::Object(raw)) => {
                let mut fields = Body::<T>::Empty.fields();
                fields.extend(raw);
                serde_json::from_value(Value::Object(fields)).unwrap_or_default()
            }
            Body::Raw(_) => T::default(),
        }
    }
}

impl<T: Serialize> Serialize for Body<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Body::Typed(t) => t.serialize(serializer),
            Body::Raw(v) => v.serialize(serializer),
            Body::Empty => Metadata::new().serialize(serializer),
        }
    }
}
