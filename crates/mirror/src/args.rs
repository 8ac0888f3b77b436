use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::MirrorError;

/// Hook for constructor arguments that are not plain data.
///
/// Returning `None` drops the argument from the construction record.
pub trait MirrorSerialize {
    fn mirror_args(&self) -> Option<Value>;
}

/// JSON-safe snapshot of the arguments an origin was constructed with,
/// shipped to every proxy in its construction record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructorArgs(Vec<Value>);

impl ConstructorArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plain-data argument. Values that cannot be represented as
    /// JSON are dropped.
    pub fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        if let Err(err) = self.try_push(value) {
            tracing::debug!(%err, "dropping constructor argument");
        }
        self
    }

    /// Append a plain-data argument, failing if it cannot be represented as
    /// JSON.
    pub fn try_push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self, MirrorError> {
        let value = serde_json::to_value(value).map_err(|source| MirrorError::ArgEncode {
            index: self.0.len(),
            source,
        })?;
        self.0.push(value);
        Ok(self)
    }

    /// Append an argument through its `MirrorSerialize` hook.
    pub fn push_custom<T: MirrorSerialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        match value.mirror_args() {
            Some(v) => self.0.push(v),
            None => tracing::debug!("custom constructor argument opted out"),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Decode argument `index` into `T`. `None` if it is missing or has a
    /// different shape.
    pub fn get_as<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        self.0
            .get(index)
            .and_then(|v| T::deserialize(v).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    /// Wire form: a JSON array.
    pub fn to_value(&self) -> Value {
        Value::Array(self.0.clone())
    }

    /// Inverse of `to_value`. A non-array value becomes a single argument.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self(items),
            other => Self(vec![other]),
        }
    }
}
