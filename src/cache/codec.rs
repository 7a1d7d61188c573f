//! Value codecs used to persist cache entries.

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to encode cache value: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stored payload does not match the expected shape: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored payload failed validation: {reason}")]
    Invalid { reason: String },
}

impl DecodeError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Converts a value to and from its stored text form.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<String, EncodeError>;
    fn decode(&self, raw: &str) -> Result<T, DecodeError>;
}

type Validator<T> = fn(&T) -> Result<(), DecodeError>;

/// JSON codec backed by `serde`, with an optional post-decode validator.
pub struct JsonCodec<T> {
    validate: Option<Validator<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub const fn new() -> Self {
        Self {
            validate: None,
            _marker: PhantomData,
        }
    }

    /// Reject decoded values that parse but violate `validate`.
    pub const fn with_validator(validate: Validator<T>) -> Self {
        Self {
            validate: Some(validate),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, raw: &str) -> Result<T, DecodeError> {
        let value: T = serde_json::from_str(raw)?;
        if let Some(validate) = self.validate {
            validate(&value)?;
        }
        Ok(value)
    }
}

/// Pass-through codec for values that are already text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec<String> for TextCodec {
    fn encode(&self, value: &String) -> Result<String, EncodeError> {
        Ok(value.clone())
    }

    fn decode(&self, raw: &str) -> Result<String, DecodeError> {
        Ok(raw.to_string())
    }
}
