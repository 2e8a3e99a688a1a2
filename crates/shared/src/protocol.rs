//! Wire shape shared by import/export files and bundled example documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Creation, CreationId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document is not valid JSON: {0}")]
    Malformed(String),
    #[error("document is missing required field `{0}`")]
    MissingField(&'static str),
}

/// A loosely-typed serialized creation. Only `name` and `html` are required;
/// everything else is filled in on conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationDocument {
    /// String or number; anything else is treated as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

impl CreationDocument {
    pub fn from_json(raw: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(raw).map_err(|err| DocumentError::Malformed(err.to_string()))
    }

    /// Accepts RFC 3339 strings and epoch milliseconds.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.timestamp.as_ref()? {
            Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            Value::Number(millis) => millis
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            _ => None,
        }
    }

    pub fn parsed_id(&self) -> Option<CreationId> {
        match self.id.as_ref()? {
            Value::String(raw) if !raw.trim().is_empty() => Some(CreationId(raw.clone())),
            Value::Number(number) => Some(CreationId(number.to_string())),
            _ => None,
        }
    }

    pub fn into_creation(self) -> Result<Creation, DocumentError> {
        let timestamp = self.parsed_timestamp().unwrap_or_else(Utc::now);
        let id = self.parsed_id().unwrap_or_else(CreationId::generate);
        let html = self
            .html
            .filter(|html| !html.trim().is_empty())
            .ok_or(DocumentError::MissingField("html"))?;
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or(DocumentError::MissingField("name"))?;

        Ok(Creation {
            id,
            name,
            html,
            original_image: self.original_image.filter(|image| !image.is_empty()),
            timestamp,
        })
    }
}

impl From<&Creation> for CreationDocument {
    fn from(value: &Creation) -> Self {
        Self {
            id: Some(Value::String(value.id.0.clone())),
            name: Some(value.name.clone()),
            html: Some(value.html.clone()),
            original_image: value.original_image.clone(),
            timestamp: Some(Value::String(value.timestamp.to_rfc3339())),
        }
    }
}
