//! Identifier newtypes shared by every Formflow crate.
//!
//! All entity ids are UUIDv4 strings. Wrapping them keeps a `FieldId` from
//! being passed where a `FormId` is expected, which matters in the EAV tables
//! where every row carries two or three foreign keys side by side.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when a string is not a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    kind: &'static str,
    message: String,
}

impl IdParseError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Which identifier kind failed to parse (e.g. "form ID").
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                let uuid = Uuid::parse_str(value.trim())
                    .map_err(|e| IdParseError::new($label, e.to_string()))?;
                // Canonical hyphenated lowercase, so string equality in SQL holds
                Ok(Self(uuid.hyphenated().to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_uuid_id!(
    /// Identifies a form (the owner of a schema).
    FormId,
    "form ID"
);
define_uuid_id!(
    /// Identifies one field definition inside a form.
    FieldId,
    "field ID"
);
define_uuid_id!(
    /// Identifies one committed submission.
    SubmissionId,
    "submission ID"
);
define_uuid_id!(SubmissionValueId, "submission value ID");
define_uuid_id!(AttachmentId, "attachment ID");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(FormId::new(), FormId::new());
    }

    #[test]
    fn parse_normalizes_case() {
        let id = FieldId::parse("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
        assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = SubmissionId::parse("not-a-uuid").unwrap_err();
        assert_eq!(err.kind(), "submission ID");
        assert!(err.to_string().starts_with("Invalid submission ID"));
    }

    #[test]
    fn serde_is_transparent_and_validating() {
        let id = FormId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: FormId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<FormId>("\"nope\"").is_err());
    }
}
