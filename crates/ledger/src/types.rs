//! Request, response and value types exchanged with the ledger service.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LedgerError, LedgerResult};

/// Maximum length of a ledger name.
pub const MAX_LEDGER_NAME_LEN: usize = 32;

/// A validated ledger name.
///
/// Names are 1 to 32 ASCII letters, digits or hyphens. They start with a
/// letter, do not end with a hyphen, and never contain `--`.
///
/// # Examples
///
/// ```
/// use quickstart_ledger::LedgerName;
///
/// let name = LedgerName::new("MyLedger").unwrap();
/// assert_eq!(name.as_str(), "MyLedger");
/// assert!(LedgerName::new("1st-ledger").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedgerName(String);

impl LedgerName {
    /// Validates and wraps a ledger name.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRequest`] if the name breaks any naming rule.
    pub fn new(name: impl Into<String>) -> LedgerResult<Self> {
        let name = name.into();
        validate_ledger_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_ledger_name(name: &str) -> LedgerResult<()> {
    if name.is_empty() || name.len() > MAX_LEDGER_NAME_LEN {
        return Err(LedgerError::invalid_request(format!(
            "ledger name must be 1-{MAX_LEDGER_NAME_LEN} characters, got {}",
            name.len()
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(LedgerError::invalid_request(format!(
            "ledger name '{name}' must start with a letter"
        )));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        return Err(LedgerError::invalid_request(format!(
            "ledger name '{name}' contains invalid character '{bad}'"
        )));
    }
    if name.ends_with('-') || name.contains("--") {
        return Err(LedgerError::invalid_request(format!(
            "ledger name '{name}' has a trailing or repeated hyphen"
        )));
    }
    Ok(())
}

impl TryFrom<String> for LedgerName {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LedgerName> for String {
    fn from(name: LedgerName) -> Self {
        name.0
    }
}

impl AsRef<str> for LedgerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a ledger.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerState {
    /// The ledger is being provisioned and cannot serve sessions yet.
    Creating,
    /// The ledger is ready for sessions and transactions.
    Active,
    /// The ledger is being torn down.
    Deleting,
    /// The ledger no longer exists.
    Deleted,
}

impl LedgerState {
    /// Returns `true` if the ledger accepts sessions in this state.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if the ledger can never become active from this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleting | Self::Deleted)
    }
}

impl fmt::Display for LedgerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "CREATING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// Permissions mode assigned to a ledger at creation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionsMode {
    /// Any principal with API access may run any statement.
    #[default]
    AllowAll,
    /// Table-level permissions are enforced.
    Standard,
}

impl fmt::Display for PermissionsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowAll => write!(f, "ALLOW_ALL"),
            Self::Standard => write!(f, "STANDARD"),
        }
    }
}

/// Request to create a new ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct CreateLedgerRequest {
    /// Name of the ledger to create.
    pub name: LedgerName,
    /// Permissions mode for the new ledger.
    #[builder(default)]
    pub permissions_mode: PermissionsMode,
    /// Whether the ledger refuses delete requests.
    #[builder(default)]
    pub deletion_protection: bool,
}

/// Response to a successful create request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLedgerResponse {
    /// Name of the created ledger.
    pub name: LedgerName,
    /// Service-assigned identifier.
    pub id: String,
    /// State right after creation, normally [`LedgerState::Creating`].
    pub state: LedgerState,
    /// When the ledger was created.
    pub creation_time: DateTime<Utc>,
}

/// Current description of a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDescription {
    /// Ledger name.
    pub name: LedgerName,
    /// Service-assigned identifier.
    pub id: String,
    /// Lifecycle state at the time of the describe call.
    pub state: LedgerState,
    /// Permissions mode chosen at creation.
    pub permissions_mode: PermissionsMode,
    /// Whether delete requests are refused.
    pub deletion_protection: bool,
    /// When the ledger was created.
    pub creation_time: DateTime<Utc>,
}

impl fmt::Display for LedgerDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{name: {}, id: {}, state: {}, permissionsMode: {}, deletionProtection: {}, creationDateTime: {}}}",
            self.name,
            self.id,
            self.state,
            self.permissions_mode,
            self.deletion_protection,
            self.creation_time.to_rfc3339(),
        )
    }
}

/// A document stored in or returned from a ledger table.
///
/// Documents are always structs (JSON objects). Once inserted they are
/// never modified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Document(Map<String, Value>);

impl Document {
    /// Creates a document from a map of fields.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Creates a document holding a single field.
    #[must_use]
    pub fn with_field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(name.into(), value.into());
        Self(fields)
    }

    /// Converts an arbitrary value into a document.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRequest`] if `value` is not an object.
    pub fn from_value(value: Value) -> LedgerResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(LedgerError::invalid_request(format!(
                "documents must be structs, got {other}"
            ))),
        }
    }

    /// Returns the value of a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the document's fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Renders the document as indented, human-readable text.
    #[must_use]
    pub fn to_pretty_string(&self) -> String {
        // Serializing a map of `Value`s cannot fail.
        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }
}

impl TryFrom<Value> for Document {
    type Error = LedgerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        Value::Object(document.0)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}
