//! User account models.

use crate::db::{Record, SqlEnum, SqlValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Administrator.
    Admin,
    /// Regular player account (default).
    #[default]
    Player,
}

impl SqlEnum for UserRole {
    fn as_sql_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Player => "player",
        }
    }

    fn from_sql_str(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "player" => Some(Self::Player),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql_str())
    }
}

impl From<UserRole> for SqlValue {
    fn from(role: UserRole) -> Self {
        SqlValue::Text(role.as_sql_str().to_string())
    }
}

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Unique e-mail address.
    pub email: String,
    /// Whether the e-mail address was confirmed.
    pub verified: bool,
    /// Whether the account is blocked.
    pub blocked: bool,
    /// Account role.
    pub role: UserRole,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreate {
    /// Display name.
    pub name: String,
    /// E-mail address.
    pub email: String,
    /// Password hash computed by the caller.
    pub password_hash: String,
    /// Role, `player` when omitted.
    #[serde(default)]
    pub role: UserRole,
}

/// Partial update of a user. Only fields that are not [`Field::Unset`] are
/// written.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserUpdate {
    /// New display name.
    pub name: Field<String>,
    /// New verification flag.
    pub verified: Field<bool>,
    /// New blocked flag.
    pub blocked: Field<bool>,
    /// New role.
    pub role: Field<UserRole>,
}

impl UserUpdate {
    /// Returns `true` when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_unset()
            && self.verified.is_unset()
            && self.blocked.is_unset()
            && self.role.is_unset()
    }
}

/// A patch field: absent, explicitly null, or a value.
///
/// Deserializes a missing key as `Unset` (with `#[serde(default)]` on the
/// container) and `null` as `Null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Field<T> {
    /// Not part of the patch.
    #[default]
    Unset,
    /// Set the column to `NULL`.
    Null,
    /// Set the column to this value.
    Value(T),
}

impl<T> Field<T> {
    /// Returns `true` for [`Field::Unset`].
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl<T: Clone + Into<SqlValue>> Field<T> {
    /// Writes the field into `record` under `column` unless it is unset.
    pub fn write_to(&self, record: &mut Record, column: &str) {
        match self {
            Self::Unset => {}
            Self::Null => record.insert(column, SqlValue::Null),
            Self::Value(value) => record.insert(column, value.clone()),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_serialization() {
        let json = serde_json::to_string(&UserRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");

        let role: UserRole = serde_json::from_str("\"player\"").unwrap();
        assert_eq!(role, UserRole::Player);
    }

    #[test]
    fn test_user_role_sql_labels() {
        assert_eq!(UserRole::Admin.as_sql_str(), "admin");
        assert_eq!(UserRole::from_sql_str("player"), Some(UserRole::Player));
        assert_eq!(UserRole::from_sql_str("owner"), None);
        assert_eq!(SqlValue::from(UserRole::Admin), SqlValue::from("admin"));
    }

    #[test]
    fn test_user_create_role_defaults_to_player() {
        let payload: UserCreate = serde_json::from_str(
            r#"{"name":"Ada","email":"ada@example.com","password_hash":"argon2$abc"}"#,
        )
        .unwrap();
        assert_eq!(payload.role, UserRole::Player);
    }

    #[test]
    fn test_user_update_distinguishes_missing_and_null() {
        let patch: UserUpdate = serde_json::from_str(r#"{"name":null,"verified":true}"#).unwrap();

        assert_eq!(patch.name, Field::Null);
        assert_eq!(patch.verified, Field::Value(true));
        assert!(patch.blocked.is_unset());
        assert!(patch.role.is_unset());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_empty_user_update() {
        let patch: UserUpdate = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch, UserUpdate::default());
    }

    #[test]
    fn test_field_write_to() {
        let mut record = Record::new();
        Field::Value(UserRole::Admin).write_to(&mut record, "role");
        Field::<bool>::Null.write_to(&mut record, "blocked");
        Field::<String>::Unset.write_to(&mut record, "name");

        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["role", "blocked"]);
        assert_eq!(record.get("role"), Some(&SqlValue::from("admin")));
        assert_eq!(record.get("blocked"), Some(&SqlValue::Null));
    }
}
