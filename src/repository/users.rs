//! Users repository.

use super::{Entity, ListQuery, Normalize, Repository, Returning};
use crate::db::{Connect, Db, PgConnector, Record, Row};
use crate::error::{DbError, DbResult};
use crate::models::{User, UserCreate, UserUpdate};

/// Table backing [`User`].
pub const USERS_TABLE: &str = "users";

impl Entity for User {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            verified: row.try_get("verified")?,
            blocked: row.try_get("blocked")?,
            role: row.try_get_enum("role")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Normalize for UserCreate {
    fn normalize(&self) -> DbResult<Record> {
        Ok(Record::with_capacity(4)
            .with("name", self.name.as_str())
            .with("email", self.email.as_str())
            .with("password_hash", self.password_hash.as_str())
            .with("role", self.role))
    }
}

impl Normalize for UserUpdate {
    fn normalize(&self) -> DbResult<Record> {
        let mut record = Record::new();
        self.name.write_to(&mut record, "name");
        self.verified.write_to(&mut record, "verified");
        self.blocked.write_to(&mut record, "blocked");
        self.role.write_to(&mut record, "role");
        Ok(record)
    }
}

/// Data access for user accounts.
pub struct UserRepository<C: Connect = PgConnector> {
    repo: Repository<User, C>,
}

impl<C: Connect> Clone for UserRepository<C> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<C: Connect> UserRepository<C> {
    /// Creates the repository on top of `db`.
    #[must_use]
    pub fn new(db: Db<C>) -> Self {
        Self {
            repo: Repository::new(db, USERS_TABLE).with_default_order("id ASC"),
        }
    }

    /// Fetches a user by id.
    ///
    /// # Errors
    /// Returns backend or decode errors.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<User>> {
        self.repo.get_by_id(id).await
    }

    /// Fetches a user by e-mail address.
    ///
    /// # Errors
    /// Returns backend or decode errors.
    pub async fn get_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.repo.get_one(&Record::new().with("email", email)).await
    }

    /// Fetches the first user matching `filter`.
    ///
    /// # Errors
    /// Returns backend or decode errors.
    pub async fn get_one(&self, filter: &Record) -> DbResult<Option<User>> {
        self.repo.get_one(filter).await
    }

    /// Lists users ordered by id.
    ///
    /// # Errors
    /// Returns backend or decode errors.
    pub async fn list_users(
        &self,
        filter: Option<Record>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> DbResult<Vec<User>> {
        let query = ListQuery {
            filter,
            ..ListQuery::default()
        }
        .page(limit, offset);
        self.repo.list(&query).await
    }

    /// Creates a user and returns the stored row.
    ///
    /// # Errors
    /// A duplicate e-mail surfaces as a backend error for which
    /// [`DbError::is_unique_violation`] is `true`.
    pub async fn create(&self, payload: &UserCreate) -> DbResult<User> {
        self.repo
            .insert_with(payload, Returning::All)
            .await?
            .into_entity()
            .ok_or(DbError::Backend(sqlx::Error::RowNotFound))
    }

    /// Applies `patch` and returns the updated user, or `None` if it does not
    /// exist.
    ///
    /// # Errors
    /// Returns backend or decode errors.
    pub async fn update(&self, id: i64, patch: &UserUpdate) -> DbResult<Option<User>> {
        self.repo.update(id, patch).await
    }

    /// Deletes a user; returns the number of deleted rows.
    ///
    /// # Errors
    /// Returns backend errors unchanged.
    pub async fn delete(&self, id: i64) -> DbResult<u64> {
        self.repo.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlValue;
    use crate::db::testing::{MockBackend, mock_db};
    use crate::models::{Field, UserRole};
    use chrono::{TimeZone, Utc};

    fn user_row(id: i64, email: &str, role: &str) -> Row {
        Record::new()
            .with("id", id)
            .with("name", "Ada")
            .with("email", email)
            .with("verified", false)
            .with("blocked", false)
            .with("role", role)
            .with("created_at", Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    async fn users(backend: &MockBackend) -> UserRepository<MockBackend> {
        UserRepository::new(mock_db(backend).await)
    }

    #[test]
    fn test_user_from_row() {
        let user = User::from_row(&user_row(1, "ada@example.com", "admin")).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.role, UserRole::Admin);
        assert_eq!(user.created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_user_from_row_rejects_unknown_role() {
        let err = User::from_row(&user_row(1, "ada@example.com", "owner")).unwrap_err();
        assert!(matches!(err, DbError::Decode { ref column, .. } if column == "role"));
    }

    #[test]
    fn test_user_create_normalizes_role_label() {
        let payload = UserCreate {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "argon2$abc".to_string(),
            role: UserRole::Admin,
        };
        let record = payload.normalize().unwrap();

        assert_eq!(
            record.columns().collect::<Vec<_>>(),
            vec!["name", "email", "password_hash", "role"]
        );
        assert_eq!(record.get("role"), Some(&SqlValue::from("admin")));
    }

    #[test]
    fn test_user_update_normalizes_only_set_fields() {
        let patch = UserUpdate {
            blocked: Field::Value(true),
            name: Field::Null,
            ..UserUpdate::default()
        };
        let record = patch.normalize().unwrap();

        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["name", "blocked"]);
        assert_eq!(record.get("name"), Some(&SqlValue::Null));
    }

    #[tokio::test]
    async fn test_get_by_email() {
        let backend = MockBackend::new();
        let repo = users(&backend).await;
        backend.push_rows(vec![user_row(7, "ada@example.com", "player")]);

        let user = repo.get_by_email("ada@example.com").await.unwrap().unwrap();

        assert_eq!(user.id, 7);
        let executed = backend.executed();
        assert_eq!(executed[0].sql, "SELECT * FROM users WHERE email = %s LIMIT %s");
        assert_eq!(executed[0].params[0], SqlValue::from("ada@example.com"));
    }

    #[tokio::test]
    async fn test_create_returns_all_columns() {
        let backend = MockBackend::new();
        let repo = users(&backend).await;
        backend.push_rows(vec![user_row(8, "grace@example.com", "player")]);

        let created = repo
            .create(&UserCreate {
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                password_hash: "argon2$def".to_string(),
                role: UserRole::Player,
            })
            .await
            .unwrap();

        assert_eq!(created.id, 8);
        assert_eq!(
            backend.statements(),
            vec![
                "INSERT INTO users (name, email, password_hash, role) VALUES (%s, %s, %s, %s) RETURNING *"
            ]
        );
    }

    #[tokio::test]
    async fn test_create_without_returned_row_is_an_error() {
        let backend = MockBackend::new();
        let repo = users(&backend).await;

        let err = repo
            .create(&UserCreate {
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                password_hash: "argon2$def".to_string(),
                role: UserRole::Player,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Backend(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn test_update_with_empty_patch_issues_no_update() {
        let backend = MockBackend::new();
        let repo = users(&backend).await;
        backend.push_rows(vec![user_row(3, "ada@example.com", "player")]);

        let user = repo.update(3, &UserUpdate::default()).await.unwrap();

        assert_eq!(user.map(|u| u.id), Some(3));
        assert!(backend.statements().iter().all(|sql| sql.starts_with("SELECT")));
    }

    #[tokio::test]
    async fn test_update_writes_role_label() {
        let backend = MockBackend::new();
        let repo = users(&backend).await;
        backend.push_affected(1);
        backend.push_rows(vec![user_row(3, "ada@example.com", "admin")]);

        let patch = UserUpdate {
            role: Field::Value(UserRole::Admin),
            ..UserUpdate::default()
        };
        let user = repo.update(3, &patch).await.unwrap().unwrap();

        assert_eq!(user.role, UserRole::Admin);
        let executed = backend.executed();
        assert_eq!(executed[0].sql, "UPDATE users SET role = %s WHERE id = %s");
        assert_eq!(executed[0].params, vec![SqlValue::from("admin"), SqlValue::Int(3)]);
    }

    #[tokio::test]
    async fn test_list_users_orders_by_id() {
        let backend = MockBackend::new();
        let repo = users(&backend).await;
        backend.push_rows(vec![
            user_row(1, "a@example.com", "player"),
            user_row(2, "b@example.com", "admin"),
        ]);

        let listed = repo
            .list_users(Some(Record::new().with("blocked", false)), Some(50), None)
            .await
            .unwrap();

        assert_eq!(listed.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            backend.statements(),
            vec!["SELECT * FROM users WHERE blocked = %s ORDER BY id ASC LIMIT %s"]
        );
    }

    #[tokio::test]
    async fn test_delete_returns_count() {
        let backend = MockBackend::new();
        let repo = users(&backend).await;
        backend.push_affected(1);

        assert_eq!(repo.delete(3).await.unwrap(), 1);
    }
}
