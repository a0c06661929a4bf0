//! Generic CRUD over simple tables.
//!
//! A [`Repository`] turns typed calls into statements with the builders in
//! [`crate::db`], runs them through [`Db`] and rebuilds entities with
//! [`Entity::from_row`]. Payloads are turned into columns by [`Normalize`].

pub mod users;

pub use users::UserRepository;

use crate::db::{
    Connect, Db, PgConnector, Record, Row, SelectOptions, SqlValue, build_delete, build_insert,
    build_select, build_update,
};
use crate::error::{DbError, DbResult};
use std::marker::PhantomData;

/// Primary key column shared by every repository table.
pub const PRIMARY_KEY: &str = "id";

/// A value rebuilt from one fetched row.
pub trait Entity: Sized + Send {
    /// Builds the entity from `row`.
    ///
    /// # Errors
    /// Returns [`DbError::Decode`] when a column is missing or has the wrong type.
    fn from_row(row: &Row) -> DbResult<Self>;
}

/// Payloads that can be flattened into columns for INSERT and UPDATE.
///
/// Implementations drop fields that were not set.
pub trait Normalize {
    /// Returns the columns to write, in order.
    ///
    /// # Errors
    /// Returns [`DbError::TypeMismatch`] for payload shapes that have no
    /// column mapping.
    fn normalize(&self) -> DbResult<Record>;
}

impl Normalize for Record {
    fn normalize(&self) -> DbResult<Record> {
        Ok(self.clone().without_nulls())
    }
}

impl Normalize for serde_json::Value {
    fn normalize(&self) -> DbResult<Record> {
        let serde_json::Value::Object(map) = self else {
            return Err(DbError::TypeMismatch(format!(
                "expected a JSON object, found {}",
                json_kind(self)
            )));
        };

        let mut record = Record::with_capacity(map.len());
        for (column, value) in map {
            let value = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::Bool(b) => SqlValue::Bool(*b),
                serde_json::Value::Number(n) => number_value(column, n)?,
                serde_json::Value::String(s) => SqlValue::Text(s.clone()),
                nested => SqlValue::Json(nested.clone()),
            };
            record.insert(column.as_str(), value);
        }
        Ok(record)
    }
}

// Integers must fit `i64`; only genuine floats become `Float`.
fn number_value(column: &str, n: &serde_json::Number) -> DbResult<SqlValue> {
    if let Some(i) = n.as_i64() {
        return Ok(SqlValue::Int(i));
    }
    match n.as_f64() {
        Some(f) if n.is_f64() => Ok(SqlValue::Float(f)),
        _ => Err(DbError::TypeMismatch(format!(
            "`{}`: {} does not fit a 64-bit signed integer",
            column, n
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// What an INSERT should hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Returning {
    /// Nothing; only the affected-row count.
    Nothing,
    /// The new primary key, followed by a fetch of the full entity.
    #[default]
    Id,
    /// Every column of the new row.
    All,
}

/// Result of [`Repository::insert_with`].
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted<E> {
    /// The fully populated entity.
    Entity(E),
    /// The returned row, when the follow-up fetch found nothing.
    Row(Row),
    /// No row came back; carries the affected-row count.
    Affected(u64),
}

impl<E> Inserted<E> {
    /// Returns the entity, if one was produced.
    pub fn into_entity(self) -> Option<E> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }
}

/// Filtering, ordering and paging for [`Repository::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Exact-match conditions joined with `AND`.
    pub filter: Option<Record>,
    /// Trusted `ORDER BY` expression; the repository default applies when `None`.
    pub order_by: Option<String>,
    /// Maximum number of rows.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
}

impl ListQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to rows matching `filter`.
    #[must_use]
    pub fn filter(mut self, filter: Record) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Overrides the ordering.
    #[must_use]
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Sets limit and offset.
    #[must_use]
    pub fn page(mut self, limit: Option<u32>, offset: Option<u32>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// CRUD helper for one table whose rows map to `E`.
pub struct Repository<E, C: Connect = PgConnector> {
    db: Db<C>,
    table: &'static str,
    default_order: Option<&'static str>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, C: Connect> Clone for Repository<E, C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            table: self.table,
            default_order: self.default_order,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, C: Connect> Repository<E, C> {
    /// Creates a repository for `table`.
    #[must_use]
    pub fn new(db: Db<C>, table: &'static str) -> Self {
        Self {
            db,
            table,
            default_order: None,
            _entity: PhantomData,
        }
    }

    /// Sets the ordering used by [`Repository::list`] when the query has none.
    #[must_use]
    pub fn with_default_order(mut self, order_by: &'static str) -> Self {
        self.default_order = Some(order_by);
        self
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Underlying facade.
    #[must_use]
    pub fn db(&self) -> &Db<C> {
        &self.db
    }

    /// Fetches the entity with primary key `id`.
    ///
    /// # Errors
    /// Returns backend or decode errors. A missing row is `Ok(None)`.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<E>> {
        self.get_one(&Record::new().with(PRIMARY_KEY, id)).await
    }

    /// Fetches the first entity matching `filter`.
    ///
    /// # Errors
    /// Returns backend or decode errors. A missing row is `Ok(None)`.
    pub async fn get_one(&self, filter: &Record) -> DbResult<Option<E>> {
        let statement = build_select(
            self.table,
            &SelectOptions {
                filter: Some(filter),
                limit: Some(1),
                ..SelectOptions::default()
            },
        );
        self.db
            .fetch_one(&statement)
            .await?
            .as_ref()
            .map(E::from_row)
            .transpose()
    }

    /// Lists entities in backend order.
    ///
    /// # Errors
    /// Returns backend or decode errors.
    pub async fn list(&self, query: &ListQuery) -> DbResult<Vec<E>> {
        let statement = build_select(
            self.table,
            &SelectOptions {
                filter: query.filter.as_ref(),
                order_by: query.order_by.as_deref().or(self.default_order),
                limit: query.limit,
                offset: query.offset,
                ..SelectOptions::default()
            },
        );
        let rows = self.db.fetch_all(&statement).await?;
        rows.iter().map(E::from_row).collect()
    }

    /// Inserts `payload` and returns the stored entity.
    ///
    /// Equivalent to [`Repository::insert_with`] with [`Returning::Id`].
    ///
    /// # Errors
    /// See [`Repository::insert_with`].
    pub async fn insert<P>(&self, payload: &P) -> DbResult<Option<E>>
    where
        P: Normalize + Sync + ?Sized,
    {
        Ok(self.insert_with(payload, Returning::Id).await?.into_entity())
    }

    /// Inserts `payload`, returning what `returning` asks for.
    ///
    /// # Errors
    /// Returns [`DbError::EmptyPayload`] if the payload has no columns,
    /// normalization errors, and backend errors unchanged.
    pub async fn insert_with<P>(&self, payload: &P, returning: Returning) -> DbResult<Inserted<E>>
    where
        P: Normalize + Sync + ?Sized,
    {
        let data = payload.normalize()?;
        if data.is_empty() {
            return Err(DbError::EmptyPayload {
                table: self.table.to_string(),
            });
        }

        match returning {
            Returning::Nothing => {
                let statement = build_insert(self.table, &data, None);
                Ok(Inserted::Affected(self.db.execute(&statement).await?))
            }
            Returning::All => {
                let statement = build_insert(self.table, &data, Some("*"));
                match self.db.fetch_one(&statement).await? {
                    Some(row) => Ok(Inserted::Entity(E::from_row(&row)?)),
                    None => Ok(Inserted::Affected(0)),
                }
            }
            Returning::Id => {
                let statement = build_insert(self.table, &data, Some(PRIMARY_KEY));
                let Some(row) = self.db.fetch_one(&statement).await? else {
                    return Ok(Inserted::Affected(0));
                };
                let id: i64 = row.try_get(PRIMARY_KEY)?;
                Ok(match self.get_by_id(id).await? {
                    Some(entity) => Inserted::Entity(entity),
                    None => Inserted::Row(row),
                })
            }
        }
    }

    /// Applies the set fields of `patch` to row `id` and returns the row
    /// afterwards.
    ///
    /// A patch with no set fields issues no UPDATE and behaves like
    /// [`Repository::get_by_id`].
    ///
    /// # Errors
    /// Returns normalization, backend or decode errors.
    pub async fn update<P>(&self, id: i64, patch: &P) -> DbResult<Option<E>>
    where
        P: Normalize + Sync + ?Sized,
    {
        let data = patch.normalize()?;
        if !data.is_empty() {
            let filter = Record::new().with(PRIMARY_KEY, id);
            self.db.execute(&build_update(self.table, &data, &filter)).await?;
        }
        self.get_by_id(id).await
    }

    /// Deletes row `id` and returns the affected-row count; 0 means not found.
    ///
    /// # Errors
    /// Returns backend errors unchanged.
    pub async fn delete(&self, id: i64) -> DbResult<u64> {
        let filter = Record::new().with(PRIMARY_KEY, id);
        self.db.execute(&build_delete(self.table, &filter)).await
    }
}
