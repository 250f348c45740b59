use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored document. Every record carries a string `id`.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Providers,
    Services,
    Categories,
    Bookings,
    Reviews,
    Sessions,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Providers => "providers",
            Collection::Services => "services",
            Collection::Categories => "service_categories",
            Collection::Bookings => "bookings",
            Collection::Reviews => "reviews",
            Collection::Sessions => "sessions",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Matches a field that is null or absent.
    IsNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn is_null(field: &str) -> Self {
        Filter::IsNull(field.to_string())
    }

    /// `field` equal to `value`, or absent. For fields the models default
    /// to `value` when a record omits them.
    pub fn eq_or_missing(field: &str, value: impl Into<Value>) -> Self {
        Filter::Or(vec![Filter::eq(field, value), Filter::is_null(field)])
    }

    /// `field` equal to any of `values`.
    pub fn any_of<V: Into<Value> + Clone>(field: &str, values: &[V]) -> Self {
        Filter::Or(values.iter().cloned().map(|v| Filter::eq(field, v)).collect())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// `list` arguments. Without an order, records come back in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Option<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn newest_first(self) -> Self {
        self.order_by("created_at", Direction::Desc)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{collection} record {id} did not match the update precondition")]
    Conflict { collection: &'static str, id: String },

    #[error("{collection} record {id} already exists")]
    Duplicate { collection: &'static str, id: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Document store shared by every surface of the app.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, collection: Collection, query: &ListQuery)
        -> Result<Vec<Record>, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError>;

    /// Inserts `record`, assigning an id when it has none.
    async fn create(&self, collection: Collection, record: Record) -> Result<Record, StoreError>;

    /// Merges `patch` into the stored record. A `null` in the patch removes the field.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
    ) -> Result<Record, StoreError>;

    /// Like `update`, but only applies when the stored record matches `guard`.
    /// Fails with `StoreError::Conflict` otherwise.
    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        guard: &Filter,
        patch: Record,
    ) -> Result<Record, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;
}
