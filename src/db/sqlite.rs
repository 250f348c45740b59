use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use super::store::{Collection, Direction, Filter, ListQuery, Record, RecordStore, StoreError};

/// `RecordStore` over a single SQLite table of JSON documents.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        Ok(Self::new(super::init_db(path)?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let mut sql = String::from("SELECT body FROM records WHERE collection = ?");
        let mut args = vec![SqlValue::Text(collection.as_str().to_string())];

        if let Some(filter) = &query.filter {
            sql.push_str(" AND ");
            compile_filter(filter, &mut sql, &mut args)?;
        }

        match &query.order_by {
            Some(order) => {
                let direction = match order.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                sql.push_str(&format!(" ORDER BY json_extract(body, ?) {direction}, seq ASC"));
                args.push(SqlValue::Text(json_path(&order.field)?));
            }
            None => sql.push_str(" ORDER BY seq ASC"),
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            args.push(SqlValue::Integer(limit as i64));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))?;

        let mut records = vec![];
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.conn()?;
        fetch(&conn, collection, id)
    }

    async fn create(&self, collection: Collection, record: Record) -> Result<Record, StoreError> {
        let mut record = record;
        let id = match record.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                let id = Uuid::new_v4().to_string();
                record.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let body = serde_json::to_string(&record)?;

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO records (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection.as_str(), id, body],
        );

        match inserted {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Duplicate {
                    collection: collection.as_str(),
                    id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
    ) -> Result<Record, StoreError> {
        let conn = self.conn()?;
        apply_patch(&conn, collection, id, None, patch)
    }

    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        guard: &Filter,
        patch: Record,
    ) -> Result<Record, StoreError> {
        let conn = self.conn()?;
        apply_patch(&conn, collection, id, Some(guard), patch)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
        )?;
        if count == 0 {
            return Err(not_found(collection, id));
        }
        Ok(())
    }
}

fn fetch(conn: &Connection, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
            |row| row.get(0),
        )
        .optional()?;

    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

fn apply_patch(
    conn: &Connection,
    collection: Collection,
    id: &str,
    guard: Option<&Filter>,
    patch: Record,
) -> Result<Record, StoreError> {
    let mut patch = patch;
    // ids are immutable
    patch.remove("id");
    let patch_json = serde_json::to_string(&patch)?;

    let mut sql = String::from(
        "UPDATE records SET body = json_patch(body, ?), updated_at = datetime('now') \
         WHERE collection = ? AND id = ?",
    );
    let mut args = vec![
        SqlValue::Text(patch_json),
        SqlValue::Text(collection.as_str().to_string()),
        SqlValue::Text(id.to_string()),
    ];
    if let Some(guard) = guard {
        sql.push_str(" AND ");
        compile_filter(guard, &mut sql, &mut args)?;
    }

    let changed = conn.execute(&sql, params_from_iter(args.iter()))?;
    if changed == 0 {
        return match fetch(conn, collection, id)? {
            Some(_) => Err(StoreError::Conflict {
                collection: collection.as_str(),
                id: id.to_string(),
            }),
            None => Err(not_found(collection, id)),
        };
    }

    fetch(conn, collection, id)?.ok_or_else(|| not_found(collection, id))
}

fn not_found(collection: Collection, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.as_str(),
        id: id.to_string(),
    }
}

fn json_path(field: &str) -> Result<String, StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::InvalidQuery(format!("bad field name: {field:?}")));
    }
    Ok(format!("$.{field}"))
}

fn compile_filter(
    filter: &Filter,
    sql: &mut String,
    args: &mut Vec<SqlValue>,
) -> Result<(), StoreError> {
    match filter {
        Filter::Eq(field, value) => {
            let path = json_path(field)?;
            match scalar(value)? {
                Some(value) => {
                    sql.push_str("json_extract(body, ?) = ?");
                    args.push(SqlValue::Text(path));
                    args.push(value);
                }
                None => {
                    sql.push_str("json_extract(body, ?) IS NULL");
                    args.push(SqlValue::Text(path));
                }
            }
        }
        Filter::IsNull(field) => {
            sql.push_str("json_extract(body, ?) IS NULL");
            args.push(SqlValue::Text(json_path(field)?));
        }
        Filter::And(parts) | Filter::Or(parts) => {
            let is_and = matches!(filter, Filter::And(_));
            if parts.is_empty() {
                sql.push_str(if is_and { "1" } else { "0" });
                return Ok(());
            }
            let joiner = if is_and { " AND " } else { " OR " };
            sql.push('(');
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    sql.push_str(joiner);
                }
                compile_filter(part, sql, args)?;
            }
            sql.push(')');
        }
    }
    Ok(())
}

/// json_extract hands booleans back as 0/1, so they are compared as integers.
fn scalar(value: &Value) -> Result<Option<SqlValue>, StoreError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(SqlValue::Integer(*b as i64))),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Some(SqlValue::Integer(i))),
            (None, Some(f)) => Ok(Some(SqlValue::Real(f))),
            _ => Err(StoreError::InvalidQuery(format!("unsupported number: {n}"))),
        },
        Value::String(s) => Ok(Some(SqlValue::Text(s.clone()))),
        Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidQuery(
            "only scalar values can be compared".to_string(),
        )),
    }
}
