use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::query::{Filter, path_segments};
use crate::store::validate_path;
use crate::{
    Document, DocumentQuery, Result, StoreError, Version,
    store::{DocumentStore, FieldUpdate},
};

const SELECT_COLUMNS: &str = "collection, id, version, created_at, updated_at, body";

/// PostgreSQL-backed document store implementation.
///
/// Documents are kept as JSONB rows keyed by `(collection, id)`.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_document(row: PgRow) -> Result<Document> {
        Ok(Document {
            collection: row.try_get("collection")?,
            id: row.try_get("id")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            body: row.try_get("body")?,
        })
    }

    /// Appends the filter predicates of a query, numbering parameters from `first_param`.
    fn push_filters(sql: &mut String, query: &DocumentQuery, first_param: usize) -> usize {
        let mut param = first_param;
        for filter in &query.filters {
            sql.push_str(" AND ");
            sql.push_str(&Self::predicate(filter, &mut param));
        }
        param
    }

    /// Renders one filter. Parameters are numbered in the order
    /// [`bind_filter`](Self::bind_filter) binds them.
    fn predicate(filter: &Filter, param: &mut usize) -> String {
        fn next(param: &mut usize) -> usize {
            let current = *param;
            *param += 1;
            current
        }

        match filter {
            Filter::Eq { .. } => {
                let (path, value) = (next(param), next(param));
                format!("body #> ${path}::text[] = ${value}::jsonb")
            }
            Filter::Contains { .. } => {
                let (path, value) = (next(param), next(param));
                format!("body #> ${path}::text[] @> ${value}::jsonb")
            }
            Filter::Range { .. } => {
                let (path, min, max) = (next(param), next(param), next(param));
                format!(
                    "CASE WHEN jsonb_typeof(body #> ${path}::text[]) = 'number' \
                     THEN (body #>> ${path}::text[])::numeric BETWEEN ${min}::bigint AND ${max}::bigint \
                     ELSE false END"
                )
            }
            Filter::Text { paths, .. } => {
                let pattern = next(param);
                let clauses: Vec<String> = paths
                    .iter()
                    .map(|_| {
                        let path = next(param);
                        format!(
                            "(jsonb_typeof(body #> ${path}::text[]) = 'string' \
                             AND body #>> ${path}::text[] ILIKE ${pattern})"
                        )
                    })
                    .collect();
                disjunction(clauses)
            }
            Filter::Any(filters) => disjunction(
                filters
                    .iter()
                    .map(|f| Self::predicate(f, param))
                    .collect(),
            ),
        }
    }

    fn bind_filters<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        filters: &[Filter],
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        filters.iter().fold(query, Self::bind_filter)
    }

    fn bind_filter<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        filter: &Filter,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match filter {
            Filter::Eq { path, value } => query.bind(path_segments(path)).bind(value.clone()),
            Filter::Contains { path, value } => query
                .bind(path_segments(path))
                .bind(serde_json::Value::Array(vec![value.clone()])),
            Filter::Range { path, min, max } => query
                .bind(path_segments(path))
                .bind(min.unwrap_or(i64::MIN))
                .bind(max.unwrap_or(i64::MAX)),
            Filter::Text { paths, needle } => paths
                .iter()
                .fold(query.bind(like_pattern(needle)), |q, path| {
                    q.bind(path_segments(path))
                }),
            Filter::Any(filters) => Self::bind_filters(query, filters),
        }
    }
}

/// ORs clauses together; no clauses never match.
fn disjunction(clauses: Vec<String>) -> String {
    if clauses.is_empty() {
        "false".to_string()
    } else {
        format!("({})", clauses.join(" OR "))
    }
}

/// Wraps `needle` in `%` wildcards with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM documents WHERE collection = $1 AND id = $2"
        ))
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn insert(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> Result<Document> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO documents (collection, id, version, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (collection, id) DO NOTHING
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(collection)
        .bind(id)
        .bind(Version::first().as_i64())
        .bind(&body)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_document(row),
            None => Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
        expected: Version,
    ) -> Result<Document> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE documents
            SET body = $3, version = version + 1, updated_at = NOW()
            WHERE collection = $1 AND id = $2 AND version = $4
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(collection)
        .bind(id)
        .bind(&body)
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_document(row);
        }

        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match actual {
            Some(actual) => {
                metrics::counter!("document_store_conflicts_total").increment(1);
                Err(StoreError::ConcurrencyConflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected,
                    actual: Version::new(actual),
                })
            }
            None => Err(StoreError::not_found(collection, id)),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, collection: &str, query: DocumentQuery) -> Result<Vec<Document>> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM documents WHERE collection = $1");
        let mut param = Self::push_filters(&mut sql, &query, 2);

        if query.newest_first {
            sql.push_str(" ORDER BY created_at DESC, insert_seq DESC");
        } else {
            sql.push_str(" ORDER BY created_at ASC, insert_seq ASC");
        }

        if query.limit.is_some() {
            sql.push_str(&format!(" LIMIT ${param}"));
            param += 1;
        }
        if query.offset.is_some() {
            sql.push_str(&format!(" OFFSET ${param}"));
        }

        let mut sqlx_query = Self::bind_filters(sqlx::query(&sql).bind(collection), &query.filters);
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        sqlx_query
            .fetch(&self.pool)
            .map_err(StoreError::Database)
            .and_then(|row| async move { Self::row_to_document(row) })
            .try_collect()
            .await
    }

    async fn count(&self, collection: &str, query: DocumentQuery) -> Result<usize> {
        let mut sql = "SELECT COUNT(*) FROM documents WHERE collection = $1".to_string();
        Self::push_filters(&mut sql, &query, 2);

        let row = Self::bind_filters(sqlx::query(&sql).bind(collection), &query.filters)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get(0)?;

        Ok(count as usize)
    }

    async fn add_to_field(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> Result<FieldUpdate> {
        if !validate_path(path) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();

        // The guard and the write are one statement, so concurrent
        // decrements can never take the field below the floor.
        let row = sqlx::query(&format!(
            r#"
            UPDATE documents
            SET body = jsonb_set(body, $3::text[], to_jsonb((body #>> $3::text[])::bigint + $4)),
                version = version + 1,
                updated_at = NOW()
            WHERE collection = $1 AND id = $2
              AND CASE WHEN jsonb_typeof(body #> $3::text[]) = 'number'
                       THEN ($5::bigint IS NULL OR (body #>> $3::text[])::numeric + $4 >= $5)
                       ELSE FALSE
                  END
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(collection)
        .bind(id)
        .bind(&segments)
        .bind(delta)
        .bind(floor)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(FieldUpdate::Applied(Self::row_to_document(row)?));
        }

        let doc = self
            .get(collection, id)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let current = doc.integer_at(path).ok_or_else(|| StoreError::NotNumeric {
            collection: collection.to_string(),
            id: id.to_string(),
            field: path.to_string(),
        })?;

        tracing::debug!(collection, id, path, delta, current, "guarded update rejected");
        Ok(FieldUpdate::Rejected { current })
    }

    async fn next_sequence(&self, name: &str) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
