// ABOUTME: PgRecordStore - the record store backed by a PostgreSQL table
// ABOUTME: Builds upsert/update/delete queries and installs the change-notify trigger

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::Client;

use super::{RecordStore, WriteOrigin};
use crate::error::SyncError;
use crate::sync::row::Row;
use crate::utils::{quote_ident, quote_literal, validate_postgres_identifier};

/// Session setting that carries the write origin into the notify trigger.
pub const ORIGIN_SETTING: &str = "sheet_sync.origin";

/// Columns read back from the table, in `Row` order. Every value comes back
/// as text so the row can be normalized the same way as sheet cells.
const RETURNING_COLUMNS: &str =
    "\"id\"::text, COALESCE(\"name\", ''), COALESCE(\"age\"::text, ''), COALESCE(\"email\", '')";

/// Record store over a `(id, name, age, email)` table.
///
/// Owns its connection. Callers serialize access (the orchestrator holds a
/// lock around every batch), which keeps the session-level write origin
/// consistent with the statements that follow it.
pub struct PgRecordStore {
    client: Client,
    schema: String,
    table: String,
}

impl PgRecordStore {
    /// Wrap a connected client. Schema and table must be valid identifiers.
    pub fn new(client: Client, schema: &str, table: &str) -> Result<Self> {
        validate_postgres_identifier(schema).context("Invalid schema name")?;
        validate_postgres_identifier(table).context("Invalid table name")?;
        Ok(Self {
            client,
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn qualified(&self) -> String {
        qualified_name(&self.schema, &self.table)
    }
}

fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn row_from_pg(row: &tokio_postgres::Row) -> Row {
    Row::new(
        row.get::<_, String>(0),
        row.get::<_, String>(1),
        row.get::<_, String>(2),
        row.get::<_, String>(3),
    )
}

/// Build the plain insert used by manual creates.
fn build_insert_query(qualified: &str) -> String {
    format!(
        "INSERT INTO {} (\"id\", \"name\", \"age\", \"email\") \
         VALUES ($1, $2, NULLIF($3::text, '')::integer, $4) \
         RETURNING {}",
        qualified, RETURNING_COLUMNS
    )
}

/// Build the upsert used by inbound sync.
///
/// ```sql
/// INSERT INTO "schema"."table" ("id", "name", "age", "email")
/// VALUES ($1, $2, NULLIF($3::text, '')::integer, $4)
/// ON CONFLICT ("id") DO UPDATE SET
///   "name" = EXCLUDED."name", "age" = EXCLUDED."age", "email" = EXCLUDED."email"
/// ```
fn build_upsert_query(qualified: &str) -> String {
    let update_columns: Vec<String> = ["name", "age", "email"]
        .iter()
        .map(|c| format!("\"{}\" = EXCLUDED.\"{}\"", c, c))
        .collect();

    format!(
        "INSERT INTO {} (\"id\", \"name\", \"age\", \"email\") \
         VALUES ($1, $2, NULLIF($3::text, '')::integer, $4) \
         ON CONFLICT (\"id\") DO UPDATE SET {}",
        qualified,
        update_columns.join(", ")
    )
}

fn build_update_query(qualified: &str) -> String {
    format!(
        "UPDATE {} SET \"name\" = $2, \"age\" = NULLIF($3::text, '')::integer, \"email\" = $4 \
         WHERE \"id\" = $1 RETURNING {}",
        qualified, RETURNING_COLUMNS
    )
}

fn build_delete_query(qualified: &str) -> String {
    format!(
        "DELETE FROM {} WHERE \"id\" = $1 RETURNING {}",
        qualified, RETURNING_COLUMNS
    )
}

fn build_select_all_query(qualified: &str) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY \"id\"",
        RETURNING_COLUMNS, qualified
    )
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, row: &Row) -> Result<Row, SyncError> {
        let query = build_insert_query(&self.qualified());
        let inserted = self
            .client
            .query_one(&query, &[&row.id, &row.name, &row.age, &row.email])
            .await?;
        Ok(row_from_pg(&inserted))
    }

    async fn upsert(&self, row: &Row) -> Result<(), SyncError> {
        let query = build_upsert_query(&self.qualified());
        self.client
            .execute(&query, &[&row.id, &row.name, &row.age, &row.email])
            .await?;
        Ok(())
    }

    async fn update(&self, row: &Row) -> Result<Option<Row>, SyncError> {
        let query = build_update_query(&self.qualified());
        let updated = self
            .client
            .query_opt(&query, &[&row.id, &row.name, &row.age, &row.email])
            .await?;
        Ok(updated.as_ref().map(row_from_pg))
    }

    async fn delete(&self, id: &str) -> Result<Option<Row>, SyncError> {
        let query = build_delete_query(&self.qualified());
        let deleted = self.client.query_opt(&query, &[&id]).await?;
        Ok(deleted.as_ref().map(row_from_pg))
    }

    async fn select_all(&self) -> Result<Vec<Row>, SyncError> {
        let query = build_select_all_query(&self.qualified());
        let rows = self.client.query(&query, &[]).await?;
        Ok(rows.iter().map(row_from_pg).collect())
    }

    async fn set_write_origin(&self, origin: WriteOrigin) -> Result<(), SyncError> {
        self.client
            .execute(
                "SELECT set_config($1, $2, false)",
                &[&ORIGIN_SETTING, &origin.as_str()],
            )
            .await?;
        Ok(())
    }
}

/// DDL for the synced table, its notify function and trigger.
///
/// The trigger fires once per statement and sends the current write origin
/// (or `external` when none is set) on `channel`.
fn build_schema_ddl(schema: &str, table: &str, channel: &str) -> String {
    let qualified = qualified_name(schema, table);
    let function = qualified_name(schema, &format!("{}_notify_change", table));
    let trigger = quote_ident(&format!("{}_notify_change", table));

    format!(
        r#"
        CREATE SCHEMA IF NOT EXISTS {schema_ident};
        CREATE TABLE IF NOT EXISTS {qualified} (
            "id" TEXT PRIMARY KEY,
            "name" TEXT,
            "age" INTEGER,
            "email" TEXT
        );
        CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $$
        BEGIN
            PERFORM pg_notify(
                {channel},
                COALESCE(NULLIF(current_setting({setting}, true), ''), 'external')
            );
            RETURN NULL;
        END;
        $$ LANGUAGE plpgsql;
        DROP TRIGGER IF EXISTS {trigger} ON {qualified};
        CREATE TRIGGER {trigger}
            AFTER INSERT OR UPDATE OR DELETE ON {qualified}
            FOR EACH STATEMENT EXECUTE FUNCTION {function}();
        "#,
        schema_ident = quote_ident(schema),
        qualified = qualified,
        function = function,
        trigger = trigger,
        channel = quote_literal(channel),
        setting = quote_literal(ORIGIN_SETTING),
    )
}

/// Create the table if missing and (re)install the change-notify trigger.
pub async fn ensure_schema(client: &Client, schema: &str, table: &str, channel: &str) -> Result<()> {
    validate_postgres_identifier(schema).context("Invalid schema name")?;
    validate_postgres_identifier(table).context("Invalid table name")?;
    validate_postgres_identifier(channel).context("Invalid notification channel name")?;

    tracing::info!(
        "Ensuring table {}.{} and notify trigger on channel '{}'",
        schema,
        table,
        channel
    );

    client
        .batch_execute(&build_schema_ddl(schema, table, channel))
        .await
        .with_context(|| format!("Failed to install schema for {}.{}", schema, table))?;

    Ok(())
}
