use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use sqlx::{
	Column, PgPool, Postgres, Row, TypeInfo,
	postgres::{PgArguments, PgPoolOptions, PgRow},
	query::Query,
};

use loci_domain::{assemble::AssembledQuery, compile::SqlValue};

use crate::{Error, Result, schema};

const SCHEMA_LOCK_ID: i64 = 5_620_431;

/// Rows returned by one relational query, decoded into JSON maps keyed by column alias.
#[derive(Clone, Debug, Default)]
pub struct FetchedRows {
	pub rows: Vec<Map<String, Value>>,
	pub elapsed: Duration,
}

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &loci_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	pub async fn fetch(&self, query: &AssembledQuery) -> Result<FetchedRows> {
		let started = Instant::now();
		let rows = bind_all(sqlx::query(&query.sql), query.params.values())
			.fetch_all(&self.pool)
			.await?;
		let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
		let elapsed = started.elapsed();

		tracing::debug!(
			rows = rows.len(),
			elapsed_ms = elapsed.as_millis() as u64,
			"Relational query finished."
		);

		Ok(FetchedRows { rows, elapsed })
	}

	pub async fn count(&self, query: &AssembledQuery) -> Result<u64> {
		let row = bind_all(sqlx::query(&query.sql), query.params.values())
			.fetch_one(&self.pool)
			.await?;
		let total: i64 = row.try_get("total")?;

		u64::try_from(total).map_err(|_| Error::InvalidArgument(format!("Negative count {total}.")))
	}
}

fn bind_all<'q>(
	mut query: Query<'q, Postgres, PgArguments>,
	params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
	for value in params {
		query = match value {
			SqlValue::Text(text) => query.bind(text.as_str()),
			SqlValue::Int(number) => query.bind(*number),
			SqlValue::Float(number) => query.bind(*number),
			SqlValue::Bool(flag) => query.bind(*flag),
			SqlValue::IntArray(ids) => query.bind(ids.as_slice()),
		};
	}

	query
}

fn decode_row(row: &PgRow) -> Result<Map<String, Value>> {
	let mut out = Map::with_capacity(row.columns().len());

	for column in row.columns() {
		let index = column.ordinal();
		let type_name = column.type_info().name();
		let value = match type_name {
			"BOOL" => json(row.try_get::<Option<bool>, _>(index)?),
			"INT2" => json(row.try_get::<Option<i16>, _>(index)?),
			"INT4" => json(row.try_get::<Option<i32>, _>(index)?),
			"INT8" => json(row.try_get::<Option<i64>, _>(index)?),
			"FLOAT4" => json(row.try_get::<Option<f32>, _>(index)?),
			"FLOAT8" => json(row.try_get::<Option<f64>, _>(index)?),
			"TEXT" | "VARCHAR" | "BPCHAR" | "NAME" =>
				json(row.try_get::<Option<String>, _>(index)?),
			"JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?.unwrap_or(Value::Null),
			"TEXT[]" | "VARCHAR[]" => json(row.try_get::<Option<Vec<String>>, _>(index)?),
			"INT8[]" => json(row.try_get::<Option<Vec<i64>>, _>(index)?),
			other =>
				return Err(Error::UnsupportedColumn {
					column: column.name().to_string(),
					type_name: other.to_string(),
				}),
		};

		out.insert(column.name().to_string(), value);
	}

	Ok(out)
}

fn json<T>(value: Option<T>) -> Value
where
	T: Into<Value>,
{
	value.map(Into::into).unwrap_or(Value::Null)
}
