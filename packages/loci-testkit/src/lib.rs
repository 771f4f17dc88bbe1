//! Throwaway Postgres databases and Qdrant collections for the ignored integration tests.

mod error;

pub use error::{Error, Result};

use std::{env, future::Future, str::FromStr, thread, time::Duration};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];
const QDRANT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn env_dsn() -> Option<String> {
	env::var("LOCI_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("LOCI_QDRANT_URL").ok()
}

fn unique_name(prefix: &str) -> String {
	format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Runs `cleanup` to completion from `Drop`, where the test runtime may already be gone.
fn finish_on_fresh_runtime<F>(what: &'static str, cleanup: F)
where
	F: Future<Output = Result<()>> + Send + 'static,
{
	let handle = thread::spawn(move || {
		let outcome = Builder::new_current_thread()
			.enable_all()
			.build()
			.map_err(|err| Error::Message(err.to_string()))
			.and_then(|runtime| runtime.block_on(cleanup));

		if let Err(err) = outcome {
			eprintln!("Dropping {what} failed: {err}.");
		}
	});
	let _ = handle.join();
}

/// A `loci_test_*` database created next to the one `LOCI_PG_DSN` points at.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("LOCI_PG_DSN is not a valid DSN: {err}.")))?;
		let (maintenance, mut conn) = maintenance_connection(&base).await?;
		let name = unique_name("loci_test");

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn postgres_config(&self) -> loci_config::Postgres {
		loci_config::Postgres { dsn: self.dsn.clone(), pool_max_conns: 2 }
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(self.name.clone(), self.maintenance.clone()).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if !self.dropped {
			finish_on_fresh_runtime(
				"test database",
				drop_database(self.name.clone(), self.maintenance.clone()),
			);
		}
	}
}

/// A uniquely named place collection on the Qdrant instance at `LOCI_QDRANT_URL`.
pub struct TestCollection {
	url: String,
	name: String,
	vector_dim: u32,
	deleted: bool,
}
impl TestCollection {
	pub fn new(url: &str, vector_dim: u32) -> Self {
		Self {
			url: url.to_string(),
			name: unique_name("loci_test_places"),
			vector_dim,
			deleted: false,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn qdrant_config(&self) -> loci_config::Qdrant {
		loci_config::Qdrant {
			url: self.url.clone(),
			collection: self.name.clone(),
			vector_dim: self.vector_dim,
		}
	}

	pub async fn cleanup(mut self) -> Result<()> {
		delete_collection(self.url.clone(), self.name.clone()).await?;

		self.deleted = true;

		Ok(())
	}
}
impl Drop for TestCollection {
	fn drop(&mut self) {
		if !self.deleted {
			finish_on_fresh_runtime(
				"test collection",
				delete_collection(self.url.clone(), self.name.clone()),
			);
		}
	}
}

async fn maintenance_connection(
	base: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut failures = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => failures.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Message(format!("No maintenance database reachable ({}).", failures.join("; "))))
}

async fn drop_database(name: String, maintenance: PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(&maintenance).await?;

	// Pool connections from the test may still be open.
	sqlx::query(
		"SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
		 WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(&name)
	.fetch_all(&mut conn)
	.await?;
	sqlx::query(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str()).execute(&mut conn).await?;

	Ok(())
}

async fn delete_collection(url: String, name: String) -> Result<()> {
	let client = Qdrant::from_url(&url).build()?;

	time::timeout(QDRANT_TIMEOUT, client.delete_collection(name.clone()))
		.await
		.map_err(|_| Error::Message(format!("Timed out deleting Qdrant collection {name:?}.")))??;

	Ok(())
}
