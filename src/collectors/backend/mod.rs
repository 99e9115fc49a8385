//! Database backends behind one small capability set: connect, ping, query.
//!
//! Queries are always sent without bind arguments, which makes every sqlx
//! driver use its text protocol. Each column is then read back as text no
//! matter its SQL type, so the mapper only ever sees strings.

use super::sample::RawRow;
use crate::config::{BackendType, Instance};
use anyhow::Result;
use futures::{future::BoxFuture, stream::BoxStream};
use std::{collections::HashMap, sync::Arc};

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlConnector;
pub use postgres::PostgresConnector;
pub use sqlite::SqliteConnector;

/// Opens connections for one backend type.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<Box<dyn Connection>>>;
}

/// A single open database connection, owned by one scrape of one instance.
pub trait Connection: Send {
    fn ping(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Run `sql` and stream its rows in cursor order.
    fn query<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, Result<RawRow>>;

    /// Ask the backend to abort the statement in flight.
    ///
    /// Called after a query timed out, right before the connection is
    /// dropped. Must not block. Backends without a cheap way to cancel keep
    /// the default, which relies on the dropped socket.
    fn interrupt(&self) {}

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Read every column of `row` as text, NULL as an empty string.
pub(crate) fn text_row<R>(row: &R) -> Result<RawRow>
where
    R: sqlx::Row,
    usize: sqlx::ColumnIndex<R>,
    for<'r> Option<String>: sqlx::Decode<'r, R::Database>,
{
    let columns = row.columns();
    let mut raw = RawRow::with_capacity(columns.len());

    for (idx, column) in columns.iter().enumerate() {
        let value: Option<String> = row.try_get_unchecked(idx)?;
        raw.insert(
            sqlx::Column::name(column).to_string(),
            value.unwrap_or_default(),
        );
    }

    Ok(raw)
}

/// Implements [`Connection`] for a concrete sqlx connection type.
macro_rules! sqlx_connection {
    ($conn:ty) => {
        impl $crate::collectors::backend::Connection for $conn {
            fn ping(&mut self) -> futures::future::BoxFuture<'_, anyhow::Result<()>> {
                Box::pin(async move { Ok(sqlx::Connection::ping(self).await?) })
            }

            fn query<'a>(
                &'a mut self,
                sql: &'a str,
            ) -> futures::stream::BoxStream<'a, anyhow::Result<$crate::collectors::RawRow>> {
                use futures::StreamExt as _;

                sqlx::Executor::fetch(self, sql)
                    .map(|row| $crate::collectors::backend::text_row(&row?))
                    .boxed()
            }

            fn close(self: Box<Self>) -> futures::future::BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(async move { Ok(sqlx::Connection::close(*self).await?) })
            }
        }
    };
}

pub(crate) use sqlx_connection;

/// Connectors keyed by backend type, resolved once when endpoints are built.
#[derive(Clone)]
pub struct Connectors {
    connectors: HashMap<BackendType, Arc<dyn Connector>>,
}

impl Default for Connectors {
    /// The sqlx-backed connectors: postgres, mysql and sqlite.
    fn default() -> Self {
        Self::empty()
            .with(BackendType::Postgres, PostgresConnector)
            .with(BackendType::MySql, MySqlConnector)
            .with(BackendType::Sqlite, SqliteConnector)
    }
}

impl Connectors {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, backend: BackendType, connector: impl Connector + 'static) -> Self {
        self.connectors.insert(backend, Arc::new(connector));
        self
    }

    #[must_use]
    pub fn get(&self, backend: BackendType) -> Option<&Arc<dyn Connector>> {
        self.connectors.get(&backend)
    }

    #[must_use]
    pub fn supports(&self, backend: BackendType) -> bool {
        self.connectors.contains_key(&backend)
    }
}
