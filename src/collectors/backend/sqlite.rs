use super::{Connection, Connector, text_row};
use crate::{collectors::RawRow, config::Instance};
use anyhow::Result;
use futures::{StreamExt, future::BoxFuture, stream::BoxStream};
use secrecy::ExposeSecret;
use sqlx::{ConnectOptions, SqliteConnection, sqlite::SqliteConnectOptions};
use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::debug;

/// Virtual machine steps between two checks of the interrupt flag.
const PROGRESS_STEPS: i32 = 1000;

/// Connector for `sqlite` instances. Credentials do not apply and are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<Box<dyn Connection>>> {
        Box::pin(async move {
            if instance.user.is_some() || instance.password.is_some() {
                debug!(instance = %instance.name, "sqlite ignores user/password");
            }

            let conn = SqliteConnectOptions::from_str(instance.dsn.expose_secret())?
                .connect()
                .await?;

            Ok(Box::new(SqliteSession::new(conn).await?) as Box<dyn Connection>)
        })
    }
}

/// A sqlite connection whose running statement can be aborted from another
/// task.
///
/// Statements run on sqlx's worker thread, so dropping the row stream does
/// not stop them. A progress handler polls `interrupted` instead and makes
/// sqlite return `SQLITE_INTERRUPT` once it is set. The flag is never
/// cleared: an interrupted session is dropped.
struct SqliteSession {
    conn: SqliteConnection,
    interrupted: Arc<AtomicBool>,
}

impl SqliteSession {
    async fn new(mut conn: SqliteConnection) -> Result<Self> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);

        conn.lock_handle()
            .await?
            .set_progress_handler(PROGRESS_STEPS, move || !flag.load(Ordering::Relaxed));

        Ok(Self { conn, interrupted })
    }
}

impl Connection for SqliteSession {
    fn ping(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(sqlx::Connection::ping(&mut self.conn).await?) })
    }

    fn query<'a>(&'a mut self, sql: &'a str) -> BoxStream<'a, Result<RawRow>> {
        sqlx::Executor::fetch(&mut self.conn, sql)
            .map(|row| text_row(&row?))
            .boxed()
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move { Ok(sqlx::Connection::close(self.conn).await?) })
    }
}
