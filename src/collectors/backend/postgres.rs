use super::{Connection, Connector, sqlx_connection};
use crate::config::Instance;
use anyhow::Result;
use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use sqlx::{ConnectOptions, PgConnection, postgres::PgConnectOptions};
use std::str::FromStr;

sqlx_connection!(PgConnection);

/// Connector for `postgres` instances.
///
/// Separate `user`/`password` settings take precedence over the DSN.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    /// Connect options for `instance`.
    ///
    /// # Errors
    ///
    /// Returns an error if the DSN does not parse.
    pub fn options(instance: &Instance) -> Result<PgConnectOptions> {
        let mut options = PgConnectOptions::from_str(instance.dsn.expose_secret())?
            .application_name(env!("CARGO_PKG_NAME"));

        if let Some(user) = &instance.user {
            options = options.username(user);
        }

        if let Some(password) = &instance.password {
            options = options.password(password.expose_secret());
        }

        Ok(options)
    }
}

impl Connector for PostgresConnector {
    fn connect<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<Box<dyn Connection>>> {
        Box::pin(async move {
            let conn = Self::options(instance)?.connect().await?;
            Ok(Box::new(conn) as Box<dyn Connection>)
        })
    }
}
