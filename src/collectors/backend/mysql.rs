use super::{Connection, Connector, sqlx_connection};
use crate::config::Instance;
use anyhow::Result;
use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use sqlx::{ConnectOptions, MySqlConnection, mysql::MySqlConnectOptions};
use std::str::FromStr;

sqlx_connection!(MySqlConnection);

/// Connector for `mysql` instances, `MariaDB` included.
#[derive(Clone, Copy, Debug, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    /// Connect options for `instance`; `user`/`password` override the DSN.
    ///
    /// # Errors
    ///
    /// Returns an error if the DSN does not parse.
    pub fn options(instance: &Instance) -> Result<MySqlConnectOptions> {
        let mut options = MySqlConnectOptions::from_str(instance.dsn.expose_secret())?;

        if let Some(user) = &instance.user {
            options = options.username(user);
        }

        if let Some(password) = &instance.password {
            options = options.password(password.expose_secret());
        }

        Ok(options)
    }
}

impl Connector for MySqlConnector {
    fn connect<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<Box<dyn Connection>>> {
        Box::pin(async move {
            let conn = Self::options(instance)?.connect().await?;
            Ok(Box::new(conn) as Box<dyn Connection>)
        })
    }
}
