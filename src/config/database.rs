use super::{ConfigError, env::expand_env_vars};
use secrecy::SecretString;
use serde::Deserialize;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// SQL dialects recognised in `config-database.yml`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendType {
    Postgres,
    MySql,
    Sqlite,
    Mssql,
    Oracle,
}

impl BackendType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Mssql => "mssql",
            Self::Oracle => "oracle",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mssql" | "sqlserver" => Ok(Self::Mssql),
            "oracle" => Ok(Self::Oracle),
            other => Err(other.to_string()),
        }
    }
}

/// A database to scrape.
#[derive(Clone, Debug)]
pub struct Instance {
    pub name: String,
    pub backend: BackendType,
    pub dsn: SecretString,
    pub user: Option<String>,
    pub password: Option<SecretString>,
}

impl Instance {
    #[must_use]
    pub fn new(name: impl Into<String>, backend: BackendType, dsn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend,
            dsn: SecretString::from(dsn.into()),
            user: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user = Some(user.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }
}

/// Instances keyed by group name, each group ordered by instance name.
pub type InstanceGroups = BTreeMap<String, Vec<Instance>>;

#[derive(Debug, Deserialize)]
struct RawInstance {
    #[serde(rename = "type")]
    backend: String,
    dsn: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default, alias = "pass")]
    password: Option<String>,
}

type RawGroups = BTreeMap<String, BTreeMap<String, RawInstance>>;

/// Parse the instance groups document.
///
/// # Errors
///
/// Returns an error on invalid YAML, an unknown backend type or an empty DSN.
pub fn parse_groups(yaml: &str, path: &std::path::Path) -> Result<InstanceGroups, ConfigError> {
    let raw: RawGroups = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    raw.into_iter()
        .map(|(group, instances)| {
            let instances = instances
                .into_iter()
                .map(|(name, raw)| resolve_instance(&group, name, raw))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((group, instances))
        })
        .collect()
}

fn resolve_instance(group: &str, name: String, raw: RawInstance) -> Result<Instance, ConfigError> {
    let backend = raw
        .backend
        .parse::<BackendType>()
        .map_err(|backend| ConfigError::UnknownBackend {
            group: group.to_string(),
            instance: name.clone(),
            backend,
        })?;

    let dsn = expand_env_vars(raw.dsn.trim());
    if dsn.is_empty() {
        return Err(ConfigError::EmptyDsn {
            group: group.to_string(),
            instance: name,
        });
    }

    Ok(Instance {
        name,
        backend,
        dsn: SecretString::from(dsn),
        user: raw.user.map(|u| expand_env_vars(&u)),
        password: raw.password.map(|p| SecretString::from(expand_env_vars(&p))),
    })
}
