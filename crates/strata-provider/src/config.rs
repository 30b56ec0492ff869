//! TOML configuration for a [`StoreProvider`].
//!
//! ```toml
//! database = "app"
//!
//! [backend]
//! kind = "layered"
//!
//! [backend.cache]
//! kind = "memory"
//!
//! [backend.base]
//! kind = "sqlite"
//! root = "/var/lib/app"
//!
//! [scan]
//! batch_size = 500
//! ```
//!
//! Remote backends name only what is not a credential (the bucket). Their
//! SDK clients are built by the application and passed in [`RemoteClients`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_remote::{DocumentDatabaseClient, ObjectStorageClient};
use strata_store::{ScanConfig, StoreError, StoreResult};
use strata_types::validate_collection_name;

use crate::backend::{
    Backend, DiskBackend, DocumentDbBackend, LayeredBackend, MemoryBackend, ObjectStorageBackend,
    SqliteBackend,
};
use crate::provider::StoreProvider;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("backend {0} needs a client that was not supplied")]
    MissingClient(&'static str),
}

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        StoreError::Configuration(e.to_string())
    }
}

/// Which storage system backs the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum BackendConfig {
    Memory,
    Disk {
        root: PathBuf,
    },
    Sqlite {
        root: PathBuf,
    },
    Layered {
        cache: Box<BackendConfig>,
        base: Box<BackendConfig>,
    },
    ObjectStorage {
        bucket: String,
    },
    DocumentDb,
}

impl BackendConfig {
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        let invalid = |suffix: &str, reason: &str| ConfigError::InvalidValue {
            field: format!("{field}.{suffix}"),
            reason: reason.to_string(),
        };
        match self {
            Self::Memory | Self::DocumentDb => Ok(()),
            Self::Disk { root } | Self::Sqlite { root } => {
                if root.as_os_str().is_empty() {
                    return Err(invalid("root", "must not be empty"));
                }
                Ok(())
            }
            Self::ObjectStorage { bucket } => {
                if bucket.trim().is_empty() {
                    return Err(invalid("bucket", "must not be empty"));
                }
                Ok(())
            }
            Self::Layered { cache, base } => {
                cache.validate(&format!("{field}.cache"))?;
                base.validate(&format!("{field}.base"))
            }
        }
    }

    /// Build the backend, taking SDK clients from `clients`.
    pub fn build(&self, clients: &RemoteClients) -> Result<Arc<dyn Backend>, ConfigError> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryBackend::new()),
            Self::Disk { root } => Arc::new(DiskBackend::new(root)),
            Self::Sqlite { root } => Arc::new(SqliteBackend::new(root)),
            Self::Layered { cache, base } => {
                Arc::new(LayeredBackend::new(cache.build(clients)?, base.build(clients)?))
            }
            Self::ObjectStorage { bucket } => {
                let client = clients
                    .object_storage
                    .clone()
                    .ok_or(ConfigError::MissingClient("object_storage"))?;
                Arc::new(ObjectStorageBackend::new(bucket, client))
            }
            Self::DocumentDb => {
                let client = clients
                    .document_db
                    .clone()
                    .ok_or(ConfigError::MissingClient("document_db"))?;
                Arc::new(DocumentDbBackend::new(client))
            }
        })
    }
}

/// SDK clients for the remote backends. Only the ones a configuration
/// actually names need to be present.
#[derive(Clone, Default)]
pub struct RemoteClients {
    pub object_storage: Option<Arc<dyn ObjectStorageClient>>,
    pub document_db: Option<Arc<dyn DocumentDatabaseClient>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub database: String,
    pub backend: BackendConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            backend: BackendConfig::Memory,
            scan: ScanConfig::default(),
        }
    }
}

impl ProviderConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ProviderConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = validate_collection_name(&self.database) {
            return Err(ConfigError::InvalidValue {
                field: "database".to_string(),
                reason: e.to_string(),
            });
        }
        if self.scan.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan.batch_size".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        self.backend.validate("backend")
    }
}

impl StoreProvider {
    /// Build a provider from a validated configuration.
    pub fn from_config(config: &ProviderConfig, clients: &RemoteClients) -> StoreResult<Self> {
        config.validate()?;
        let backend = config.backend.build(clients)?;
        Ok(StoreProvider::new(&config.database, backend)?.with_scan_config(config.scan.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use strata_remote::InMemoryObjectStorage;
    use strata_store::Store;

    #[test]
    fn default_is_memory() {
        let c = ProviderConfig::default();
        assert_eq!(c.backend, BackendConfig::Memory);
        assert_eq!(c.scan.batch_size, 1000);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parse_layered() {
        let c = ProviderConfig::from_toml_str(
            r#"
            database = "app"

            [backend]
            kind = "layered"

            [backend.cache]
            kind = "memory"

            [backend.base]
            kind = "sqlite"
            root = "/var/lib/app"

            [scan]
            batch_size = 500
            "#,
        )
        .unwrap();
        assert_eq!(c.scan.batch_size, 500);
        assert_eq!(
            c.backend,
            BackendConfig::Layered {
                cache: Box::new(BackendConfig::Memory),
                base: Box::new(BackendConfig::Sqlite { root: "/var/lib/app".into() }),
            }
        );
    }

    #[test]
    fn scan_defaults_when_omitted() {
        let c = ProviderConfig::from_toml_str(
            r#"
            database = "app"
            [backend]
            kind = "disk"
            root = "data"
            "#,
        )
        .unwrap();
        assert_eq!(c.scan, ScanConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let err = ProviderConfig::from_toml_str(
            r#"
            database = "app"
            [backend]
            kind = "layered"
            [backend.cache]
            kind = "memory"
            [backend.base]
            kind = "disk"
            root = ""
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, "backend.base.root"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = ProviderConfig::from_toml_str(
            "database = \"my app\"\n[backend]\nkind = \"memory\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ProviderConfig::from_toml_str(
            "database = \"app\"\n[backend]\nkind = \"memory\"\n[scan]\nbatch_size = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_unknown_kind_and_fields() {
        assert!(matches!(
            ProviderConfig::from_toml_str("database = \"app\"\n[backend]\nkind = \"tape\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ProviderConfig::from_toml_str(
                "database = \"app\"\ncolor = \"blue\"\n[backend]\nkind = \"memory\"\n"
            ),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ProviderConfig::from_toml_str(
                "database = \"app\"\n[backend]\nkind = \"memory\"\n[scan]\nbatchsize = 10\n"
            ),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn remote_backend_needs_client() {
        let config = ProviderConfig {
            database: "app".into(),
            backend: BackendConfig::ObjectStorage { bucket: "App_Data".into() },
            scan: ScanConfig::default(),
        };
        assert!(matches!(
            StoreProvider::from_config(&config, &RemoteClients::default()),
            Err(StoreError::Configuration(_))
        ));

        let storage = Arc::new(InMemoryObjectStorage::new());
        let clients = RemoteClients {
            object_storage: Some(storage.clone()),
            document_db: None,
        };
        let provider = StoreProvider::from_config(&config, &clients).unwrap();
        provider
            .get_bytes_store("blobs")
            .unwrap()
            .set("k", b"v".to_vec())
            .unwrap();
        assert_eq!(storage.object("app-data", "blobs/k"), Some(b"v".to_vec()));
    }

    #[test]
    fn from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "database = \"app\"\n[backend]\nkind = \"sqlite\"\nroot = {:?}",
            dir.path().join("data").display().to_string()
        )
        .unwrap();
        drop(file);

        let config = ProviderConfig::from_path(&path).unwrap();
        let provider = StoreProvider::from_config(&config, &RemoteClients::default()).unwrap();
        provider.get_bytes_store("blobs").unwrap().set("k", vec![7]).unwrap();
        assert!(dir.path().join("data").join("app").join("blobs.db").is_file());

        assert!(matches!(
            ProviderConfig::from_path(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
