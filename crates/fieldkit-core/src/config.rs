//! TOML configuration with a default for every field.

use crate::{
    db::{FileBackend, RecordStore},
    error::{Error, ErrorClass, ErrorOrigin},
    model::SchemaRegistry,
    transmission::{MAX_TRANSMISSION_PARTS, Transport, TransportKind},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        let class = match err {
            ConfigError::Read { .. } => ErrorClass::StorageBackend,
            ConfigError::Parse(_) | ConfigError::Invalid { .. } => ErrorClass::Validation,
        };

        Self::new(class, ErrorOrigin::Config, err.to_string())
    }
}

///
/// Config
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub transmission: TransmissionConfig,
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.transmission.validate()
    }
}

///
/// StoreConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Folder holding the store file.
    #[serde(default = "StoreConfig::default_folder")]
    pub folder: PathBuf,

    /// Base of the store file name.
    #[serde(default = "StoreConfig::default_base_name")]
    pub base_name: String,

    /// Backup destination; defaults to `<folder>/backups`.
    #[serde(default)]
    pub backup_folder: Option<PathBuf>,

    /// Suffix backups with a timestamp.
    #[serde(default = "StoreConfig::default_label_backups")]
    pub label_backups: bool,
}

impl StoreConfig {
    fn default_folder() -> PathBuf {
        PathBuf::from("data")
    }

    fn default_base_name() -> String {
        "fieldkit".to_string()
    }

    const fn default_label_backups() -> bool {
        true
    }

    #[must_use]
    pub fn backup_folder(&self) -> PathBuf {
        self.backup_folder
            .clone()
            .unwrap_or_else(|| self.folder.join("backups"))
    }

    /// Open the file-backed record store this section describes.
    pub fn open(&self, registry: Arc<SchemaRegistry>) -> Result<RecordStore<FileBackend>, Error> {
        let backend = FileBackend::open(&self.folder, &self.base_name, registry)?;

        Ok(RecordStore::new(backend))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "store.base_name",
                reason: "must not be empty".into(),
            });
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            folder: Self::default_folder(),
            base_name: Self::default_base_name(),
            backup_folder: None,
            label_backups: Self::default_label_backups(),
        }
    }
}

///
/// TransmissionConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransmissionConfig {
    /// Transport used when none is specified.
    #[serde(default)]
    pub default_transport: TransportKind,

    /// Parts per SMS transmission, at most 16.
    #[serde(default = "TransmissionConfig::default_sms_max_parts")]
    pub sms_max_parts: u8,

    /// Largest HTTP transmission body.
    #[serde(default = "TransmissionConfig::default_http_max_body_bytes")]
    pub http_max_body_bytes: usize,
}

impl TransmissionConfig {
    const fn default_sms_max_parts() -> u8 {
        MAX_TRANSMISSION_PARTS
    }

    const fn default_http_max_body_bytes() -> usize {
        64 * 1024
    }

    /// Transport of the given kind, sized by this configuration.
    #[must_use]
    pub const fn transport(&self, kind: TransportKind) -> Transport {
        match kind {
            TransportKind::BinarySms => Transport::BinarySms {
                max_parts: self.sms_max_parts,
            },
            TransportKind::TextSms => Transport::TextSms {
                max_parts: self.sms_max_parts,
            },
            TransportKind::Http => Transport::Http {
                max_body_bytes: self.http_max_body_bytes,
            },
        }
    }

    #[must_use]
    pub const fn default_transport(&self) -> Transport {
        self.transport(self.default_transport)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sms_max_parts == 0 || self.sms_max_parts > MAX_TRANSMISSION_PARTS {
            return Err(ConfigError::Invalid {
                field: "transmission.sms_max_parts",
                reason: format!("must be within [1, {MAX_TRANSMISSION_PARTS}], got {}", self.sms_max_parts),
            });
        }
        if self.http_max_body_bytes < 2 {
            return Err(ConfigError::Invalid {
                field: "transmission.http_max_body_bytes",
                reason: format!("must be at least 2, got {}", self.http_max_body_bytes),
            });
        }

        Ok(())
    }
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            default_transport: TransportKind::default(),
            sms_max_parts: Self::default_sms_max_parts(),
            http_max_body_bytes: Self::default_http_max_body_bytes(),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let config = Config::from_toml_str("").expect("defaults");
        assert_eq!(config, Config::default());
        assert_eq!(config.store.backup_folder(), PathBuf::from("data/backups"));
        assert_eq!(config.transmission.sms_max_parts, 16);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [store]
            folder = "/var/lib/fieldkit"
            label_backups = false

            [transmission]
            default_transport = "http"
            http_max_body_bytes = 4096
            "#,
        )
        .expect("valid config");

        assert_eq!(config.store.folder, PathBuf::from("/var/lib/fieldkit"));
        assert_eq!(config.store.base_name, "fieldkit");
        assert!(!config.store.label_backups);
        assert_eq!(
            config.transmission.default_transport(),
            Transport::Http { max_body_bytes: 4096 }
        );
    }

    #[test]
    fn out_of_range_parts_are_rejected() {
        let err = Config::from_toml_str("[transmission]\nsms_max_parts = 17\n").expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid { field: "transmission.sms_max_parts", .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("[store]\nfolderr = \"x\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fieldkit.toml");
        fs::write(&path, "[store]\nbase_name = \"survey\"\n").expect("write config");

        let config = Config::from_file(&path).expect("config");
        assert_eq!(config.store.base_name, "survey");
        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }
}
