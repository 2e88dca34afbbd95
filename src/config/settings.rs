use std::env;
use std::path::PathBuf;

use config::{Config, ConfigError, File};
use dotenv::dotenv;
use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};

#[derive(serde::Deserialize, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub privacy: PrivacySettings,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
    pub log_level: String,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct StorageSettings {
    pub flat_file_dir: PathBuf,
}

#[derive(serde::Deserialize, Debug)]
pub struct PrivacySettings {
    pub secret_key: SecretString,
    /// Registers `GET /v1/privacy/test/{userId}`. Anyone who can reach it can
    /// confirm guesses about which real id maps to a stored pseudonym.
    #[serde(default)]
    pub expose_test_endpoint: bool,
}

fn default_max_payload_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    4
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Environment(String),

    #[error("privacy.secret_key must be set to a non-empty value")]
    MissingSecretKey,

    #[error("database.path must not be empty")]
    MissingDatabasePath,

    #[error("storage.flat_file_dir must not be empty")]
    MissingFlatFileDir,
}

impl Settings {
    /// Rejects settings the service must not start with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.privacy.secret_key.expose_secret().trim().is_empty() {
            return Err(SettingsError::MissingSecretKey);
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(SettingsError::MissingDatabasePath);
        }
        if self.storage.flat_file_dir.as_os_str().is_empty() {
            return Err(SettingsError::MissingFlatFileDir);
        }
        Ok(())
    }
}

pub fn get_config() -> Result<Settings, SettingsError> {
    let base_path = env::current_dir()
        .map_err(|e| SettingsError::Environment(format!("Failed to determine the current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    dotenv().ok();

    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(SettingsError::Environment)?;

    let env_filename = format!("{}.yml", environment.as_str());
    let config = Config::builder()
        .add_source(File::from(configuration_directory.join("base.yml")))
        .add_source(File::from(configuration_directory.join(env_filename)))
        .add_source(
            config::Environment::default()
                .prefix("APP")
                .prefix_separator("__")
                .separator("__")
        )
        .build()?;

    let mut settings = config.try_deserialize::<Settings>()?;

    // Deployments inject the key as a plain secret rather than through APP__PRIVACY__SECRET_KEY
    if let Ok(secret_key) = env::var("ANONYMIZATION_SECRET_KEY") {
        settings.privacy.secret_key = SecretString::new(secret_key.into_boxed_str());
    }

    settings.validate()?;
    Ok(settings)
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. \
                Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str, db: &str, dir: &str) -> Settings {
        Settings {
            application: ApplicationSettings {
                port: 0,
                host: "127.0.0.1".to_string(),
                log_level: "info".to_string(),
                max_payload_bytes: default_max_payload_bytes(),
            },
            database: DatabaseSettings {
                path: PathBuf::from(db),
                max_connections: default_max_connections(),
            },
            storage: StorageSettings {
                flat_file_dir: PathBuf::from(dir),
            },
            privacy: PrivacySettings {
                secret_key: SecretString::new(secret.into()),
                expose_test_endpoint: false,
            },
        }
    }

    #[test]
    fn complete_settings_are_accepted() {
        assert!(settings("key", "health_data.db", "csv_data").validate().is_ok());
    }

    #[test]
    fn blank_secret_key_is_a_configuration_error() {
        let result = settings("   ", "health_data.db", "csv_data").validate();
        assert!(matches!(result, Err(SettingsError::MissingSecretKey)));
    }

    #[test]
    fn storage_paths_are_required() {
        assert!(matches!(
            settings("key", "", "csv_data").validate(),
            Err(SettingsError::MissingDatabasePath)
        ));
        assert!(matches!(
            settings("key", "health_data.db", "").validate(),
            Err(SettingsError::MissingFlatFileDir)
        ));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let result: Result<Environment, String> = "staging".to_string().try_into();
        assert!(result.is_err());
    }
}
