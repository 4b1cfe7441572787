use coedit_core::{ChatUser, FuzzyConfig, Role};
use miette::Result;
use miette::miette;
use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;

/// Engine settings for one participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Title lookup tuning.
    pub fuzzy: FuzzyConfig,
    /// Local role. Observers can't edit live buffers.
    pub role: Role,
    /// The local user, whose own cursor echoes are ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_user: Option<ChatUser>,
}

impl EngineConfig {
    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self> {
        loader
            .load()
            .await
            .map_err(|e| miette!("Failed to load configuration: {e}"))
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<()> {
        saver
            .save(self)
            .await
            .map_err(|e| miette!("Failed to save configuration: {e}"))
    }

    /// Override fields from the environment.
    ///
    /// - `COEDIT_ROLE`: `editor` or `observer`
    /// - `COEDIT_FUZZY_MIN_SCORE`: minimum fuzzy match score, 0 to 1
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(role) = var("COEDIT_ROLE") {
            self.role = match role.to_lowercase().as_str() {
                "editor" => Role::Editor,
                "observer" => Role::Observer,
                other => return Err(miette!("COEDIT_ROLE must be editor or observer, got {other}")),
            };
        }
        if let Some(score) = var("COEDIT_FUZZY_MIN_SCORE") {
            let score: f64 = score
                .parse()
                .map_err(|e| miette!("COEDIT_FUZZY_MIN_SCORE is not a number: {e}"))?;
            if !(0.0..=1.0).contains(&score) {
                return Err(miette!("COEDIT_FUZZY_MIN_SCORE must be between 0 and 1, got {score}"));
            }
            self.fuzzy.min_score = score;
        }
        Ok(self)
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(
        &self,
    ) -> impl Future<
        Output = core::result::Result<
            EngineConfig,
            Box<dyn std::error::Error + Send + Sync + 'static>,
        >,
    > + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(
        &self,
        config: &EngineConfig,
    ) -> impl Future<
        Output = core::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    > + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// Only `.json` files are supported.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Loader for FileStore {
    async fn load(
        &self,
    ) -> core::result::Result<EngineConfig, Box<dyn std::error::Error + Send + Sync + 'static>>
    {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&std::fs::read_to_string(&self.path)?)?),
            _ => Err(miette!("Unsupported file format").into()),
        }
    }
}

impl Saver for FileStore {
    async fn save(
        &self,
        config: &EngineConfig,
    ) -> core::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(std::fs::write(
                &self.path,
                serde_json::to_string_pretty(config)?,
            )?),
            _ => Err(miette!("Unsupported file format").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("coedit-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let path = temp_path("config.json");
        let store = FileStore::new(&path);
        let config = EngineConfig {
            role: Role::Observer,
            local_user: Some(ChatUser::me("alice", "Alice")),
            ..EngineConfig::default()
        };

        config.save(&store).await.unwrap();
        let loaded = EngineConfig::load(&store).await.unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let store = FileStore::new(temp_path("config.yaml"));
        assert!(EngineConfig::default().save(&store).await.is_err());
        assert!(EngineConfig::load(&store).await.is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"fuzzy": {"minScore": 0.5}, "role": "observer"}"#).unwrap();
        assert_eq!(config.role, Role::Observer);
        assert_eq!(config.fuzzy.min_score, 0.5);
        assert_eq!(config.fuzzy.gram_size_upper, 3);
        assert!(config.local_user.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("COEDIT_ROLE", "Observer"),
            ("COEDIT_FUZZY_MIN_SCORE", "0.6"),
        ]);
        let config = EngineConfig::default()
            .with_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.role, Role::Observer);
        assert_eq!(config.fuzzy.min_score, 0.6);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let bad_role = |key: &str| (key == "COEDIT_ROLE").then(|| "admin".to_string());
        assert!(EngineConfig::default().with_vars(bad_role).is_err());

        let bad_score = |key: &str| (key == "COEDIT_FUZZY_MIN_SCORE").then(|| "2".to_string());
        assert!(EngineConfig::default().with_vars(bad_score).is_err());
    }
}
