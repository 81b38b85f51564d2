//! Worker configuration: version tag, serving origin, install manifest.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::WorkerError;

/// Configuration for one deployed worker version.
///
/// The version tag must change on every deployment that alters cached asset
/// semantics; it is embedded in both generation names and is the sole
/// mechanism for invalidating old generations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Deployment version tag.
    pub version: String,
    /// Serving origin, used for same-origin routing and to resolve
    /// manifest paths into absolute URLs.
    pub origin: Url,
    /// Core asset paths fetched eagerly at install.
    pub core_assets: Vec<String>,
    /// Filename of the large binary asset served network-first.
    pub model_asset: String,
}

impl WorkerConfig {
    /// Create a configuration with the viewer app's standard manifest.
    pub fn new(origin: Url, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            origin,
            core_assets: [
                "/",
                "/index.html",
                "/model.glb",
                "/manifest.webmanifest",
                "/scripts/app.js",
                "/scripts/register-sw.js",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            model_asset: "model.glb".to_string(),
        }
    }

    /// Replace the install manifest.
    pub fn with_core_assets(mut self, assets: Vec<String>) -> Self {
        self.core_assets = assets;
        self
    }

    /// Replace the network-first asset filename.
    pub fn with_model_asset(mut self, name: impl Into<String>) -> Self {
        self.model_asset = name.into();
        self
    }

    /// Name of the current core generation.
    pub fn core_generation(&self) -> String {
        format!("core-{}", self.version)
    }

    /// Name of the current runtime generation.
    pub fn runtime_generation(&self) -> String {
        format!("runtime-{}", self.version)
    }

    /// The two generation names that survive activation.
    pub fn current_generations(&self) -> [String; 2] {
        [self.core_generation(), self.runtime_generation()]
    }

    /// Resolve a manifest or pre-warm path against the serving origin.
    /// Accepts absolute URLs, absolute paths, and relative forms such as
    /// `./model.glb`.
    pub fn resolve(&self, path: &str) -> Result<Url, WorkerError> {
        self.origin
            .join(path)
            .map_err(|e| WorkerError::InvalidUrl(format!("{path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::new(Url::parse("https://viewer.example").unwrap(), "v3")
    }

    #[test]
    fn test_generation_names_embed_version() {
        let config = config();
        assert_eq!(config.core_generation(), "core-v3");
        assert_eq!(config.runtime_generation(), "runtime-v3");
        assert_eq!(
            config.current_generations(),
            ["core-v3".to_string(), "runtime-v3".to_string()]
        );
    }

    #[test]
    fn test_default_manifest_includes_model() {
        let config = config();
        assert!(config.core_assets.contains(&"/model.glb".to_string()));
        assert_eq!(config.model_asset, "model.glb");
    }

    #[test]
    fn test_resolve_paths() {
        let config = config();
        assert_eq!(
            config.resolve("/index.html").unwrap().as_str(),
            "https://viewer.example/index.html"
        );
        assert_eq!(
            config.resolve("./model.glb").unwrap().as_str(),
            "https://viewer.example/model.glb"
        );
        assert_eq!(
            config.resolve("https://cdn.example/lib.js").unwrap().as_str(),
            "https://cdn.example/lib.js"
        );
    }

    #[test]
    fn test_deserialize_from_json() {
        let raw = r#"{
            "version": "v4",
            "origin": "https://viewer.example/",
            "core_assets": ["/", "/index.html"],
            "model_asset": "scene.glb"
        }"#;
        let config: WorkerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.version, "v4");
        assert_eq!(config.core_assets.len(), 2);
        assert_eq!(config.core_generation(), "core-v4");
        assert_eq!(config.model_asset, "scene.glb");
    }
}
