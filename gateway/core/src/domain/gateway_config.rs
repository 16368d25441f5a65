// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Default limits for response caches created on first use
// - Named caches pre-created at startup with their own limits
// - Concurrent-All evaluator settings

use crate::domain::cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GatewayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable gateway node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Limits for caches created lazily by name
    #[serde(default)]
    pub defaults: CacheConfig,

    /// Caches created eagerly at startup, keyed by cache name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub caches: BTreeMap<String, CacheConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Upper bound on branches of one Concurrent-All node running at once.
    /// `None` runs every branch immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "policy-gateway".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from an in-memory YAML document
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. GATEWAY_CONFIG_PATH environment variable
    /// 2. ./gateway-config.yaml (working directory)
    /// 3. ~/.gateway/config.yaml (user home)
    /// 4. /etc/gateway/config.yaml (system, Unix) or C:\ProgramData\Gateway\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GATEWAY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./gateway-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".gateway").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/gateway/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Gateway\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides on top of the file contents
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let defaults = &mut self.spec.cache.defaults;

        if let Some(val) = lookup("GATEWAY_CACHE_MAX_ENTRIES") {
            match val.parse::<usize>() {
                Ok(n) => {
                    tracing::info!("Environment override: GATEWAY_CACHE_MAX_ENTRIES={}", n);
                    defaults.max_entries = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for GATEWAY_CACHE_MAX_ENTRIES: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("GATEWAY_CACHE_MAX_AGE") {
            match humantime::parse_duration(&val) {
                Ok(d) => {
                    tracing::info!("Environment override: GATEWAY_CACHE_MAX_AGE={}", val);
                    defaults.max_age = d;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for GATEWAY_CACHE_MAX_AGE: '{}'. Expected a duration like '5m'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("GATEWAY_CACHE_MAX_ENTRY_SIZE") {
            match val.parse::<u64>() {
                Ok(n) => {
                    tracing::info!("Environment override: GATEWAY_CACHE_MAX_ENTRY_SIZE={}", n);
                    defaults.max_entry_size_bytes = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for GATEWAY_CACHE_MAX_ENTRY_SIZE: '{}'. Expected bytes. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("GATEWAY_MAX_CONCURRENCY") {
            match val.parse::<usize>() {
                Ok(0) => {
                    tracing::info!("Environment override: GATEWAY_MAX_CONCURRENCY=0 (unbounded)");
                    self.spec.evaluator.max_concurrency = None;
                }
                Ok(n) => {
                    tracing::info!("Environment override: GATEWAY_MAX_CONCURRENCY={}", n);
                    self.spec.evaluator.max_concurrency = Some(n);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for GATEWAY_MAX_CONCURRENCY: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        validate_cache_config("spec.cache.defaults", &self.spec.cache.defaults)?;
        for (name, config) in &self.spec.cache.caches {
            if name.is_empty() {
                anyhow::bail!("Cache name cannot be empty in spec.cache.caches");
            }
            validate_cache_config(&format!("spec.cache.caches.{}", name), config)?;
        }

        if self.spec.evaluator.max_concurrency == Some(0) {
            anyhow::bail!("spec.evaluator.max_concurrency must be at least 1 when set");
        }

        Ok(())
    }
}

fn validate_cache_config(path: &str, config: &CacheConfig) -> anyhow::Result<()> {
    if config.max_entries == 0 {
        anyhow::bail!("{}.max_entries must be at least 1", path);
    }
    if config.max_age.is_zero() {
        anyhow::bail!("{}.max_age must be greater than zero", path);
    }
    if config.max_entry_size_bytes == 0 {
        anyhow::bail!("{}.max_entry_size_bytes must be at least 1", path);
    }
    Ok(())
}
