use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::snapshot::ExpandLevel;
use crate::status::ItemStatus;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "GlView";
const APP_NAME: &str = "glview";

static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid currency pattern"));

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("GLVIEW_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("GLVIEW_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_root))
    }

    /// Layout under explicit roots, used by `discover` and by tests.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, data_root: PathBuf) -> Self {
        Self {
            config_dir,
            config_file,
            database_path: data_root.join("tokens.db"),
            data_dir: data_root,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub query: QueryConfig,
    pub defaults: DefaultsConfig,
    pub navigation: NavigationConfig,
    pub store: StoreOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.store.resolve(paths).context("resolving store paths")?;
        if !CURRENCY_CODE.is_match(&self.query.placeholder_currency) {
            tracing::warn!(
                currency = %self.query.placeholder_currency,
                "invalid placeholder currency in config, falling back to EUR"
            );
            self.query.placeholder_currency = QueryConfig::default().placeholder_currency;
        }
        if self.query.placeholder_rate_type.trim().is_empty() {
            tracing::warn!("empty placeholder rate type in config, falling back to M");
            self.query.placeholder_rate_type = QueryConfig::default().placeholder_rate_type;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub entity_set: String,
    /// Stand-in currency when no display-currency column is requested.
    pub placeholder_currency: String,
    pub placeholder_rate_type: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            entity_set: "C_JournalEntryItemBrowser".to_string(),
            placeholder_currency: "EUR".to_string(),
            placeholder_rate_type: "M".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub status: ItemStatus,
    pub exchange_rate_type: String,
    pub expand_level: ExpandLevel,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            status: ItemStatus::Open,
            exchange_rate_type: "M".to_string(),
            expand_level: ExpandLevel(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Load the standard table variant after inbound navigation unless the
    /// payload asks for the user's default layout.
    pub force_standard_table_variant: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            force_standard_table_variant: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
    pub token_prefix: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
            token_prefix: "AS".to_string(),
        }
    }
}

impl StoreOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader_in(dir: &TempDir) -> ConfigLoader {
        let config_dir = dir.path().join("config");
        let paths = ConfigPaths::rooted(
            config_dir.clone(),
            config_dir.join("config.toml"),
            dir.path().join("data"),
        );
        ConfigLoader { paths }
    }

    #[test]
    fn first_run_writes_default_config() {
        let dir = TempDir::new().expect("tempdir");
        let loader = loader_in(&dir);

        loader.paths().ensure_directories().expect("directories");
        assert!(loader.paths().data_dir.is_dir());
        let cfg = loader.load_or_init().expect("init config");
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.query.entity_set, "C_JournalEntryItemBrowser");
        assert_eq!(cfg.store.database_path, loader.paths().database_path);

        let reloaded = loader.load().expect("reload");
        assert_eq!(reloaded.defaults.exchange_rate_type, "M");
        assert!(reloaded.navigation.force_standard_table_variant);
    }

    #[test]
    fn invalid_placeholder_currency_falls_back() {
        let dir = TempDir::new().expect("tempdir");
        let loader = loader_in(&dir);
        loader.paths().ensure_directories().expect("dirs");
        fs::write(
            &loader.paths().config_file,
            "[query]\nplaceholder_currency = \"euro\"\n\n[defaults]\nstatus = \"All\"\nexpand_level = \"L2\"\n",
        )
        .expect("write config");

        let cfg = loader.load().expect("load");
        assert_eq!(cfg.query.placeholder_currency, "EUR");
        assert_eq!(cfg.defaults.status, ItemStatus::All);
        assert_eq!(cfg.defaults.expand_level, ExpandLevel(2));
    }
}
