use serde::{de::Visitor, Deserialize};
use std::{
    net::SocketAddr,
    ops::Deref,
    path::{Path, PathBuf},
};
use url::Url;

#[derive(Deserialize, Debug)]
pub struct DbConfig {
    /// Created on first start when missing.
    pub sqlite_file: PathBuf,
}

#[derive(Deserialize, Debug)]
pub struct NetConfig {
    pub proto_host: Url,
    #[serde(default)]
    pub base_path: String,
    pub bind: SocketAddr,
}

#[derive(Deserialize, Debug, Default)]
pub struct SiteConfig {
    pub name: Option<String>,
    /// Directory whose `*.html` files replace the built-in templates of the same name.
    pub templates: Option<ValidPath>,
    /// Directory of uploaded image files, served under `/media`.
    pub media: Option<ValidPath>,
}

#[derive(Deserialize, Debug)]
pub struct LogConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    String::from("info,sqlx=warn")
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: default_filter(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub db: DbConfig,
    pub net: NetConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("usage: {0} <config.toml>")]
    Usage(String),

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn site_name(&self) -> &str {
        self.site.name.as_deref().unwrap_or("Blog")
    }

    /// Path prefix the site is mounted under: empty, or `/segment` without a
    /// trailing slash.
    pub fn base_path(&self) -> String {
        let base = self.net.base_path.trim_matches('/');
        if base.is_empty() {
            String::new()
        } else {
            format!("/{base}")
        }
    }

    /// Public URL of a site path, honoring the configured base path.
    pub fn public_url(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.net.base_path.trim_matches('/');
        let path = path.trim_start_matches('/');
        let joined = if base.is_empty() {
            path.to_string()
        } else {
            format!("{base}/{path}")
        };
        self.net.proto_host.join(&joined)
    }
}

#[derive(Debug)]
pub struct ValidPath(PathBuf);

impl<'de> Deserialize<'de> for ValidPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ValidPathVisitor;
        impl Visitor<'_> for ValidPathVisitor {
            type Value = ValidPath;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a valid path")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ValidPath(
                    PathBuf::from(v).canonicalize().map_err(E::custom)?,
                ))
            }
        }

        deserializer.deserialize_str(ValidPathVisitor)
    }
}

impl Deref for ValidPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.as_path()
    }
}
