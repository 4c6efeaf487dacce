//! xCM CLI configuration stored under the user config directory.
//!
//! - `<config dir>/xcm/xcm.json` holds the login state written by `xcm login`
//! - `<config dir>/xcm/controlplane-admin.kubeconfig` holds the control plane
//!   admin credential written by `xcm connect` and read by `xcm relay`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use xcm_connector::{BootstrapCredential, CredentialStore};

use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = "xcm";
const CONFIG_FILE_NAME: &str = "xcm.json";
const ADMIN_KUBECONFIG_FILE_NAME: &str = "controlplane-admin.kubeconfig";

/// Login state for the management plane API
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ApiConfig {
    /// Bearer access token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    /// Offline or refresh token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    /// OpenID scopes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// OpenID token URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_url: String,
    /// URL of the API gateway
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Skip TLS verification towards the API gateway
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
    /// RFC 3339 timestamp of the last login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

impl ApiConfig {
    /// True when a token and the server URL are present
    pub fn is_logged_in(&self) -> bool {
        !self.url.is_empty() && (!self.access_token.is_empty() || !self.refresh_token.is_empty())
    }

    /// Fail with [`Error::NotLoggedIn`] unless logged in
    pub fn require_login(&self) -> Result<()> {
        if self.is_logged_in() {
            Ok(())
        } else {
            Err(Error::NotLoggedIn)
        }
    }

    /// Remove everything needed for authentication
    pub fn disarm(&mut self) {
        self.access_token.clear();
        self.refresh_token.clear();
        self.scopes.clear();
        self.token_url.clear();
        self.url.clear();
        self.insecure = false;
        self.last_login = None;
    }

    /// Load from `path`; a missing or empty file is an empty config
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using empty config");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::config(path, e.to_string())),
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&data).map_err(|e| Error::config(path, e.to_string()))
    }

    /// Save to `path`, replacing the previous file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        write_private(path, data.as_bytes())
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }
}

/// Returns `<config dir>/xcm/`, creating it if it doesn't exist.
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| Error::command_failed("could not determine the user config directory"))?;
    let dir = base.join(CONFIG_DIR_NAME);
    std::fs::create_dir_all(&dir).map_err(|e| {
        Error::command_failed(format!("failed to create {}: {}", dir.display(), e))
    })?;
    Ok(dir)
}

/// Path to `xcm.json`
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Path to the persisted control plane admin kubeconfig
pub fn admin_kubeconfig_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(ADMIN_KUBECONFIG_FILE_NAME))
}

/// Whole-file overwrite, readable by the owner only
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// [`CredentialStore`] backed by a single kubeconfig file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location in the config directory
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(admin_kubeconfig_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn save_admin_credential(&self, credential: &BootstrapCredential) -> xcm_connector::Result<()> {
        write_private(&self.path, credential.as_bytes()).map_err(|e| {
            xcm_connector::Error::internal_with_context(
                "credential store",
                format!("failed to write {}: {}", self.path.display(), e),
            )
        })?;
        debug!(path = %self.path.display(), "saved control plane admin config");
        Ok(())
    }

    fn load_admin_credential(&self) -> xcm_connector::Result<BootstrapCredential> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            xcm_connector::Error::credential(format!("{}: {}", self.path.display(), e))
        })?;
        BootstrapCredential::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_empty_files_load_as_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(ApiConfig::load_from(&path).unwrap(), ApiConfig::default());

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(ApiConfig::load_from(&path).unwrap(), ApiConfig::default());
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = ApiConfig {
            access_token: "access".to_string(),
            url: "https://api.example.com".to_string(),
            token_url: "https://sso.example.com/token".to_string(),
            last_login: Some("2025-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = ApiConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.is_logged_in());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"access_token\""));
        assert!(!raw.contains("refresh_token"));
    }

    #[test]
    fn malformed_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();

        let err = ApiConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn disarm_clears_login() {
        let mut config = ApiConfig {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            scopes: vec!["openid".to_string()],
            token_url: "t".to_string(),
            url: "u".to_string(),
            insecure: true,
            last_login: Some("now".to_string()),
        };
        config.disarm();
        assert!(!config.is_logged_in());
        assert!(matches!(config.require_login(), Err(Error::NotLoggedIn)));
        assert_eq!(config, ApiConfig::default());
    }

    #[test]
    fn credential_store_missing_file_is_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join(ADMIN_KUBECONFIG_FILE_NAME));

        let err = store.load_admin_credential().unwrap_err();
        assert!(err
            .to_string()
            .starts_with("cannot load control plane admin config"));
    }

    #[test]
    fn credential_store_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ADMIN_KUBECONFIG_FILE_NAME);
        std::fs::write(&path, "x".repeat(10_000)).unwrap();

        let yaml = "apiVersion: v1\nkind: Config\nclusters:\n- name: c\n  cluster:\n    server: https://cp.example.com\nusers:\n- name: u\n  user: {}\ncontexts:\n- name: ctx\n  context:\n    cluster: c\n    user: u\ncurrent-context: ctx\n";
        let credential = BootstrapCredential::from_bytes(yaml.as_bytes()).unwrap();
        let store = FileCredentialStore::new(&path);
        store.save_admin_credential(&credential).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), yaml);
        assert_eq!(store.load_admin_credential().unwrap(), credential);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
