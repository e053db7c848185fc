use std::collections::HashMap;
use std::path::{Path, PathBuf};

use drive2docs_core::{DocStoreClient, DocStoreError, DriveClient, DriveError};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::migrate::export::{ExportSelector, ExportTable, MimeTable};
use crate::migrate::guard::DeleteGuard;
use crate::migrate::hierarchy::normalize_path;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.yaml";
const SETTINGS_ENV_VARS: &[&str] = &["SETTINGS_FILE", "settings_file"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("source {0}: accessToken is empty")]
    MissingAccessToken(String),
    #[error("source {source_name}: unknown destination {destination}")]
    UnknownDestination {
        source_name: String,
        destination: String,
    },
    #[error("destination {0}: authToken is empty")]
    MissingAuthToken(String),
    #[error("destination {0}: region is empty")]
    MissingRegion(String),
    #[error("destination {0}: either rootFolderId or userQuery is required")]
    MissingRoot(String),
    #[error("destination {0}: organisationId is required to resolve userQuery")]
    MissingOrganisation(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub settings: GeneralSettings,
    /// Extension to content type, applied in file order.
    #[serde(default)]
    pub mime_types: serde_yaml::Mapping,
    #[serde(default, alias = "gdrives")]
    pub sources: Vec<SourceConfig>,
    #[serde(default, alias = "workdocs")]
    pub destinations: Vec<DestinationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    #[serde(default)]
    pub data_store_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_fetch_size")]
    pub file_fetch_size: u32,
    #[serde(default = "default_fetch_size")]
    pub folder_hierarchy_fetch_size: u32,
    #[serde(default)]
    pub download_only: bool,
    #[serde(default)]
    pub cleanup: bool,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub root_dir_name: String,
    #[serde(default = "default_target_dir_name")]
    pub target_dir_name: String,
    #[serde(default)]
    pub dont_delete_dir: OneOrMany,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub exports: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub root_folder_id: Option<String>,
    #[serde(default)]
    pub user_query: Option<String>,
    #[serde(default)]
    pub organisation_id: Option<String>,
    #[serde(default = "default_encryption")]
    pub server_side_encryption: String,
}

/// A YAML value given either as a scalar or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

fn default_fetch_size() -> u32 {
    1000
}

fn default_target_dir_name() -> String {
    "GDrive".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

fn default_encryption() -> String {
    "AES256".to_string()
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(settings.without_unnamed())
    }

    /// Drops source and destination entries that have no usable name.
    fn without_unnamed(mut self) -> Self {
        let before = (self.sources.len(), self.destinations.len());
        self.sources.retain(|source| !source.name.trim().is_empty());
        self.destinations.retain(|dest| !dest.name.trim().is_empty());
        let skipped = before.0 - self.sources.len() + before.1 - self.destinations.len();
        if skipped > 0 {
            warn!(skipped, "ignoring unnamed instances");
        }
        self
    }

    /// `settings.dataStoreDir` with `~` expanded; the working directory when unset.
    pub fn data_dir(&self) -> PathBuf {
        match self.settings.data_store_dir.as_deref() {
            Some(value) if !value.trim().is_empty() => match dirs::home_dir() {
                Some(home) => expand_with_home(value, &home),
                None => PathBuf::from(value),
            },
            _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn mime_table(&self) -> MimeTable {
        let overrides: Vec<(String, String)> = self
            .mime_types
            .iter()
            .filter_map(|(extension, content_type)| {
                Some((
                    yaml_scalar(extension)?,
                    content_type.as_str()?.to_string(),
                ))
            })
            .collect();
        MimeTable::default().with_overrides(overrides.iter().map(|(ext, ct)| (ext, ct)))
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.name == name)
    }

    pub fn destination(&self, name: &str) -> Option<&DestinationConfig> {
        self.destinations.iter().find(|dest| dest.name == name)
    }

    /// Checks `source` and returns the destination it uploads to. Download-only
    /// sources and sources without a destination name yield `None`.
    pub fn validate_source<'a>(
        &'a self,
        source: &SourceConfig,
    ) -> Result<Option<&'a DestinationConfig>, ConfigError> {
        if source.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken(source.name.clone()));
        }
        if source.download_only {
            return Ok(None);
        }
        let Some(name) = non_empty(&source.destination) else {
            return Ok(None);
        };
        let destination = self
            .destination(name)
            .ok_or_else(|| ConfigError::UnknownDestination {
                source_name: source.name.clone(),
                destination: name.to_string(),
            })?;
        destination.validate()?;
        Ok(Some(destination))
    }
}

impl SourceConfig {
    pub fn client(&self) -> Result<DriveClient, DriveError> {
        match self.api_base_url.as_deref() {
            Some(base_url) => DriveClient::with_base_url(base_url, self.access_token.clone()),
            None => DriveClient::new(self.access_token.clone()),
        }
    }

    pub fn root_path(&self) -> String {
        normalize_path(&self.root_dir_name)
    }

    pub fn local_root(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.target_dir_name)
    }

    pub fn delete_guard(&self) -> DeleteGuard {
        DeleteGuard::new(
            self.dont_delete_dir
                .to_vec()
                .into_iter()
                .filter(|prefix| !prefix.trim().is_empty()),
        )
    }

    pub fn export_selector(&self, mime: MimeTable) -> ExportSelector {
        ExportSelector::new(ExportTable::default().with_overrides(&self.exports), mime)
    }
}

impl DestinationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_token.trim().is_empty() {
            return Err(ConfigError::MissingAuthToken(self.name.clone()));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::MissingRegion(self.name.clone()));
        }
        if non_empty(&self.root_folder_id).is_some() {
            return Ok(());
        }
        if non_empty(&self.user_query).is_none() {
            return Err(ConfigError::MissingRoot(self.name.clone()));
        }
        if non_empty(&self.organisation_id).is_none() {
            return Err(ConfigError::MissingOrganisation(self.name.clone()));
        }
        Ok(())
    }

    pub fn client(&self) -> Result<DocStoreClient, DocStoreError> {
        match self.endpoint.as_deref() {
            Some(endpoint) => DocStoreClient::with_base_url(endpoint, self.auth_token.clone()),
            None => DocStoreClient::for_region(&self.region, self.auth_token.clone()),
        }
    }

    pub fn root_folder_id(&self) -> Option<&str> {
        non_empty(&self.root_folder_id)
    }

    pub fn user_query(&self) -> Option<(&str, &str)> {
        Some((non_empty(&self.organisation_id)?, non_empty(&self.user_query)?))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(text) => Some(text.clone()),
        serde_yaml::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Settings file: explicit argument, then `SETTINGS_FILE` / `settings_file`,
/// then `settings.yaml` in the working directory.
pub fn settings_path(explicit: Option<&str>) -> PathBuf {
    let from_env = SETTINGS_ENV_VARS
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty());
    let value = explicit
        .map(str::to_string)
        .or(from_env)
        .unwrap_or_else(|| DEFAULT_SETTINGS_FILE.to_string());
    match dirs::home_dir() {
        Some(home) => expand_with_home(&value, &home),
        None => PathBuf::from(value),
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
settings:
  dataStoreDir: /tmp/drive2docs
mimeTypes:
  jpg: image/jpeg
  jpeg: image/jpeg
gdrives:
  - name: work
    accessToken: ya29.token
    cleanup: true
    destination: docs
    rootDirName: My Drive
    dontDeleteDir:
      - /Reports
      - Archive/2020
    concurrency: 4
    exports:
      application/vnd.google-apps.spreadsheet:
        - application/x-vnd.oasis.opendocument.spreadsheet
  - name: offline
    accessToken: other
    downloadOnly: true
    dontDeleteDir: /Keep
workdocs:
  - name: docs
    authToken: secret
    userQuery: jane
    organisationId: d-123
"#;

    fn sample() -> Settings {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn load_from_yaml_file_with_aliases_and_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(SAMPLE.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.data_dir(), PathBuf::from("/tmp/drive2docs"));

        let work = settings.source("work").unwrap();
        assert_eq!(work.file_fetch_size, 1000);
        assert_eq!(work.folder_hierarchy_fetch_size, 1000);
        assert_eq!(work.target_dir_name, "GDrive");
        assert_eq!(work.root_path(), "/My Drive");
        assert_eq!(work.concurrency, 4);
        assert!(work.cleanup);
        assert!(!work.download_only);
        assert_eq!(
            work.local_root(&settings.data_dir()),
            PathBuf::from("/tmp/drive2docs/GDrive")
        );

        let docs = settings.destination("docs").unwrap();
        assert_eq!(docs.region, "eu-west-1");
        assert_eq!(docs.server_side_encryption, "AES256");
        assert_eq!(docs.user_query(), Some(("d-123", "jane")));
        assert_eq!(docs.root_folder_id(), None);
    }

    #[test]
    fn load_reports_missing_and_invalid_files() {
        assert!(matches!(
            Settings::load(Path::new("/nonexistent/settings.yaml")),
            Err(ConfigError::Read { .. })
        ));

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"gdrives: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();
        assert!(matches!(
            Settings::load(tmp.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_skips_unnamed_instances() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(
            br#"
sources:
  - accessToken: stray
  - name: work
    accessToken: t
  - name: " "
    accessToken: t
destinations:
  - authToken: stray
  - name: docs
    authToken: secret
    rootFolderId: root
"#,
        )
        .unwrap();
        tmp.flush().unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        let sources: Vec<_> = settings.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(sources, vec!["work"]);
        assert_eq!(settings.destinations.len(), 1);
        assert!(settings.destination("docs").is_some());
    }

    #[test]
    fn protected_prefixes_accept_list_or_scalar() {
        let settings = sample();
        let work = settings.source("work").unwrap().delete_guard();
        assert!(!work.may_delete("/Reports/Q1"));
        assert!(!work.may_delete("/Archive/2020/x"));
        assert!(work.may_delete("/Other"));

        let offline = settings.source("offline").unwrap().delete_guard();
        assert!(!offline.may_delete("/Keep/a"));
    }

    #[test]
    fn mime_types_extend_builtin_table() {
        let mime = sample().mime_table();
        assert_eq!(mime.content_type_for_extension("jpeg"), Some("image/jpeg"));
        assert_eq!(mime.extension_for("image/jpeg"), Some("jpeg"));
        assert_eq!(mime.extension_for("application/pdf"), Some("pdf"));
    }

    #[test]
    fn export_overrides_reach_the_selector() {
        let settings = sample();
        let selector = settings
            .source("work")
            .unwrap()
            .export_selector(settings.mime_table());
        let reps = selector.representations("application/vnd.google-apps.spreadsheet");
        assert_eq!(reps.len(), 1);
        assert_eq!(
            reps[0].content_type,
            "application/x-vnd.oasis.opendocument.spreadsheet"
        );
        assert_eq!(
            selector.representations("application/vnd.google-apps.document").len(),
            2
        );
    }

    #[test]
    fn validate_source_resolves_destination() {
        let settings = sample();
        let work = settings.source("work").unwrap();
        let destination = settings.validate_source(work).unwrap();
        assert_eq!(destination.map(|d| d.name.as_str()), Some("docs"));

        let offline = settings.source("offline").unwrap();
        assert!(settings.validate_source(offline).unwrap().is_none());
    }

    #[test]
    fn validate_rejects_incomplete_instances() {
        let settings: Settings = serde_yaml::from_str(
            r#"
sources:
  - name: blank
  - name: nowhere
    accessToken: t
    destination: missing
  - name: orphan
    accessToken: t
destinations:
  - name: anonymous
    userQuery: jane
"#,
        )
        .unwrap();

        let check = |name: &str| settings.validate_source(settings.source(name).unwrap());
        assert!(matches!(check("blank"), Err(ConfigError::MissingAccessToken(_))));
        assert!(matches!(
            check("nowhere"),
            Err(ConfigError::UnknownDestination { .. })
        ));
        assert!(check("orphan").unwrap().is_none());

        let mut dest = settings.destination("anonymous").unwrap().clone();
        assert!(matches!(dest.validate(), Err(ConfigError::MissingAuthToken(_))));
        dest.auth_token = "secret".into();
        assert!(matches!(
            dest.validate(),
            Err(ConfigError::MissingOrganisation(_))
        ));
        dest.user_query = None;
        assert!(matches!(dest.validate(), Err(ConfigError::MissingRoot(_))));
        dest.root_folder_id = Some("root".into());
        dest.region = " ".into();
        assert!(matches!(dest.validate(), Err(ConfigError::MissingRegion(_))));
        dest.region = "us-east-1".into();
        assert!(dest.validate().is_ok());
    }

    #[test]
    fn settings_path_prefers_explicit_argument() {
        assert_eq!(
            settings_path(Some("/etc/drive2docs.yaml")),
            PathBuf::from("/etc/drive2docs.yaml")
        );
    }

    #[test]
    fn expand_with_home_handles_tilde_prefix() {
        let home = PathBuf::from("/home/user");
        assert_eq!(expand_with_home("~", &home), home);
        assert_eq!(
            expand_with_home("~/data", &home),
            PathBuf::from("/home/user/data")
        );
        assert_eq!(expand_with_home("/abs", &home), PathBuf::from("/abs"));
    }
}
