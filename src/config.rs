use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const SETTINGS_FILE: &str = "autoreply.json";

// ── On-disk format ──

/// Settings file exactly as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(default)]
    pub logging: bool,
    #[serde(default = "default_smtp_host")]
    pub smtp: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub starttls: bool,
    #[serde(default)]
    pub smtp_ssl: bool,
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub autoreply: Vec<RuleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub email: TriggerField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "reply-to", default)]
    pub reply_to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html: bool,
    #[serde(default)]
    pub attachment: Option<PathBuf>,
}

/// The `email` field accepts a single address or a list of addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerField {
    One(String),
    Many(Vec<String>),
}

impl TriggerField {
    fn into_addresses(self) -> Vec<String> {
        match self {
            TriggerField::One(addr) => vec![addr],
            TriggerField::Many(addrs) => addrs,
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            logging: false,
            smtp: default_smtp_host(),
            port: default_smtp_port(),
            starttls: false,
            smtp_ssl: false,
            auth: false,
            username: String::new(),
            password: String::new(),
            autoreply: vec![RuleEntry {
                email: TriggerField::One("foo@bar".to_string()),
                from: None,
                reply_to: "foo@bar".to_string(),
                subject: "Subject here".to_string(),
                body: "Email body here".to_string(),
                html: false,
                attachment: None,
            }],
        }
    }
}

impl SettingsFile {
    /// Copy safe to print: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.password.is_empty() {
            copy.password = "********".to_string();
        }
        copy
    }
}

// ── Validated settings ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    StartTls,
    ImplicitTls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRule {
    /// Never empty.
    pub addresses: Vec<String>,
    pub from: Option<String>,
    pub reply_to: String,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachment: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: bool,
    pub smtp: SmtpSettings,
    pub rules: Vec<ReplyRule>,
}

impl TryFrom<RuleEntry> for ReplyRule {
    type Error = ConfigError;

    fn try_from(entry: RuleEntry) -> Result<Self, Self::Error> {
        let addresses = entry.email.into_addresses();
        if addresses.is_empty() {
            return Err(ConfigError::Invalid(
                "autoreply rule has an empty email list".to_string(),
            ));
        }
        if addresses.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "autoreply rule has an empty email address".to_string(),
            ));
        }
        let from = entry.from.filter(|f| !f.trim().is_empty());
        Ok(Self {
            addresses,
            from,
            reply_to: entry.reply_to,
            subject: entry.subject,
            body: entry.body,
            html: entry.html,
            attachment: entry.attachment,
        })
    }
}

impl TryFrom<SettingsFile> for Settings {
    type Error = ConfigError;

    fn try_from(file: SettingsFile) -> Result<Self, Self::Error> {
        let encryption = match (file.starttls, file.smtp_ssl) {
            (false, false) => Encryption::None,
            (true, false) => Encryption::StartTls,
            (false, true) => Encryption::ImplicitTls,
            (true, true) => {
                return Err(ConfigError::Invalid(
                    "starttls and smtp_ssl are mutually exclusive".to_string(),
                ))
            }
        };
        let credentials = if file.auth {
            if file.username.is_empty() {
                return Err(ConfigError::Invalid(
                    "auth is enabled but username is empty".to_string(),
                ));
            }
            Some(Credentials {
                username: file.username,
                password: file.password,
            })
        } else {
            None
        };
        let rules = file
            .autoreply
            .into_iter()
            .map(ReplyRule::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            logging: file.logging,
            smtp: SmtpSettings {
                host: file.smtp,
                port: file.port,
                encryption,
                credentials,
            },
            rules,
        })
    }
}

// ── Paths ──

/// `$AUTOREPLY_CONFIG`, falling back to `~/autoreply.json`.
pub fn settings_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = env::var("AUTOREPLY_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    debug!("[config] AUTOREPLY_CONFIG not set, using ~/{}", SETTINGS_FILE);
    home_file(SETTINGS_FILE)
}

/// `name` inside the home directory. The passwd entry is used when `HOME`
/// is not exported, as under Postfix pipe(8).
pub fn home_file(name: &'static str) -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(name))
        .ok_or(ConfigError::NoHome(name))
}

// ── Loading and writing ──

/// Reads and parses the settings file without validating it.
pub fn read_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            ConfigError::Missing(path.to_path_buf())
        } else {
            ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the settings snapshot for this invocation. A missing file is
/// replaced by a default one and still reported as an error.
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    debug!("[config] loading settings from {}", path.display());
    let file = match read_file(path) {
        Ok(file) => file,
        Err(ConfigError::Missing(p)) => {
            warn!("[config] settings file {} missing, writing default", p.display());
            write_default(&p)?;
            return Err(ConfigError::Missing(p));
        }
        Err(e) => return Err(e),
    };
    let settings = Settings::try_from(file)?;
    info!(
        "[config] loaded {} autoreply rule(s), smtp={}:{}",
        settings.rules.len(),
        settings.smtp.host,
        settings.smtp.port
    );
    Ok(settings)
}

/// Writes the default settings. An existing file is kept as `<path>.bak`.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    if path.is_file() {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".bak");
        let backup = PathBuf::from(backup);
        info!("[config] backing up {} to {}", path.display(), backup.display());
        fs::rename(path, &backup).map_err(|source| ConfigError::Write {
            path: backup.clone(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(&SettingsFile::default())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    fs::write(path, json + "\n").map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!("[config] default settings written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Settings, ConfigError> {
        let file: SettingsFile = serde_json::from_str(json).map_err(|source| {
            ConfigError::Malformed {
                path: PathBuf::from("inline"),
                source,
            }
        })?;
        Settings::try_from(file)
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let s = parse(r#"{"autoreply":[{"email":"a@x","subject":"S","body":"B"}]}"#).unwrap();
        assert!(!s.logging);
        assert_eq!(s.smtp.host, "localhost");
        assert_eq!(s.smtp.port, 25);
        assert_eq!(s.smtp.encryption, Encryption::None);
        assert!(s.smtp.credentials.is_none());
        assert_eq!(s.rules[0].addresses, vec!["a@x".to_string()]);
        assert_eq!(s.rules[0].from, None);
        assert!(!s.rules[0].html);
    }

    #[test]
    fn single_address_and_single_element_list_normalize_equally() {
        let one = parse(r#"{"autoreply":[{"email":"a@x","subject":"S","body":"B"}]}"#).unwrap();
        let many = parse(r#"{"autoreply":[{"email":["a@x"],"subject":"S","body":"B"}]}"#).unwrap();
        assert_eq!(one.rules, many.rules);
    }

    #[test]
    fn address_list_keeps_duplicates_and_order() {
        let s = parse(r#"{"autoreply":[{"email":["b@y","a@x","b@y"],"subject":"S","body":"B"}]}"#)
            .unwrap();
        assert_eq!(s.rules[0].addresses, vec!["b@y", "a@x", "b@y"]);
    }

    #[test]
    fn empty_address_list_is_rejected() {
        let err = parse(r#"{"autoreply":[{"email":[],"subject":"S","body":"B"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = parse(r#"{"SMTP":"localhost","autoreply":[]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = parse(r#"{"logging":"on","autoreply":[]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn encryption_modes() {
        let s = parse(r#"{"starttls":true,"autoreply":[]}"#).unwrap();
        assert_eq!(s.smtp.encryption, Encryption::StartTls);
        let s = parse(r#"{"smtp_ssl":true,"port":465,"autoreply":[]}"#).unwrap();
        assert_eq!(s.smtp.encryption, Encryption::ImplicitTls);
        assert_eq!(s.smtp.port, 465);
        assert!(parse(r#"{"starttls":true,"smtp_ssl":true,"autoreply":[]}"#).is_err());
    }

    #[test]
    fn auth_requires_username() {
        assert!(parse(r#"{"auth":true,"autoreply":[]}"#).is_err());
        let s = parse(r#"{"auth":true,"username":"u","password":"p","autoreply":[]}"#).unwrap();
        assert_eq!(
            s.smtp.credentials,
            Some(Credentials {
                username: "u".to_string(),
                password: "p".to_string()
            })
        );
    }

    #[test]
    fn blank_from_is_treated_as_absent() {
        let s = parse(r#"{"autoreply":[{"email":"a@x","from":"  ","subject":"S","body":"B"}]}"#)
            .unwrap();
        assert_eq!(s.rules[0].from, None);
    }

    #[test]
    fn missing_file_writes_default_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(path.is_file());
        let s = load(&path).unwrap();
        assert_eq!(s.rules.len(), 1);
        assert_eq!(s.rules[0].addresses, vec!["foo@bar".to_string()]);
    }

    #[test]
    fn write_default_backs_up_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{\"logging\":true}").unwrap();
        write_default(&path).unwrap();
        let backup = dir.path().join("autoreply.json.bak");
        assert_eq!(fs::read_to_string(backup).unwrap(), "{\"logging\":true}");
        assert!(!read_file(&path).unwrap().logging);
    }

    #[test]
    fn malformed_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Malformed { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    }

    #[cfg(unix)]
    #[test]
    fn settings_path_resolves_without_home_variable() {
        let saved_home = env::var_os("HOME");
        let saved_config = env::var_os("AUTOREPLY_CONFIG");
        env::remove_var("AUTOREPLY_CONFIG");
        env::remove_var("HOME");

        let path = settings_path();

        if let Some(home) = saved_home {
            env::set_var("HOME", home);
        }
        if let Some(config) = saved_config {
            env::set_var("AUTOREPLY_CONFIG", config);
        }
        let path = path.unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with(SETTINGS_FILE));
    }

    #[test]
    fn redacted_masks_password() {
        let mut file = SettingsFile::default();
        file.password = "secret".to_string();
        assert_eq!(file.redacted().password, "********");
        assert_eq!(SettingsFile::default().redacted().password, "");
    }
}
