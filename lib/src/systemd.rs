use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::{ConfigOverrides, Error, Result, UnitConfig};

/// Directory generated units are meant to be installed into.
pub const UNIT_DIR: &str = "/lib/systemd/system";

pub const WANTED_BY: &str = "multi-user.target";

const HOME_PREFIX: &str = "~/";

impl ConfigOverrides {
    /// Settings used for anything an override leaves unset.
    pub fn default_set() -> Self {
        Self {
            service_type: Some("simple".to_string()),
            user: Some("root".to_string()),
            group: Some("root".to_string()),
            limit_nofile: Some(4096),
            restart: Some("always".to_string()),
            restart_sec: Some("5s".to_string()),
        }
    }
}

struct Settings {
    service_type: String,
    user: String,
    group: String,
    limit_nofile: u64,
    restart: String,
    restart_sec: String,
}

impl Settings {
    fn merge(overrides: ConfigOverrides) -> Self {
        let defaults = ConfigOverrides::default_set();
        let pick = |value: Option<String>, default: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .or(default)
                .unwrap_or_default()
        };
        Self {
            service_type: pick(overrides.service_type, defaults.service_type),
            user: pick(overrides.user, defaults.user),
            group: pick(overrides.group, defaults.group),
            limit_nofile: overrides
                .limit_nofile
                .or(defaults.limit_nofile)
                .unwrap_or_default(),
            restart: pick(overrides.restart, defaults.restart),
            restart_sec: pick(overrides.restart_sec, defaults.restart_sec),
        }
    }
}

/// Builds a [`UnitConfig`] for a program living under a base directory.
///
/// ```
/// use boxlib::{ConfigOverrides, UnitConfigBuilder};
///
/// let config = UnitConfigBuilder::new("my-node-server", "~/my-node-server", "node dist/index.js")
///     .overrides(ConfigOverrides {
///         user: Some("node".to_string()),
///         ..Default::default()
///     })
///     .home_dir("/home/node")
///     .build()
///     .unwrap();
/// assert_eq!(config.exec_start, "/home/node/my-node-server/node dist/index.js");
/// assert_eq!(config.group, "root");
/// ```
#[derive(Debug, Clone)]
pub struct UnitConfigBuilder {
    service_name: String,
    base_dir: String,
    exec_command: String,
    overrides: ConfigOverrides,
    home_dir: Option<PathBuf>,
}

impl UnitConfigBuilder {
    pub fn new(
        service_name: impl Into<String>,
        base_dir: impl Into<String>,
        exec_command: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            base_dir: base_dir.into(),
            exec_command: exec_command.into(),
            overrides: ConfigOverrides::default(),
            home_dir: None,
        }
    }

    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Home directory used to expand `~/`. Defaults to the current user's.
    pub fn home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    pub fn build(self) -> Result<UnitConfig> {
        let settings = Settings::merge(self.overrides);
        for (field, value) in [
            ("service name", &self.service_name),
            ("base directory", &self.base_dir),
            ("command", &self.exec_command),
            ("Type", &settings.service_type),
            ("User", &settings.user),
            ("Group", &settings.group),
            ("Restart", &settings.restart),
            ("RestartSec", &settings.restart_sec),
        ] {
            reject_control_characters(field, value)?;
        }

        let base_dir = match self.base_dir.strip_prefix(HOME_PREFIX) {
            Some(rest) => {
                let home = self
                    .home_dir
                    .or_else(dirs::home_dir)
                    .ok_or(Error::HomeDirUnavailable)?;
                home.join(rest)
            }
            None => PathBuf::from(&self.base_dir),
        };
        let base_dir = absolute(&base_dir)?;

        let log_path = base_dir.join("logs").join("service.log");
        let exec_path = normalize(&base_dir.join(self.exec_command.trim_start_matches('/')));
        let log_target = format!("append:{}", log_path.display());

        tracing::debug!(
            service = %self.service_name,
            base_dir = %base_dir.display(),
            "built unit config"
        );

        Ok(UnitConfig {
            description: format!("{} service", self.service_name),
            service_type: settings.service_type,
            user: settings.user,
            group: settings.group,
            limit_nofile: settings.limit_nofile,
            restart: settings.restart,
            restart_sec: settings.restart_sec,
            standard_output: log_target.clone(),
            standard_error: log_target,
            exec_start: exec_path.display().to_string(),
            wanted_by: WANTED_BY.to_string(),
            save_path: save_path(&self.service_name),
        })
    }
}

/// Unit files are line based, so a newline in any value would smuggle in
/// extra keys.
fn reject_control_characters(field: &'static str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(Error::ControlCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

pub fn save_path(service_name: &str) -> PathBuf {
    Path::new(UNIT_DIR).join(format!("{service_name}.service"))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(Error::CurrentDir)?;
    Ok(normalize(&cwd.join(path)))
}

/// Lexically cleans a path: drops `.` and resolves `..` without touching the
/// filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn generate_file(config: &UnitConfig) -> String {
    let mut content = String::new();

    content.push_str("[Unit]\n");
    content.push_str(&format!("Description={}\n", config.description));

    content.push_str("\n[Service]\n");
    content.push_str(&format!("Type={}\n", config.service_type));
    content.push_str(&format!("User={}\n", config.user));
    content.push_str(&format!("Group={}\n", config.group));
    content.push_str(&format!("LimitNOFILE={}\n", config.limit_nofile));
    content.push_str(&format!("Restart={}\n", config.restart));
    content.push_str(&format!("RestartSec={}\n", config.restart_sec));
    content.push_str(&format!("StandardOutput={}\n", config.standard_output));
    content.push_str(&format!("StandardError={}\n", config.standard_error));
    content.push_str(&format!("ExecStart={}\n", config.exec_start));

    content.push_str("\n[Install]\n");
    content.push_str(&format!("WantedBy={}\n", config.wanted_by));

    content
}

impl fmt::Display for UnitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&generate_file(self))
    }
}
