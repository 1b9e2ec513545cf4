use std::sync::LazyLock;

use figment::{Figment, providers::{Env, Format, Yaml}};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONTAINER_NAME: &str = "nginx-webserver";

const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

static RFC1123_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("RFC 1123 label pattern is valid")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("{field} '{value}' is not a valid RFC 1123 label")]
    InvalidName { field: &'static str, value: String },
    #[error("image must not be empty")]
    EmptyImage,
    #[error("image_pull_policy '{0}' must be one of Always, IfNotPresent, Never")]
    InvalidPullPolicy(String),
    #[error("container_port {0} is outside 1..=65535")]
    InvalidPort(u32),
}

fn default_listen_addr() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_tls_cert_path() -> String {
    "/etc/webhook/certs/tls.crt".to_string()
}

fn default_tls_key_path() -> String {
    "/etc/webhook/certs/tls.key".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_image() -> String {
    "nginx:stable".to_string()
}

fn default_image_pull_policy() -> String {
    "Always".to_string()
}

fn default_container_port() -> u32 {
    80
}

fn default_tls_secret_name() -> String {
    "sidecar-injector-certs".to_string()
}

fn default_config_map_name() -> String {
    "nginx-conf".to_string()
}

fn default_config_mount_path() -> String {
    "/etc/nginx/nginx.conf".to_string()
}

fn default_tls_mount_path() -> String {
    "/etc/nginx/ssl".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectorConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_tls_cert_path")]
    pub tls_cert_path: String,
    #[serde(default = "default_tls_key_path")]
    pub tls_key_path: String,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub startup_cluster_check: bool,
    #[serde(default)]
    pub sidecar: SidecarConfig,
}

/// Shape of the injected nginx sidecar and the volumes it mounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Falls back to [`DEFAULT_CONTAINER_NAME`] when empty.
    #[serde(default)]
    pub container_name: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_image_pull_policy")]
    pub image_pull_policy: String,
    #[serde(default = "default_container_port")]
    pub container_port: u32,
    #[serde(default = "default_tls_secret_name")]
    pub tls_secret_name: String,
    #[serde(default = "default_config_map_name")]
    pub config_map_name: String,
    /// Appended to the generated volume names as `nginx-tls-<suffix>`.
    #[serde(default)]
    pub volume_suffix: String,
    #[serde(default = "default_config_mount_path")]
    pub config_mount_path: String,
    #[serde(default = "default_tls_mount_path")]
    pub tls_mount_path: String,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            container_name: String::new(),
            image: default_image(),
            image_pull_policy: default_image_pull_policy(),
            container_port: default_container_port(),
            tls_secret_name: default_tls_secret_name(),
            config_map_name: default_config_map_name(),
            volume_suffix: String::new(),
            config_mount_path: default_config_mount_path(),
            tls_mount_path: default_tls_mount_path(),
        }
    }
}

impl SidecarConfig {
    pub fn container_name_or_default(&self) -> &str {
        if self.container_name.is_empty() {
            DEFAULT_CONTAINER_NAME
        } else {
            &self.container_name
        }
    }

    pub fn volume_name(&self, prefix: &str) -> String {
        if self.volume_suffix.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix}-{}", self.volume_suffix)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_label("sidecar.container_name", self.container_name_or_default())?;
        check_label("sidecar volume name", &self.volume_name("nginx-tls"))?;
        check_label("sidecar volume name", &self.volume_name("nginx-conf"))?;

        if self.image.trim().is_empty() {
            return Err(ConfigError::EmptyImage);
        }
        if !PULL_POLICIES.contains(&self.image_pull_policy.as_str()) {
            return Err(ConfigError::InvalidPullPolicy(self.image_pull_policy.clone()));
        }
        if !(1..=65535).contains(&self.container_port) {
            return Err(ConfigError::InvalidPort(self.container_port));
        }
        Ok(())
    }
}

fn check_label(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.len() <= 63 && RFC1123_LABEL.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidName {
            field,
            value: value.to_string(),
        })
    }
}

impl InjectorConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("INJECTOR_").split("__"))
            .extract()
            .map_err(Box::new)?;
        config.sidecar.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = InjectorConfig::load("does-not-exist.yaml").expect("defaults load");
            assert_eq!(config.listen_addr, "0.0.0.0:8443");
            assert_eq!(config.tls_cert_path, "/etc/webhook/certs/tls.crt");
            assert_eq!(config.max_body_bytes, 2 * 1024 * 1024);
            assert!(!config.startup_cluster_check);
            assert_eq!(config.sidecar.image, "nginx:stable");
            assert_eq!(config.sidecar.container_name_or_default(), DEFAULT_CONTAINER_NAME);
            Ok(())
        });
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "injector.yaml",
                r#"
listen_addr: "127.0.0.1:9443"
sidecar:
  container_name: proxy
  image: nginx:1.27
  container_port: 8080
"#,
            )?;
            jail.set_env("INJECTOR_SIDECAR__VOLUME_SUFFIX", "abc");
            jail.set_env("INJECTOR_REQUEST_TIMEOUT_SECS", "3");

            let config = InjectorConfig::load("injector.yaml").expect("config loads");
            assert_eq!(config.listen_addr, "127.0.0.1:9443");
            assert_eq!(config.request_timeout_secs, 3);
            assert_eq!(config.sidecar.container_name_or_default(), "proxy");
            assert_eq!(config.sidecar.container_port, 8080);
            assert_eq!(config.sidecar.volume_name("nginx-conf"), "nginx-conf-abc");
            assert_eq!(config.sidecar.image_pull_policy, "Always");
            Ok(())
        });
    }

    #[test]
    fn invalid_container_name_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("injector.yaml", "sidecar:\n  container_name: Not_Valid\n")?;
            let err = InjectorConfig::load("injector.yaml").unwrap_err();
            assert!(matches!(err, ConfigError::InvalidName { .. }), "{err}");
            Ok(())
        });
    }

    #[test]
    fn validate_checks_pull_policy_and_port() {
        let mut sidecar = SidecarConfig::default();
        assert!(sidecar.validate().is_ok());

        sidecar.image_pull_policy = "Sometimes".to_string();
        assert!(matches!(sidecar.validate(), Err(ConfigError::InvalidPullPolicy(_))));

        sidecar.image_pull_policy = "Never".to_string();
        sidecar.container_port = 0;
        assert!(matches!(sidecar.validate(), Err(ConfigError::InvalidPort(0))));

        sidecar.container_port = 443;
        sidecar.image = " ".to_string();
        assert!(matches!(sidecar.validate(), Err(ConfigError::EmptyImage)));
    }
}
