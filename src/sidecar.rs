use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, SecretVolumeSource, Volume, VolumeMount,
};
use tracing::debug;

use crate::config::SidecarConfig;

const TLS_VOLUME_PREFIX: &str = "nginx-tls";
const CONF_VOLUME_PREFIX: &str = "nginx-conf";
const NGINX_CONF_SUB_PATH: &str = "nginx.conf";

/// Containers and volumes injected into every admitted Pod.
///
/// Built once from [`SidecarConfig`] at startup and shared read-only across
/// request handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarTemplate {
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
}

impl SidecarTemplate {
    pub fn from_config(config: &SidecarConfig) -> Self {
        let tls_volume = config.volume_name(TLS_VOLUME_PREFIX);
        let conf_volume = config.volume_name(CONF_VOLUME_PREFIX);

        debug!(
            container = config.container_name_or_default(),
            image = %config.image,
            "generating nginx sidecar template"
        );

        let volume_mounts = vec![
            VolumeMount {
                name: conf_volume.clone(),
                mount_path: config.config_mount_path.clone(),
                sub_path: Some(NGINX_CONF_SUB_PATH.to_string()),
                ..Default::default()
            },
            VolumeMount {
                name: tls_volume.clone(),
                mount_path: config.tls_mount_path.clone(),
                ..Default::default()
            },
        ];

        let container = Container {
            name: config.container_name_or_default().to_string(),
            image: Some(config.image.clone()),
            image_pull_policy: Some(config.image_pull_policy.clone()),
            ports: Some(vec![ContainerPort {
                container_port: config.container_port as i32,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            volume_mounts: Some(volume_mounts),
            ..Default::default()
        };

        let volumes = vec![
            Volume {
                name: tls_volume,
                secret: Some(SecretVolumeSource {
                    secret_name: Some(config.tls_secret_name.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: conf_volume,
                config_map: Some(ConfigMapVolumeSource {
                    name: config.config_map_name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];

        Self {
            containers: vec![container],
            volumes,
        }
    }
}
