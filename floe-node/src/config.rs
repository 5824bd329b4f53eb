use envconfig::Envconfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown storage driver {0:?}, expected \"memory\" or \"file\"")]
    UnknownStorageDriver(String),

    #[error("STORAGE_PATH is required when STORAGE_DRIVER=file")]
    MissingStoragePath,

    #[error(transparent)]
    Registry(#[from] floe_registry::RegistryError),
}

/// Which actor roles this process runs. A single peer commonly runs both;
/// splitting them across processes is supported since both are plain
/// `tokio::spawn`ed tasks talking over the same RPC substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Worker,
    Both,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "leader" => Ok(Role::Leader),
            "worker" => Ok(Role::Worker),
            "both" => Ok(Role::Both),
            other => Err(format!("unknown role {other:?}, expected leader/worker/both")),
        }
    }
}

#[derive(Envconfig, Debug)]
pub struct ClusterCfg {
    #[envconfig(from = "PEER_NAME")]
    pub peer_name: String,

    #[envconfig(from = "ROLE", default = "both")]
    pub role: Role,

    #[envconfig(from = "RING_SIZE", default = "64")]
    pub ring_size: usize,
}

#[derive(Envconfig, Debug)]
pub struct RegistryCfg {
    #[envconfig(from = "REGISTRY_NAMESPACE", default = "default")]
    pub namespace: String,

    #[envconfig(from = "REGISTRY_DRIVER", default = "memory")]
    pub driver: String,
}

#[derive(Envconfig, Debug)]
pub struct MetricsCfg {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3304")]
    pub port: u16,
}

#[derive(Envconfig, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub cluster: ClusterCfg,

    #[envconfig(nested = true)]
    pub registry: RegistryCfg,

    #[envconfig(nested = true)]
    pub metrics: MetricsCfg,

    #[envconfig(from = "LOG_FORMAT", default = "text")]
    pub log_format: String,

    #[envconfig(from = "STORAGE_DRIVER", default = "memory")]
    pub storage_driver: String,

    #[envconfig(from = "STORAGE_PATH", default = "")]
    pub storage_path: String,
}

impl Config {
    pub fn registry_cfg(&self) -> Result<floe_registry::Cfg, ConfigError> {
        Ok(floe_registry::Cfg::new(
            self.registry.namespace.clone(),
            self.registry.driver.clone(),
        )?)
    }

    pub fn validate_storage(&self) -> Result<(), ConfigError> {
        match self.storage_driver.as_str() {
            "memory" => Ok(()),
            "file" => {
                if self.storage_path.is_empty() {
                    Err(ConfigError::MissingStoragePath)
                } else {
                    Ok(())
                }
            }
            other => Err(ConfigError::UnknownStorageDriver(other.to_string())),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.metrics.host, self.metrics.port)
    }
}
