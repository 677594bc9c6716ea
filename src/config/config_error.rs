
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("error reading config file {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("error parsing config file {0}: {1}")]
    Yaml(String, #[source] serde_yaml::Error),

    #[error("could not parse url {0}: {1}")]
    InvalidUrl(String, String),

    #[error("port must be provided for sap_control_url: {0}")]
    MissingPort(String),

    #[error("invalid duration for {0}: {1}")]
    Duration(String, String),
}
