use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config IO Error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Config Parse Error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid cluster count: {0}")]
    InvalidClusterCount(usize),

    #[error("Detector Error: {0}")]
    Detector(String),

    #[error("Plate Error: {0}")]
    Plate(String),
}
