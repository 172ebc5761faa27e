//! DigitalOcean provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigitalOceanError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

pub type Result<T> = std::result::Result<T, DigitalOceanError>;

impl From<DigitalOceanError> for converge_cloud::CloudError {
    fn from(err: DigitalOceanError) -> Self {
        converge_cloud::CloudError::Configuration(err.to_string())
    }
}
