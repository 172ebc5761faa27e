//! Entra provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntraError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Token acquisition failed: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, EntraError>;

impl From<EntraError> for converge_cloud::CloudError {
    fn from(err: EntraError) -> Self {
        converge_cloud::CloudError::Configuration(err.to_string())
    }
}
