//! GCP provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Token acquisition failed: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, GcpError>;

impl From<GcpError> for converge_cloud::CloudError {
    fn from(err: GcpError) -> Self {
        converge_cloud::CloudError::Configuration(err.to_string())
    }
}
