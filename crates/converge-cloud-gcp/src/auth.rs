//! Service-account token acquisition via the gcloud CLI
//!
//! Activates the service account named by
//! `GOOGLE_APPLICATION_CREDENTIALS` and prints an access token for it.
//! The token lives for one reconciliation; no caching.

use crate::error::{GcpError, Result};
use converge_cloud::CliRunner;

pub struct GcloudAuth {
    runner: CliRunner,
}

impl Default for GcloudAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl GcloudAuth {
    pub fn new() -> Self {
        Self {
            runner: CliRunner::new("gcloud"),
        }
    }

    pub async fn access_token(&self) -> Result<String> {
        let key_file = std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
            .map_err(|_| GcpError::MissingEnvVar("GOOGLE_APPLICATION_CREDENTIALS".into()))?;

        let activate = self
            .runner
            .run(&[
                "auth",
                "activate-service-account",
                "--key-file",
                &key_file,
                "--quiet",
            ])
            .await
            .map_err(|err| GcpError::Auth(err.to_string()))?;
        if !activate.success() {
            return Err(GcpError::Auth(format!(
                "activate-service-account failed: {}",
                activate.stderr.trim()
            )));
        }

        let output = self
            .runner
            .run(&["auth", "print-access-token", "--quiet"])
            .await
            .map_err(|err| GcpError::Auth(err.to_string()))?;
        if !output.success() {
            return Err(GcpError::Auth(format!(
                "print-access-token failed: {}",
                output.stderr.trim()
            )));
        }

        let token = output.stdout.trim().to_string();
        if token.is_empty() {
            return Err(GcpError::Auth("gcloud printed an empty access token".into()));
        }
        Ok(token)
    }
}
