//! AWS CloudControl CLI wrapper
//!
//! Wraps the `aws cloudcontrol` subcommands. Calls run under ambient AWS
//! CLI credentials; results are classified here so the retry controller
//! only ever sees the `retryable` flag.

use converge_cloud::{CallError, CliOutput, CliRunner};
use serde_json::Value;

/// Throttling signatures the AWS CLI surfaces on stderr.
pub const RATE_LIMIT_MARKERS: [&str; 4] = [
    "Throttling",
    "TooManyRequests",
    "RequestLimitExceeded",
    "ThrottlingException",
];

/// Classify one CLI invocation at the transport boundary: parsed stdout
/// on success, a [`CallError`] carrying exit code, stdout and stderr
/// verbatim otherwise.
pub fn classify(output: CliOutput) -> Result<Value, CallError> {
    if output.success() {
        if output.stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&output.stdout).map_err(|err| {
            CallError::fatal(
                Some(0),
                format!(
                    "unable to parse aws CLI output: {err}\n\nSTDOUT:\n\n{}",
                    output.stdout
                ),
            )
        })
    } else {
        let retryable = RATE_LIMIT_MARKERS
            .iter()
            .any(|marker| output.stderr.contains(marker));
        Err(CallError {
            code: Some(output.exit_code as i64),
            message: format!(
                "aws CLI exited with code {}.\n\nSTDOUT:\n\n{}\n\nSTDERR:\n\n{}",
                output.exit_code, output.stdout, output.stderr
            ),
            retryable,
        })
    }
}

/// `aws cloudcontrol` CLI wrapper
pub struct CloudControlCli {
    runner: CliRunner,
    region: String,
}

impl CloudControlCli {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            runner: CliRunner::new("aws"),
            region: region.into(),
        }
    }

    async fn call(&self, args: &[&str]) -> Result<Value, CallError> {
        let mut cli_args = vec!["cloudcontrol"];
        cli_args.extend_from_slice(args);
        cli_args.extend_from_slice(&["--region", &self.region, "--no-cli-pager"]);

        let output = self
            .runner
            .run(&cli_args)
            .await
            .map_err(|err| CallError::fatal(None, format!("failed to invoke aws CLI: {err}")))?;
        classify(output)
    }

    pub async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &Value,
    ) -> Result<Value, CallError> {
        let desired = desired_state.to_string();
        self.call(&[
            "create-resource",
            "--type-name",
            type_name,
            "--desired-state",
            &desired,
        ])
        .await
    }

    pub async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<Value, CallError> {
        self.call(&[
            "get-resource",
            "--type-name",
            type_name,
            "--identifier",
            identifier,
        ])
        .await
    }

    pub async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_document: &str,
    ) -> Result<Value, CallError> {
        self.call(&[
            "update-resource",
            "--type-name",
            type_name,
            "--identifier",
            identifier,
            "--patch-document",
            patch_document,
        ])
        .await
    }

    pub async fn delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<Value, CallError> {
        self.call(&[
            "delete-resource",
            "--type-name",
            type_name,
            "--identifier",
            identifier,
        ])
        .await
    }

    pub async fn list_resources(
        &self,
        type_name: &str,
        next_token: Option<&str>,
    ) -> Result<Value, CallError> {
        let mut args = vec!["list-resources", "--type-name", type_name];
        if let Some(token) = next_token {
            args.push("--next-token");
            args.push(token);
        }
        self.call(&args).await
    }

    pub async fn request_status(&self, request_token: &str) -> Result<Value, CallError> {
        self.call(&[
            "get-resource-request-status",
            "--request-token",
            request_token,
        ])
        .await
    }
}

/// `ResourceDescription.Properties` comes back as a string of JSON.
pub fn parse_properties(resource_response: &Value) -> converge_cloud::Result<Value> {
    let raw = resource_response
        .pointer("/ResourceDescription/Properties")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            converge_cloud::CloudError::OperationFailed(format!(
                "missing ResourceDescription.Properties in response: {resource_response}"
            ))
        })?;
    Ok(serde_json::from_str(raw)?)
}
