//! Provider transports
//!
//! One authenticated call to a provider, as a CLI subprocess or an HTTP
//! request, returning a normalized result the caller can classify.
//! Non-zero exits and non-2xx statuses are data here, not errors: the
//! per-provider classifier decides what is retryable.

use crate::error::{CallError, Result};
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;

/// Normalized result of one CLI invocation.
#[derive(Debug, Clone)]
pub struct CliOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one program with piped stdio.
pub struct CliRunner {
    program: String,
}

impl CliRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the program to completion. Only a spawn failure is an error;
    /// a non-zero exit comes back as data for the classifier.
    pub async fn run(&self, args: &[&str]) -> Result<CliOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let output = cmd.output().await?;

        Ok(CliOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Normalized result of one HTTP call.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,

    /// `Location` header, present on async-accepted responses.
    pub location: Option<String>,

    /// Parsed JSON body, when the body parses.
    pub body: Option<Value>,

    /// Raw body text, kept for verbatim error messages.
    pub text: String,
}

impl RestResponse {
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Classify this response as a call failure. HTTP 429 is the one
    /// retryable status; everything else is fatal.
    pub fn into_call_error(self) -> CallError {
        let retryable = self.status == 429;
        let detail = if self.text.trim().is_empty() {
            "<empty body>"
        } else {
            self.text.trim()
        };
        CallError {
            code: Some(self.status as i64),
            message: format!("HTTP {}: {}", self.status, detail),
            retryable,
        }
    }

    /// Accept 2xx/3xx, classify everything else.
    pub fn require_success(self) -> std::result::Result<RestResponse, CallError> {
        if self.status < 400 {
            Ok(self)
        } else {
            Err(self.into_call_error())
        }
    }
}

/// Thin reqwest wrapper issuing one bearer-authenticated JSON call.
pub struct RestClient {
    client: reqwest::Client,
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&Value>,
    ) -> std::result::Result<RestResponse, CallError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(json) = body {
            request = request.json(json);
        }

        let response = request
            .send()
            .await
            .map_err(|err| CallError::fatal(None, format!("request to {url} failed: {err}")))?;

        Self::normalize(response).await
    }

    /// Form-encoded POST, used by OAuth2 token endpoints.
    pub async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<RestResponse, CallError> {
        tracing::debug!("POST {} (form)", url);

        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|err| CallError::fatal(None, format!("request to {url} failed: {err}")))?;

        Self::normalize(response).await
    }

    async fn normalize(
        response: reqwest::Response,
    ) -> std::result::Result<RestResponse, CallError> {
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = response.text().await.map_err(|err| {
            CallError::fatal(
                Some(status as i64),
                format!("failed reading response body: {err}"),
            )
        })?;
        let body = serde_json::from_str(&text).ok();

        Ok(RestResponse {
            status,
            location,
            body,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cli_runner_captures_output() {
        let runner = CliRunner::new("echo");
        let output = runner.run(&["hello"]).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn test_rest_classification() {
        let throttled = RestResponse {
            status: 429,
            location: None,
            body: None,
            text: "Too Many Requests".into(),
        };
        let err = throttled.into_call_error();
        assert!(err.retryable);
        assert_eq!(err.code, Some(429));

        let bad = RestResponse {
            status: 400,
            location: None,
            body: None,
            text: r#"{"error": "bad request"}"#.into(),
        };
        let err = bad.require_success().unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("bad request"));

        let accepted = RestResponse {
            status: 202,
            location: Some("https://poll.example/op/1".into()),
            body: None,
            text: String::new(),
        };
        assert!(accepted.require_success().is_ok());
    }
}
