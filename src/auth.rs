use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Wire contract of the login endpoint: `POST {login_url}` with
/// `{"password": "..."}`, answered by `LoginResponse` under the status
/// codes `Verdict` maps to.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a password check, shared by the server binary and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    Denied,
    MissingPassword,
    Unconfigured,
}

/// Pure decision logic behind the endpoint. `secret` is the server-held
/// password (absent when the deployment is misconfigured); `password` is
/// the client's attempt (absent or empty when the body lacked one).
pub fn judge(secret: Option<&str>, password: Option<&str>) -> Verdict {
    let Some(secret) = secret else {
        return Verdict::Unconfigured;
    };
    match password {
        None | Some("") => Verdict::MissingPassword,
        Some(attempt) if attempt == secret => Verdict::Granted,
        Some(_) => Verdict::Denied,
    }
}

impl Verdict {
    pub fn status(&self) -> u16 {
        match self {
            Verdict::Granted => 200,
            Verdict::Denied => 401,
            Verdict::MissingPassword => 400,
            Verdict::Unconfigured => 500,
        }
    }

    pub fn response(&self) -> LoginResponse {
        match self {
            Verdict::Granted => LoginResponse { success: true, error: None },
            Verdict::Denied => LoginResponse {
                success: false,
                error: Some("Authentication failed.".to_string()),
            },
            Verdict::MissingPassword => LoginResponse {
                success: false,
                error: Some("Password is required.".to_string()),
            },
            Verdict::Unconfigured => LoginResponse {
                success: false,
                error: Some(
                    "Authentication service is not configured. Please contact the administrator."
                        .to_string(),
                ),
            },
        }
    }
}

/// Submits a password to the remote endpoint and returns the decoded
/// body regardless of HTTP status (failure statuses carry an error
/// message worth showing). Network-level failures surface as `Err`.
///
/// No request timeout is set: a hung endpoint leaves the caller's
/// loading state in place, matching the original behavior. Callers run
/// this on a worker thread and drop the result channel on teardown, so
/// a stale response is simply ignored.
pub fn request_login(url: &str, password: &str) -> Result<LoginResponse> {
    let client = reqwest::blocking::Client::builder()
        .timeout(None)
        .build()
        .context("Failed to build HTTP client")?;
    let response = client
        .post(url)
        .json(&LoginRequest {
            password: password.to_string(),
        })
        .send()
        .context("Login request failed")?;
    response
        .json::<LoginResponse>()
        .context("Login response was not understood")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_is_granted() {
        let verdict = judge(Some("hunter2"), Some("hunter2"));
        assert_eq!(verdict, Verdict::Granted);
        assert_eq!(verdict.status(), 200);
        assert_eq!(
            verdict.response(),
            LoginResponse { success: true, error: None }
        );
    }

    #[test]
    fn near_miss_is_denied() {
        let verdict = judge(Some("hunter2"), Some("hunter2 "));
        assert_eq!(verdict, Verdict::Denied);
        assert_eq!(verdict.status(), 401);
        assert!(verdict.response().error.is_some());
    }

    #[test]
    fn missing_or_empty_password_is_a_bad_request() {
        assert_eq!(judge(Some("s"), None), Verdict::MissingPassword);
        assert_eq!(judge(Some("s"), Some("")), Verdict::MissingPassword);
        assert_eq!(Verdict::MissingPassword.status(), 400);
    }

    #[test]
    fn unconfigured_server_reports_internal_error() {
        // Misconfiguration outranks the missing-password check, as in the
        // original endpoint.
        assert_eq!(judge(None, None), Verdict::Unconfigured);
        assert_eq!(judge(None, Some("anything")), Verdict::Unconfigured);
        assert_eq!(Verdict::Unconfigured.status(), 500);
    }

    #[test]
    fn success_body_omits_the_error_field() {
        let body = serde_json::to_string(&Verdict::Granted.response()).expect("serialize");
        assert_eq!(body, r#"{"success":true}"#);
    }

    #[test]
    fn failure_body_parses_back() {
        let parsed: LoginResponse =
            serde_json::from_str(r#"{"success":false,"error":"Authentication failed."}"#)
                .expect("parse");
        assert_eq!(parsed, Verdict::Denied.response());
    }
}
