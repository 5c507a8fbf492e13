//! Admin login endpoint for the writeup board.
//!
//! `POST /api/login` with `{"password": "..."}` answers 200/401/400/500
//! per the verdict; any other method on the route gets 405 with an
//! `Allow: POST` header from the method router. The shared secret comes
//! from `KNULL_SECRET`.

use anyhow::{Result, anyhow};
use axum::{
    Json, Router,
    extract::State,
    extract::rejection::JsonRejection,
    http::StatusCode,
    routing::post,
};
use log::{info, warn};
use serde::Deserialize;

use knull_writeups::auth::{LoginResponse, judge};

const DEFAULT_ADDR: &str = "127.0.0.1:8787";

#[derive(Clone)]
struct AppState {
    secret: Option<String>,
}

// The body is decoded permissively: a missing password must map to 400
// with the contract's error text, not to an extractor rejection.
#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> (StatusCode, Json<LoginResponse>) {
    let body = body.ok();
    let password = body.as_ref().and_then(|b| b.password.as_deref());
    let verdict = judge(state.secret.as_deref(), password);
    let status = StatusCode::from_u16(verdict.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("login rejected: KNULL_SECRET is not configured");
    } else {
        info!("login attempt -> {}", status.as_u16());
    }
    (status, Json(verdict.response()))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")
        .map_err(|e| anyhow!("invalid log level: {e}"))?
        .log_to_stderr()
        .start()
        .map_err(|e| anyhow!("failed to start logger: {e}"))?;

    let mut addr = DEFAULT_ADDR.to_string();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("knull-authd v{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--addr" => {
                if let Some(a) = args.next() {
                    addr = a;
                } else {
                    return Err(anyhow!("--addr requires host:port"));
                }
            }
            _ => {}
        }
    }

    let secret = std::env::var("KNULL_SECRET").ok().filter(|s| !s.is_empty());
    if secret.is_none() {
        warn!("KNULL_SECRET is unset; every login will fail with 500");
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("auth endpoint listening on http://{addr}/api/login");
    axum::serve(listener, router(AppState { secret })).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn correct_password_grants_access() {
        let state = AppState {
            secret: Some("hunter2".to_string()),
        };
        let body = Json(LoginBody {
            password: Some("hunter2".to_string()),
        });
        let (status, Json(response)) = login(State(state), Ok(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let state = AppState {
            secret: Some("hunter2".to_string()),
        };
        let body = Json(LoginBody {
            password: Some("letmein".to_string()),
        });
        let (status, Json(response)) = login(State(state), Ok(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.error.as_deref(), Some("Authentication failed."));
    }

    #[tokio::test]
    async fn missing_password_is_a_bad_request() {
        let state = AppState {
            secret: Some("hunter2".to_string()),
        };
        let body = Json(LoginBody { password: None });
        let (status, Json(response)) = login(State(state), Ok(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.as_deref(), Some("Password is required."));
    }

    #[tokio::test]
    async fn unconfigured_secret_is_an_internal_error() {
        let state = AppState { secret: None };
        let body = Json(LoginBody {
            password: Some("anything".to_string()),
        });
        let (status, Json(response)) = login(State(state), Ok(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.success);
    }
}
