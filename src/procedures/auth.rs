//! `auth.login` procedure
//!
//! Decodes `{email, password}` and exchanges them for a token through an
//! [`Authenticator`]. The stub authenticator accepts any well-formed credentials.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::jsonrpc::{Params, Procedure, ProcedureError};

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, email: &str, password: &str) -> Result<String, AuthError>;
}

/// Issues sequential opaque tokens for any credentials.
#[derive(Debug, Default)]
pub struct StubAuthenticator {
    issued: AtomicU64,
}

impl StubAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(&self, _email: &str, _password: &str) -> Result<String, AuthError> {
        let sequence = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("stub-token-{sequence}"))
    }
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    email: String,
    password: String,
}

pub struct Login {
    authenticator: Arc<dyn Authenticator>,
    email_pattern: Regex,
}

impl Login {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Result<Self, regex::Error> {
        Ok(Self {
            authenticator,
            email_pattern: Regex::new(EMAIL_PATTERN)?,
        })
    }

    fn validate(&self, params: &LoginParams) -> Result<(), ProcedureError> {
        if !self.email_pattern.is_match(params.email.trim()) || params.password.is_empty() {
            return Err(ProcedureError::bad_params());
        }
        Ok(())
    }
}

#[async_trait]
impl Procedure for Login {
    async fn call(&self, params: Params) -> Result<Value, ProcedureError> {
        let params: LoginParams = params
            .decode()
            .map_err(|_| ProcedureError::bad_params())?;
        self.validate(&params)?;

        let token = self
            .authenticator
            .authenticate(params.email.trim(), &params.password)
            .await
            .map_err(|err| ProcedureError::new(err.to_string()))?;

        debug!(email = %params.email, "login succeeded");
        Ok(json!({ "token": token }))
    }
}
