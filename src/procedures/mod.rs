//! Application procedures exposed over JSON-RPC

pub mod auth;

use std::sync::Arc;

use crate::jsonrpc::Registry;

use auth::{Authenticator, Login};

pub fn registry(authenticator: Arc<dyn Authenticator>) -> Result<Registry, regex::Error> {
    Ok(Registry::builder()
        .register("auth.login", Login::new(authenticator)?)
        .build())
}
