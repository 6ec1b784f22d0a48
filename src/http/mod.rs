//! HTTP transport for the JSON-RPC endpoint

pub mod handlers;
