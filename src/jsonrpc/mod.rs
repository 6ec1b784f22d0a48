//! JSON-RPC 2.0 core
//!
//! Envelope decoding and encoding, the procedure registry, the dispatcher that
//! routes calls to procedures, and the mapping of failures to protocol errors.

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use codec::{Call, Params, Reply, RequestId, Response};
pub use dispatcher::{Dispatcher, NotificationPolicy};
pub use error::{ErrorCode, ErrorObject};
pub use registry::{Procedure, ProcedureError, Registry};
