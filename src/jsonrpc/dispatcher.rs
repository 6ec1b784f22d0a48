//! Call dispatcher
//!
//! Resolves each call against the registry, runs it, and builds the response.
//! Every call runs on its own task. A batch reply is assembled in input order
//! once all of its tasks have finished.

use std::{fmt, sync::Arc};

use futures::future::join_all;

use crate::jsonrpc::{
    codec::{decode, Call, Entry, Envelope, Reply, RequestId, Response},
    error::Failure,
    registry::Registry,
};
use crate::logging::{DispatchEvent, NoopSink, TraceSink};

/// Whether calls without an id get a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotificationPolicy {
    #[default]
    Respond,
    Suppress,
}

impl NotificationPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "respond" => Some(Self::Respond),
            "suppress" => Some(Self::Suppress),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    sink: Arc<dyn TraceSink>,
    notifications: NotificationPolicy,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            sink: Arc::new(NoopSink),
            notifications: NotificationPolicy::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_notification_policy(mut self, policy: NotificationPolicy) -> Self {
        self.notifications = policy;
        self
    }

    pub async fn dispatch(&self, body: &[u8]) -> Reply {
        match decode(body) {
            Err(error) => {
                self.sink.record(&DispatchEvent::DecodeFailed { error: &error });
                Reply::Single(Response::failure(None, Failure::Decode(error)))
            }
            Ok(Envelope::Single(entry)) => {
                let expects_reply = expects_reply(&entry);
                let response = self.run_isolated(entry).await;
                if self.keeps(expects_reply) {
                    Reply::Single(response)
                } else {
                    Reply::Empty
                }
            }
            Ok(Envelope::Batch(entries)) => self.handle_batch(entries).await,
        }
    }

    /// Reply for a body the transport could not read.
    pub fn reject_unreadable(&self, reason: impl fmt::Display) -> Reply {
        Reply::Single(Response::failure(
            None,
            Failure::Unreadable(reason.to_string()),
        ))
    }

    pub async fn handle_batch(&self, entries: Vec<Entry>) -> Reply {
        if entries.is_empty() {
            return Reply::Batch(Vec::new());
        }

        self.sink.record(&DispatchEvent::BatchReceived {
            size: entries.len(),
        });

        let mut keep = Vec::with_capacity(entries.len());
        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            keep.push(self.keeps(expects_reply(&entry)));
            tasks.push(self.run_isolated(entry));
        }

        let responses: Vec<Response> = join_all(tasks)
            .await
            .into_iter()
            .zip(keep)
            .filter_map(|(response, keep)| keep.then_some(response))
            .collect();

        if responses.is_empty() {
            Reply::Empty
        } else {
            Reply::Batch(responses)
        }
    }

    /// Runs one entry on its own task so a panicking procedure only fails its own call.
    async fn run_isolated(&self, entry: Entry) -> Response {
        let id = entry_id(&entry);
        let dispatcher = self.clone();
        match tokio::spawn(async move { dispatcher.handle_entry(entry).await }).await {
            Ok(response) => response,
            Err(err) => {
                let reason = format!("call aborted: {err}");
                self.sink.record(&DispatchEvent::CallAborted {
                    id: id.as_ref(),
                    reason: &reason,
                });
                Response::failure(id, Failure::Internal(reason))
            }
        }
    }

    pub async fn handle_entry(&self, entry: Entry) -> Response {
        match entry {
            Ok(call) => self.handle_call(call).await,
            Err(invalid) => {
                self.sink.record(&DispatchEvent::InvalidCall {
                    id: invalid.id.as_ref(),
                    reason: &invalid.reason,
                });
                Response::failure(invalid.id, Failure::InvalidRequest(invalid.reason))
            }
        }
    }

    pub async fn handle_call(&self, call: Call) -> Response {
        let Call { method, params, id } = call;
        self.sink.record(&DispatchEvent::CallStarted {
            method: &method,
            id: id.as_ref(),
            params: &params,
        });

        let response = match self.registry.get(&method) {
            None => Response::failure(id, Failure::MethodNotFound(method.clone())),
            Some(procedure) => match procedure.call(params).await {
                Ok(result) => Response::success(id, result),
                Err(err) => Response::failure(id, Failure::Procedure(err)),
            },
        };

        self.sink.record(&DispatchEvent::CallFinished {
            method: &method,
            id: response.id(),
            error_code: response.error().map(|error| error.code),
        });
        response
    }

    fn keeps(&self, expects_reply: bool) -> bool {
        expects_reply || self.notifications == NotificationPolicy::Respond
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("notifications", &self.notifications)
            .finish()
    }
}

fn entry_id(entry: &Entry) -> Option<RequestId> {
    match entry {
        Ok(call) => call.id.clone(),
        Err(invalid) => invalid.id.clone(),
    }
}

/// Invalid requests are always answered, even without an id.
fn expects_reply(entry: &Entry) -> bool {
    match entry {
        Ok(call) => !call.is_notification(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use serde_json::{json, Value};
    use tokio::sync::Barrier;

    use super::*;
    use crate::jsonrpc::{
        codec::{encode, Params},
        registry::ProcedureError,
    };

    fn registry() -> Registry {
        Registry::builder()
            .register_fn("auth.login", |_params| async {
                Ok::<_, ProcedureError>(json!({"token": "T"}))
            })
            .register_fn("fail", |_params| async {
                Err::<Value, _>(ProcedureError::new("handler exploded"))
            })
            .register_fn("echo", |params: Params| async move {
                Ok::<_, ProcedureError>(params.as_value().cloned().unwrap_or(Value::Null))
            })
            .register_fn("sleep", |params: Params| async move {
                let millis: u64 = params.decode().map_err(|_| ProcedureError::bad_params())?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok::<_, ProcedureError>(json!(millis))
            })
            .build()
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(registry())
    }

    async fn dispatch_json(dispatcher: &Dispatcher, body: &str) -> Value {
        let reply = dispatcher.dispatch(body.as_bytes()).await;
        let bytes = encode(&reply).expect("encode").expect("body present");
        serde_json::from_slice(&bytes).expect("valid json")
    }

    #[tokio::test]
    async fn registered_method_returns_result() {
        let body = r#"{"jsonrpc":"2.0","method":"auth.login","params":{"email":"a@b.com","password":"x"},"id":"1"}"#;
        let reply = dispatcher().dispatch(body.as_bytes()).await;
        let bytes = encode(&reply).expect("encode").expect("body present");

        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"jsonrpc":"2.0","result":{"token":"T"},"id":"1"}"#
        );
    }

    #[tokio::test]
    async fn unknown_method_is_not_supported() {
        let body = r#"{"jsonrpc":"2.0","method":"unknown.op","params":null,"id":"2"}"#;
        let reply = dispatcher().dispatch(body.as_bytes()).await;
        let bytes = encode(&reply).expect("encode").expect("body present");

        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method unknown.op is not supported"},"id":"2"}"#
        );
    }

    #[tokio::test]
    async fn handler_failure_is_server_error_with_message() {
        let response =
            dispatch_json(&dispatcher(), r#"{"jsonrpc":"2.0","method":"fail","id":"3"}"#).await;

        assert_eq!(response["error"]["code"], -32000);
        assert_eq!(response["error"]["message"], "handler exploded");
        assert_eq!(response["id"], "3");
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn bad_params_are_reported_by_handler() {
        let response = dispatch_json(
            &dispatcher(),
            r#"{"jsonrpc":"2.0","method":"sleep","params":"soon","id":"4"}"#,
        )
        .await;

        assert_eq!(response["error"]["code"], -32000);
        assert_eq!(response["error"]["message"], "bad params");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error_without_id() {
        let response = dispatch_json(&dispatcher(), "{not json").await;

        assert_eq!(response["error"]["code"], -32700);
        assert!(response["id"].is_null());
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn invalid_request_echoes_id() {
        let response =
            dispatch_json(&dispatcher(), r#"{"jsonrpc":"2.0","id":"5","params":{}}"#).await;

        assert_eq!(response["error"]["code"], -32600);
        assert_eq!(response["id"], "5");
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_array() {
        let reply = dispatcher().dispatch(b"[]").await;

        assert_eq!(reply, Reply::Batch(vec![]));
        assert_eq!(encode(&reply).expect("encode"), Some(b"[]".to_vec()));
    }

    #[tokio::test]
    async fn batch_correlates_successes_and_failures() {
        let body = r#"[
            {"jsonrpc":"2.0","method":"auth.login","params":{"email":"a@b.com","password":"x"},"id":"1"},
            {"jsonrpc":"2.0","method":"auth.logout","params":null,"id":"2"},
            {"jsonrpc":"2.0","method":"fail","id":"3"},
            {"jsonrpc":"2.0","method":"echo","params":[1,2],"id":"4"}
        ]"#;
        let response = dispatch_json(&dispatcher(), body).await;
        let responses = response.as_array().expect("batch response");

        assert_eq!(responses.len(), 4);
        assert_eq!(
            responses.iter().filter(|item| item.get("error").is_some()).count(),
            2
        );
        assert_eq!(responses[0]["id"], "1");
        assert_eq!(responses[0]["result"]["token"], "T");
        assert_eq!(responses[1]["id"], "2");
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(responses[2]["id"], "3");
        assert_eq!(responses[2]["error"]["code"], -32000);
        assert_eq!(responses[3]["result"], json!([1, 2]));
    }

    #[tokio::test]
    async fn batch_preserves_input_order_regardless_of_completion() {
        let body = r#"[
            {"jsonrpc":"2.0","method":"sleep","params":60,"id":"slow"},
            {"jsonrpc":"2.0","method":"sleep","params":0,"id":"fast"}
        ]"#;
        let response = dispatch_json(&dispatcher(), body).await;

        assert_eq!(response[0]["id"], "slow");
        assert_eq!(response[1]["id"], "fast");
    }

    #[tokio::test]
    async fn batch_members_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let registry = Registry::builder()
            .register_fn("meet", move |_params| {
                let barrier = barrier.clone();
                async move {
                    barrier.wait().await;
                    Ok::<_, ProcedureError>(json!("met"))
                }
            })
            .build();
        let dispatcher = Dispatcher::new(registry);
        let body = br#"[{"jsonrpc":"2.0","method":"meet","id":"a"},{"jsonrpc":"2.0","method":"meet","id":"b"}]"#;

        let reply = tokio::time::timeout(Duration::from_secs(5), dispatcher.dispatch(body))
            .await
            .expect("both calls must be in flight at once");

        let Reply::Batch(responses) = reply else {
            panic!("expected batch reply");
        };
        assert!(responses.iter().all(|response| !response.is_error()));
    }

    #[tokio::test]
    async fn panicking_handler_does_not_fail_siblings() {
        async fn explode(_params: Params) -> Result<Value, ProcedureError> {
            panic!("procedure panicked")
        }

        let registry = Registry::builder()
            .register_fn("boom", explode)
            .register_fn("ok", |_params| async { Ok::<_, ProcedureError>(json!(true)) })
            .build();
        let body = r#"[{"jsonrpc":"2.0","method":"boom","id":"1"},{"jsonrpc":"2.0","method":"ok","id":"2"}]"#;

        let response = dispatch_json(&Dispatcher::new(registry), body).await;

        assert_eq!(response[0]["id"], "1");
        assert_eq!(response[0]["error"]["code"], -32603);
        assert_eq!(response[1]["result"], true);
    }

    #[tokio::test]
    async fn panicking_single_call_becomes_internal_error() {
        async fn explode(_params: Params) -> Result<Value, ProcedureError> {
            panic!("procedure panicked")
        }

        let dispatcher = Dispatcher::new(Registry::builder().register_fn("boom", explode).build());

        let response =
            dispatch_json(&dispatcher, r#"{"jsonrpc":"2.0","method":"boom","id":"9"}"#).await;

        assert_eq!(response["id"], "9");
        assert_eq!(response["error"]["code"], -32603);
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn suppressed_panicking_notification_is_still_recorded() {
        async fn explode(_params: Params) -> Result<Value, ProcedureError> {
            panic!("procedure panicked")
        }

        let sink = Arc::new(RecordingSink::default());
        let registry = Registry::builder()
            .register_fn("boom", explode)
            .register_fn("ok", |_params| async { Ok::<_, ProcedureError>(json!(true)) })
            .build();
        let dispatcher = Dispatcher::new(registry)
            .with_sink(sink.clone())
            .with_notification_policy(NotificationPolicy::Suppress);
        let body = br#"[{"jsonrpc":"2.0","method":"boom"},{"jsonrpc":"2.0","method":"ok","id":"2"}]"#;

        let Reply::Batch(responses) = dispatcher.dispatch(body).await else {
            panic!("expected batch reply");
        };

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id(), Some(&RequestId::from("2")));
        let events = sink.events.lock().expect("sink lock").clone();
        assert!(events.contains(&"aborted:None".to_string()));
    }

    #[tokio::test]
    async fn notifications_are_answered_by_default() {
        let response =
            dispatch_json(&dispatcher(), r#"{"jsonrpc":"2.0","method":"auth.login"}"#).await;

        assert_eq!(response["result"]["token"], "T");
        assert!(response["id"].is_null());
    }

    #[tokio::test]
    async fn suppressed_notification_has_no_reply() {
        let dispatcher = dispatcher().with_notification_policy(NotificationPolicy::Suppress);

        let reply = dispatcher
            .dispatch(br#"{"jsonrpc":"2.0","method":"auth.login"}"#)
            .await;

        assert_eq!(reply, Reply::Empty);
    }

    #[tokio::test]
    async fn suppressed_batch_keeps_calls_with_ids_and_invalid_requests() {
        let dispatcher = dispatcher().with_notification_policy(NotificationPolicy::Suppress);
        let body = r#"[
            {"jsonrpc":"2.0","method":"auth.login"},
            {"jsonrpc":"2.0","method":"auth.login","id":100},
            {"jsonrpc":"1.0","method":"auth.login"}
        ]"#;

        let response = dispatch_json(&dispatcher, body).await;
        let responses = response.as_array().expect("batch response");

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 100);
        assert_eq!(responses[1]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn suppressed_all_notification_batch_is_empty() {
        let dispatcher = dispatcher().with_notification_policy(NotificationPolicy::Suppress);
        let body = br#"[{"jsonrpc":"2.0","method":"echo"},{"jsonrpc":"2.0","method":"auth.login"}]"#;

        assert_eq!(dispatcher.dispatch(body).await, Reply::Empty);
    }

    #[test]
    fn unreadable_body_is_invalid_request() {
        let Reply::Single(response) = dispatcher().reject_unreadable("stream closed") else {
            panic!("expected single reply");
        };

        let error = response.error().expect("error response");
        assert_eq!(error.code, -32600);
        assert_eq!(error.message, "Unable to read request body: stream closed");
        assert!(response.id().is_none());
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl TraceSink for RecordingSink {
        fn record(&self, event: &DispatchEvent<'_>) {
            let line = match event {
                DispatchEvent::DecodeFailed { .. } => "decode_failed".to_string(),
                DispatchEvent::BatchReceived { size } => format!("batch:{size}"),
                DispatchEvent::InvalidCall { .. } => "invalid".to_string(),
                DispatchEvent::CallAborted { id, .. } => format!("aborted:{id:?}"),
                DispatchEvent::CallStarted { method, .. } => format!("start:{method}"),
                DispatchEvent::CallFinished {
                    method, error_code, ..
                } => format!("finish:{method}:{error_code:?}"),
            };
            self.events.lock().expect("sink lock").push(line);
        }
    }

    #[tokio::test]
    async fn injected_sink_sees_call_lifecycle() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher().with_sink(sink.clone());

        dispatcher
            .dispatch(br#"{"jsonrpc":"2.0","method":"unknown.op","id":"1"}"#)
            .await;
        dispatcher.dispatch(b"{not json").await;

        let events = sink.events.lock().expect("sink lock").clone();
        assert_eq!(
            events,
            vec![
                "start:unknown.op".to_string(),
                "finish:unknown.op:Some(-32601)".to_string(),
                "decode_failed".to_string(),
            ]
        );
    }

    #[test]
    fn notification_policy_parses_names() {
        assert_eq!(
            NotificationPolicy::parse("Suppress"),
            Some(NotificationPolicy::Suppress)
        );
        assert_eq!(
            NotificationPolicy::parse("respond"),
            Some(NotificationPolicy::Respond)
        );
        assert_eq!(NotificationPolicy::parse("drop"), None);
    }
}
