//! Shared test helpers: a scripted transport standing in for the store.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Mutex;

use bytes::Bytes;
use click_link::{ClickLinkError, Result, Transport};

/// One scripted response.
pub enum Scripted {
    Body(String),
    ServerError(u16, String),
}

/// A recorded call.
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub payload: Option<Vec<u8>>,
}

/// Transport that answers from a script instead of a live store.
///
/// Rules pair a command prefix with a response and are consumed in order:
/// the first unconsumed rule whose prefix matches the incoming command
/// answers it. Commands with no matching rule get an empty success body
/// (the store's usual acknowledgement for DDL and inserts).
#[derive(Default)]
pub struct MockTransport {
    rules: Mutex<Vec<(String, Scripted)>>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_body(&self, prefix: &str, body: impl Into<String>) {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.to_string(), Scripted::Body(body.into())));
    }

    pub fn on_error(&self, prefix: &str, status: u16, message: &str) {
        self.rules.lock().unwrap().push((
            prefix.to_string(),
            Scripted::ServerError(status, message.to_string()),
        ));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }
}

impl Transport for MockTransport {
    fn execute(
        &self,
        command: String,
        payload: Option<Vec<u8>>,
    ) -> impl Future<Output = Result<Bytes>> + Send {
        let response = {
            let mut rules = self.rules.lock().unwrap();
            let matched = rules.iter().position(|(prefix, _)| command.starts_with(prefix));
            let scripted = matched.map(|i| rules.remove(i).1);
            self.calls.lock().unwrap().push(Call { command, payload });
            scripted
        };
        async move {
            match response {
                Some(Scripted::Body(body)) => Ok(Bytes::from(body)),
                Some(Scripted::ServerError(status_code, message)) => Err(ClickLinkError::Server {
                    status_code,
                    message,
                }),
                None => Ok(Bytes::new()),
            }
        }
    }
}

/// Wire body of a `system.columns` lookup for the given columns.
pub fn schema_body(columns: &[(&str, &str)]) -> String {
    let mut body = String::from("name\ttype\nString\tString\n");
    for (name, column_type) in columns {
        body.push_str(&format!("{name}\t{column_type}\n"));
    }
    body
}
