// remote.rs
use crate::error::TransportError;
use crate::todo::Task;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One item of the read-only `/todos` listing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTodo {
    pub id: i64,
    pub title: String,
    pub completed: bool,
    pub user_id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

impl RemoteTodo {
    /// Online todos carry no schedule.
    pub fn into_task(self) -> Task {
        Task {
            id: Some(self.id),
            title: self.title,
            description: self.description,
            completed: self.completed,
            date: None,
            time: None,
            recurrence: None,
            is_remote: true,
        }
    }
}

/// A round trip that came back with a 2xx status. `items` is `None` when the
/// body was empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchSuccess {
    pub status: u16,
    pub items: Option<Vec<RemoteTodo>>,
}

pub trait RemoteTaskSource: Send + Sync {
    /// Exactly one network round trip.
    fn fetch(&self) -> Result<FetchSuccess, TransportError>;
}

pub struct HttpRemoteSource {
    base_url: String,
    client: Client,
}

impl HttpRemoteSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn todos_url(&self) -> String {
        format!("{}/todos", self.base_url)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::NoConnectivity
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Turns a status and body into the fetch result. Split out from the HTTP
/// call so the body rules can be exercised without a server.
pub fn interpret_response(status: u16, body: &str) -> Result<FetchSuccess, TransportError> {
    if !(200..300).contains(&status) {
        return Err(TransportError::Server(status));
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(FetchSuccess {
            status,
            items: None,
        });
    }
    let items: Vec<RemoteTodo> = serde_json::from_str(trimmed)
        .map_err(|e| TransportError::Other(format!("parse todos failed: {}", e)))?;
    Ok(FetchSuccess {
        status,
        items: Some(items),
    })
}

impl RemoteTaskSource for HttpRemoteSource {
    fn fetch(&self) -> Result<FetchSuccess, TransportError> {
        let url = self.todos_url();
        debug!(%url, "GET");
        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(classify)?;
        let status = resp.status().as_u16();
        let text = resp.text().map_err(classify)?;
        debug!(status, bytes = text.len(), "response");
        interpret_response(status, &text)
    }
}
