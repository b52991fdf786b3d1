use std::path::Path;

use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tower::ServiceExt;

use crate::container::{ContainerID, ContainerSnapshot, ContainerSummary};
use crate::uds::UnixConnector;

use super::event::{LineBuffer, decode_line};
use super::models::{WireContainer, WireErrorMessage, WireInfo, WireSummary};
use super::{Error, Event, Result, RuntimeClient, RuntimeInfo};

/// Number of decoded events buffered between the socket reader and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// `filters={"type":["container"]}`, url encoded.
const EVENTS_PATH: &str = "/events?filters=%7B%22type%22%3A%5B%22container%22%5D%7D";

/// Docker Engine API client talking HTTP/1.1 over the daemon's unix socket.
///
/// Every request opens a fresh connection, so concurrent callers never queue behind a
/// long running request such as the event subscription.
#[derive(Debug, Clone)]
pub struct DockerClient {
    connector: UnixConnector,
    api_version: Option<String>,
}

impl DockerClient {
    /// Creates a client for the daemon listening on `socket_path`.
    ///
    /// With an `api_version` such as `1.43` every request is prefixed with `/v1.43`,
    /// otherwise the daemon picks its default API version.
    pub fn new(socket_path: impl AsRef<Path>, api_version: Option<String>) -> Self {
        Self {
            connector: UnixConnector::new(socket_path),
            api_version,
        }
    }

    fn versioned(&self, path: &str) -> String {
        match &self.api_version {
            Some(version) => format!("/v{version}{path}"),
            None => path.to_owned(),
        }
    }

    async fn send(&self, path: &str) -> Result<Response<Incoming>> {
        let io = self
            .connector
            .clone()
            .oneshot(hyper::Uri::from_static("http://docker"))
            .await
            .map_err(|source| Error::SocketConnect {
                path: self.connector.path().to_path_buf(),
                source,
            })?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(Error::Handshake)?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                log::debug!("docker connection closed with error: {}", err);
            }
        });

        let request = Request::get(self.versioned(path))
            .header(hyper::header::HOST, "docker")
            .body(Empty::<Bytes>::new())
            .map_err(|source| Error::InvalidRequest {
                path: path.to_owned(),
                source,
            })?;
        log::trace!("GET {}", path);
        sender
            .send_request(request)
            .await
            .map_err(|source| Error::Request {
                path: path.to_owned(),
                source,
            })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path).await?;
        let status = response.status();
        let body = read_body(path, response.into_body()).await?;
        if !status.is_success() {
            return Err(status_error(path, status, &body));
        }

        serde_json::from_slice(&body).map_err(|source| Error::Decode {
            path: path.to_owned(),
            source,
        })
    }
}

async fn read_body(path: &str, body: Incoming) -> Result<Bytes> {
    Ok(body
        .collect()
        .await
        .map_err(|source| Error::Body {
            path: path.to_owned(),
            source,
        })?
        .to_bytes())
}

fn status_error(path: &str, status: StatusCode, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<WireErrorMessage>(body)
        .map(|msg| msg.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_owned());
    Error::Status {
        path: path.to_owned(),
        status,
        message,
    }
}

impl RuntimeClient for DockerClient {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let containers: Vec<WireSummary> = self.get_json("/containers/json?all=1").await?;
        log::debug!("Found {} containers", containers.len());
        Ok(containers
            .into_iter()
            .filter_map(|wire| match ContainerSummary::try_from(wire) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    log::warn!("skipping container from listing: {}", err);
                    None
                }
            })
            .collect())
    }

    async fn fetch_container(&self, id: &ContainerID) -> Result<ContainerSnapshot> {
        let path = format!("/containers/{}/json", id);
        match self.get_json::<WireContainer>(&path).await {
            Ok(wire) => Ok(ContainerSnapshot::try_from(wire)?),
            Err(Error::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(Error::NotFound {
                    id: id.as_str().to_owned(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn stream_events(&self) -> Result<mpsc::Receiver<Event>> {
        let response = self.send(EVENTS_PATH).await?;
        let status = response.status();
        if !status.is_success() {
            let body = read_body(EVENTS_PATH, response.into_body()).await?;
            return Err(status_error(EVENTS_PATH, status, &body));
        }
        log::debug!("Subscribed to docker events");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(forward_events(response.into_body(), tx));
        Ok(rx)
    }

    async fn info(&self) -> Result<RuntimeInfo> {
        let info: WireInfo = self.get_json("/info").await?;
        Ok(info.into())
    }
}

async fn forward_events(mut body: Incoming, tx: mpsc::Sender<Event>) {
    let mut lines = LineBuffer::default();
    loop {
        let frame = match body.frame().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                log::error!("failed to read docker event stream: {}", err);
                break;
            }
            None => break,
        };
        let Ok(chunk) = frame.into_data() else {
            continue;
        };
        for line in lines.push(&chunk) {
            if !forward_line(&line, &tx).await {
                log::debug!("event receiver dropped, closing docker event stream");
                return;
            }
        }
    }
    if let Some(rest) = lines.finish() {
        forward_line(&rest, &tx).await;
    }
    log::warn!("docker event stream ended");
}

/// Decodes and forwards a line. Returns `false` once the receiver is gone.
async fn forward_line(line: &[u8], tx: &mpsc::Sender<Event>) -> bool {
    match decode_line(line) {
        Ok(Some(event)) => {
            log::trace!("Event: status={}, id={}", event.status, event.container_id);
            tx.send(event).await.is_ok()
        }
        Ok(None) => true,
        Err(err) => {
            log::warn!("skipping docker event: {}", err);
            true
        }
    }
}
