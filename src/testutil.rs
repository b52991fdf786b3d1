//! In-memory runtime and introspection server used by the unit tests.
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http_body_util::{BodyExt, Empty};
use hyper::StatusCode;
use hyper::body::Bytes;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tokio_util::sync::CancellationToken;

use crate::container::{ContainerID, ContainerSnapshot, ContainerSummary};
use crate::introspection::{self, IntrospectionServer, ServerContext};
use crate::runtime::{self, Event, EventStatus, RuntimeClient, RuntimeInfo};
use crate::uds::UnixConnector;

pub fn id(raw: &str) -> ContainerID {
    ContainerID::new(raw).unwrap()
}

pub fn snapshot(raw: &str, running: bool) -> ContainerSnapshot {
    ContainerSnapshot {
        id: id(raw),
        name: format!("{raw}-name"),
        image: "busybox".to_owned(),
        created: "2024-05-01T10:00:00Z".to_owned(),
        running,
        pid: if running { 100 } else { 0 },
        labels: HashMap::default(),
    }
}

pub fn event(status: &str, raw: &str) -> Event {
    Event::new(EventStatus::from(status), id(raw))
}

#[derive(Debug, Clone)]
enum FakeContainer {
    Present(ContainerSnapshot),
    Broken,
}

/// Runtime whose containers are set up by the test.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    containers: Mutex<BTreeMap<ContainerID, FakeContainer>>,
    events: Mutex<Option<mpsc::Receiver<Event>>>,
    fetch_delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl FakeRuntime {
    pub fn with_fetch_delay(delay: Duration) -> Self {
        Self {
            fetch_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set(&self, raw: &str, running: bool) {
        self.containers
            .lock()
            .unwrap()
            .insert(id(raw), FakeContainer::Present(snapshot(raw, running)));
    }

    /// Makes every fetch of `raw` fail with a server error.
    pub fn break_container(&self, raw: &str) {
        self.containers
            .lock()
            .unwrap()
            .insert(id(raw), FakeContainer::Broken);
    }

    /// Installs the receiving end handed out by the next `stream_events` call.
    pub fn event_feed(&self) -> mpsc::Sender<Event> {
        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(rx);
        tx
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RuntimeClient for FakeRuntime {
    async fn list_containers(&self) -> runtime::Result<Vec<ContainerSummary>> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .keys()
            .map(|id| ContainerSummary {
                id: id.clone(),
                names: Vec::default(),
                image: "busybox".to_owned(),
                state: "unknown".to_owned(),
            })
            .collect())
    }

    async fn fetch_container(&self, id: &ContainerID) -> runtime::Result<ContainerSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let container = self.containers.lock().unwrap().get(id).cloned();
        match container {
            Some(FakeContainer::Present(snapshot)) => Ok(snapshot),
            Some(FakeContainer::Broken) => Err(runtime::Error::Status {
                path: format!("/containers/{id}/json"),
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "broken".to_owned(),
            }),
            None => Err(runtime::Error::NotFound {
                id: id.as_str().to_owned(),
            }),
        }
    }

    async fn stream_events(&self) -> runtime::Result<mpsc::Receiver<Event>> {
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| runtime::Error::Status {
                path: "/events".to_owned(),
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "no event feed".to_owned(),
            })
    }

    async fn info(&self) -> runtime::Result<RuntimeInfo> {
        Ok(RuntimeInfo {
            driver: "overlay2".to_owned(),
            docker_root_dir: "/var/lib/docker".to_owned(),
            server_version: "27.0.3".to_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Started(ContainerID),
    Stopped(ContainerID),
}

/// Introspection server that reports its lifecycle and otherwise just waits for cancellation.
#[derive(Debug)]
pub struct RecordingServer {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl RecordingServer {
    pub fn new() -> (Self, ServerEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ServerEvents { rx })
    }
}

impl IntrospectionServer for RecordingServer {
    async fn serve(
        &self,
        ctx: ServerContext,
        cancel: CancellationToken,
    ) -> introspection::Result<()> {
        let id = ctx.snapshot.id.clone();
        let _ = self.tx.send(ServerEvent::Started(id.clone()));
        cancel.cancelled().await;
        let _ = self.tx.send(ServerEvent::Stopped(id));
        Ok(())
    }
}

pub struct ServerEvents {
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl ServerEvents {
    pub async fn next(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("server event channel closed")
    }

    /// Asserts that no further server starts or stops happen for a short while.
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), self.rx.recv()).await
        {
            panic!("unexpected server event: {event:?}");
        }
    }
}

pub async fn wait_for_socket(path: &Path) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("socket was never created");
}

/// Sends `GET uri` to the HTTP server on `socket` and decodes the JSON response.
pub async fn get_json(socket: &Path, uri: &str) -> serde_json::Value {
    let io = UnixConnector::new(socket)
        .oneshot(hyper::Uri::from_static("http://localhost"))
        .await
        .unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await.unwrap();
    tokio::spawn(conn);
    let request = hyper::Request::get(uri)
        .header(hyper::header::HOST, "localhost")
        .body(Empty::<Bytes>::new())
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    assert!(response.status().is_success());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Connects to `socket` and sends an unfinished request, keeping the connection busy
/// until the returned stream is dropped.
pub fn stalled_client(socket: &Path) -> UnixStream {
    let mut stream = UnixStream::connect(socket).unwrap();
    stream
        .write_all(b"GET /container HTTP/1.1\r\nHost: localhost\r\n")
        .unwrap();
    stream
}
