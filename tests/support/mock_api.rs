use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    sync::{Arc, RwLock},
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const API_VERSION: &str = "v0";

/// In-memory item API state shared with the HTTP handler.
#[derive(Clone, Default)]
pub struct MockItems {
    inner: Arc<RwLock<MockItemsInner>>,
}

#[derive(Default)]
struct MockItemsInner {
    max_item: i64,
    items: HashMap<i64, String>,
    absent: HashSet<i64>,
    failures: HashMap<i64, usize>,
    item_requests: HashMap<i64, usize>,
}

impl MockItems {
    pub fn new(max_item: i64) -> Self {
        let items = Self::default();
        items.set_max_item(max_item);
        items
    }

    pub fn set_max_item(&self, max_item: i64) {
        self.write().max_item = max_item;
    }

    /// Publishes item `id` created at `time` (epoch seconds).
    pub fn insert(&self, id: i64, time: i64) {
        let body = json!({
            "by": "tester",
            "id": id,
            "time": time,
            "type": "story",
            "score": 1,
            "title": format!("item {id}"),
        })
        .to_string();
        let mut inner = self.write();
        inner.absent.remove(&id);
        inner.items.insert(id, body);
    }

    /// Makes item `id` answer `200 null` until it is inserted.
    pub fn mark_absent(&self, id: i64) {
        self.write().absent.insert(id);
    }

    /// Makes the next `count` requests for item `id` answer 500.
    pub fn fail_next(&self, id: i64, count: usize) {
        self.write().failures.insert(id, count);
    }

    pub fn item_requests(&self, id: i64) -> usize {
        self.inner
            .read()
            .expect("mock items poisoned")
            .item_requests
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockItemsInner> {
        self.inner.write().expect("mock items poisoned")
    }

    fn respond(&self, path: &str) -> (StatusCode, String) {
        let Some(resource) = path
            .strip_prefix(&format!("/{API_VERSION}/"))
            .and_then(|rest| rest.strip_suffix(".json"))
        else {
            return (StatusCode::NOT_FOUND, "unknown path".to_owned());
        };

        let mut inner = self.write();
        if resource == "maxitem" {
            return (StatusCode::OK, inner.max_item.to_string());
        }

        let Some(id) = resource
            .strip_prefix("item/")
            .and_then(|id| id.parse::<i64>().ok())
        else {
            return (StatusCode::NOT_FOUND, "unknown resource".to_owned());
        };

        *inner.item_requests.entry(id).or_insert(0) += 1;
        if let Some(remaining) = inner.failures.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_owned());
            }
        }
        if inner.absent.contains(&id) {
            return (StatusCode::OK, "null".to_owned());
        }
        match inner.items.get(&id) {
            Some(body) => (StatusCode::OK, body.clone()),
            None => (StatusCode::OK, "null".to_owned()),
        }
    }
}

pub struct MockApiServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockApiServer {
    pub async fn start(items: MockItems) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock API listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let items = items.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| serve_request(items.clone(), req))) }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock API server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(items: MockItems, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let (status, body) = items.respond(req.uri().path());
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    Ok(response)
}
