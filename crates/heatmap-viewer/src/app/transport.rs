//! HTTP transport for the controller
//!
//! Requests are fired on the async runtime (tokio on native, the browser's event loop on
//! web) and their bodies come back through a channel drained once per frame, so responses
//! are handled in arrival order on the UI thread.

use heatmap_sync::{OutgoingRequest, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server answered with status {0}")]
    Status(u16),

    #[error("No async runtime available to send requests")]
    NoRuntime,
}

/// A finished request: the request itself plus its body or failure
#[derive(Debug)]
pub struct Completion {
    pub request: OutgoingRequest,
    pub result: Result<String, TransportError>,
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: Arc<AtomicUsize>,
    /// Woken when a response arrives so it is handled without waiting for input
    repaint: Option<egui::Context>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, repaint: Option<egui::Context>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            tx,
            rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
            repaint,
        }
    }

    /// Requests sent but not answered yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Completions received since the last call, oldest first
    pub fn drain(&mut self) -> Vec<Completion> {
        let mut completions = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            completions.push(completion);
        }
        completions
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, request: OutgoingRequest) {
        let url = request.url(&self.base_url);
        tracing::debug!("Sending {} request: {}", request.kind(), url);

        #[cfg(not(target_arch = "wasm32"))]
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("Cannot send request to {}: no tokio runtime", url);
            let _ = self.tx.send(Completion {
                request,
                result: Err(TransportError::NoRuntime),
            });
            return;
        };

        let client = self.client.clone();
        let tx = self.tx.clone();
        let in_flight = self.in_flight.clone();
        let repaint = self.repaint.clone();
        in_flight.fetch_add(1, Ordering::Relaxed);

        let task = async move {
            let result = fetch(&client, &url).await;
            in_flight.fetch_sub(1, Ordering::Relaxed);
            // The receiver only goes away when the app shuts down
            let _ = tx.send(Completion { request, result });
            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        runtime.spawn(task);

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(task);
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<String, TransportError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }
    Ok(response.text().await?)
}
