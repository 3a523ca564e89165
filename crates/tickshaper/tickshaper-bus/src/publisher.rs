use crate::queue::PublishQueue;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tickshaper_events::Tick;
use tracing::{debug, info, warn};
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{Error as WsError, Message, WebSocket};

/// Ticks pulled off the queue per wake.
const DRAIN_BATCH: usize = 1_000;

/// Send high-water mark: the per-subscriber write buffer holds at most this
/// many frames' worth of bytes before further frames are shed.
const SEND_HWM_FRAMES: usize = 10_000;

/// Generous upper bound on one serialized tick frame.
const FRAME_BYTES_ESTIMATE: usize = 160;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("unusable bus endpoint '{endpoint}'")]
    BadEndpoint { endpoint: String },

    #[error("failed to bind bus endpoint '{endpoint}'")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

struct Subscriber {
    ws: WebSocket<TcpStream>,
    peer: SocketAddr,
}

/// Publishes ticks to every connected subscriber (empty topic filter: a
/// subscriber receives the whole stream).
///
/// One thread accepts subscribers, another drains the queue and broadcasts.
/// Sends are non-blocking; a subscriber whose socket cannot take more data
/// loses frames (counted as transient errors) instead of stalling the drain
/// loop. Delivery is best-effort by design.
pub struct BusPublisher {
    queue: Arc<PublishQueue>,
    running: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    transient_errors: Arc<AtomicU64>,
    local_addr: SocketAddr,
    accept_thread: Option<JoinHandle<()>>,
    drain_thread: Option<JoinHandle<()>>,
}

impl BusPublisher {
    /// Binds the endpoint and starts the accept and drain threads. A bind
    /// failure is fatal to startup.
    pub fn bind(endpoint: &str, queue: Arc<PublishQueue>) -> Result<Self, BusError> {
        let addr = parse_endpoint(endpoint).ok_or_else(|| BusError::BadEndpoint {
            endpoint: endpoint.to_string(),
        })?;
        let listener = TcpListener::bind(&addr).map_err(|source| BusError::Bind {
            endpoint: endpoint.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| BusError::Bind {
            endpoint: endpoint.to_string(),
            source,
        })?;
        // Polling accept loop; lets the thread observe shutdown.
        listener
            .set_nonblocking(true)
            .map_err(|source| BusError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;

        info!(%local_addr, "bus publisher listening");

        let running = Arc::new(AtomicBool::new(true));
        let subscribers = Arc::new(Mutex::new(Vec::new()));
        let transient_errors = Arc::new(AtomicU64::new(0));

        let accept_thread = {
            let running = running.clone();
            let subscribers = subscribers.clone();
            std::thread::spawn(move || accept_loop(listener, running, subscribers))
        };
        let drain_thread = {
            let queue = queue.clone();
            let subscribers = subscribers.clone();
            let transient_errors = transient_errors.clone();
            std::thread::spawn(move || drain_loop(queue, subscribers, transient_errors))
        };

        Ok(Self {
            queue,
            running,
            subscribers,
            transient_errors,
            local_addr,
            accept_thread: Some(accept_thread),
            drain_thread: Some(drain_thread),
        })
    }

    /// Hands one tick to the publish queue.
    pub fn publish(&self, tick: Tick) {
        self.queue.push(tick);
    }

    /// Address actually bound (useful when the endpoint asked for port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Frames shed or deferred because a subscriber's socket was saturated.
    pub fn transient_error_count(&self) -> u64 {
        self.transient_errors.load(Ordering::Relaxed)
    }

    /// Stops accepting, lets the drain thread flush the backlog, and joins
    /// both threads.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.queue.close();
        if let Some(handle) = self.drain_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        info!(
            published = self.queue.published_count(),
            transient_errors = self.transient_errors.load(Ordering::Relaxed),
            "bus publisher stopped"
        );
    }
}

impl Drop for BusPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Maps `tcp://*:5555`-style endpoints onto a bindable socket address.
fn parse_endpoint(endpoint: &str) -> Option<String> {
    let rest = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
    let (host, port) = rest.rsplit_once(':')?;
    port.parse::<u16>().ok()?;
    let host = if host == "*" { "0.0.0.0" } else { host };
    Some(format!("{host}:{port}"))
}

fn accept_loop(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
) {
    let config = WebSocketConfig {
        // Flush every frame; cap the backlog a slow subscriber can pin.
        write_buffer_size: 0,
        max_write_buffer_size: SEND_HWM_FRAMES * FRAME_BYTES_ESTIMATE,
        ..Default::default()
    };

    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                // Handshake on a blocking socket, then switch to
                // non-blocking for the broadcast path.
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                match tungstenite::accept_with_config(stream, Some(config)) {
                    Ok(ws) => {
                        if ws.get_ref().set_nonblocking(true).is_err() {
                            warn!(%peer, "could not unblock subscriber socket");
                            continue;
                        }
                        info!(%peer, "subscriber connected");
                        subscribers.lock().unwrap().push(Subscriber { ws, peer });
                    }
                    Err(error) => debug!(%peer, %error, "subscriber handshake failed"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(error) => {
                warn!(%error, "accept failed");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

fn drain_loop(
    queue: Arc<PublishQueue>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    transient_errors: Arc<AtomicU64>,
) {
    let mut batch: Vec<Tick> = Vec::with_capacity(DRAIN_BATCH);

    // `drain_into` blocks on the condvar; after close() it keeps returning
    // batches until the backlog is flushed, then reports done.
    while queue.drain_into(&mut batch, DRAIN_BATCH) {
        let mut subs = subscribers.lock().unwrap();
        for tick in &batch {
            let frame = match serde_json::to_string(tick) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(%error, "tick serialization failed");
                    continue;
                }
            };
            subs.retain_mut(|sub| match sub.ws.send(Message::Text(frame.clone())) {
                Ok(()) => true,
                // Socket saturated: the frame stays buffered (or is shed at
                // the high-water mark). Count it, keep the subscriber.
                Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    transient_errors.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(WsError::WriteBufferFull(_)) => {
                    transient_errors.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(error) => {
                    warn!(peer = %sub.peer, %error, "dropping subscriber");
                    false
                }
            });
        }
        queue.mark_published(batch.len() as u64);
        batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_forms() {
        assert_eq!(parse_endpoint("tcp://*:5555").as_deref(), Some("0.0.0.0:5555"));
        assert_eq!(
            parse_endpoint("tcp://127.0.0.1:9000").as_deref(),
            Some("127.0.0.1:9000")
        );
        assert_eq!(parse_endpoint("0.0.0.0:0").as_deref(), Some("0.0.0.0:0"));
        assert_eq!(parse_endpoint("tcp://*"), None);
        assert_eq!(parse_endpoint("tcp://host:notaport"), None);
    }

    #[test]
    fn bind_failure_is_fatal() {
        let queue = Arc::new(PublishQueue::new());
        // TEST-NET-3 address is never assigned to a local interface.
        match BusPublisher::bind("tcp://203.0.113.1:9", queue) {
            Err(BusError::Bind { endpoint, .. }) => {
                assert_eq!(endpoint, "tcp://203.0.113.1:9");
            }
            Ok(_) => panic!("bind to a non-local address unexpectedly succeeded"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
