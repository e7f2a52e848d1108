//! Graceful shutdown.
//!
//! A [`ShutdownSignal`] stops the accept loop. A [`ConnectionTracker`] counts
//! connections still being served so the server can wait for them to drain.
//! Both are thin wrappers over `tokio::sync::watch` channels.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

/// Fires once; every clone observes it.
///
/// ```rust
/// use restbind_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let observer = shutdown.clone();
/// shutdown.trigger();
/// assert!(observer.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// A signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state: Arc::new(state) }
    }

    /// Fires the signal. Later calls do nothing.
    pub fn trigger(&self) {
        self.state.send_if_modified(|fired| !std::mem::replace(fired, true));
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.state.borrow()
    }

    /// Completes once the signal fires, immediately if it already has.
    pub async fn recv(&self) {
        let mut fired = self.state.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = fired.wait_for(|fired| *fired).await;
    }

    /// A signal that also fires on SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called inside a tokio runtime. If the OS handlers cannot be
    /// installed the failure is logged and only [`trigger`](Self::trigger)
    /// fires the signal.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let on_signal = signal.clone();
        tokio::spawn(async move {
            if wait_for_os_signal().await {
                on_signal.trigger();
            }
        });
        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "cannot install signal handlers");
            return false;
        }
    };
    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "shutdown requested");
    true
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> bool {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl+C");
        return false;
    }
    info!(signal = "ctrl-c", "shutdown requested");
    true
}

/// Counts connections being served.
///
/// ```rust
/// use restbind_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    open: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// A tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        let (open, _) = watch::channel(0);
        Self { open: Arc::new(open) }
    }

    /// Counts a connection until the returned token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.open.send_modify(|open| *open += 1);
        ConnectionToken {
            open: Arc::clone(&self.open),
        }
    }

    /// Connections currently counted.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        *self.open.borrow()
    }

    /// Completes when no connection is counted.
    pub async fn wait_for_shutdown(&self) {
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A counted connection.
#[derive(Debug)]
pub struct ConnectionToken {
    open: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.open.send_modify(|open| *open -= 1);
    }
}
