use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use super::dedup::SeenLocations;
use super::error::PairingError;
use super::prober::Prober;
use super::ssdp;
use crate::config::DiscoveryConfig;

enum PairingState {
    Idle,
    Pairing {
        cancel: oneshot::Sender<()>,
        listener: JoinHandle<()>,
    },
}

/// Pairing lifecycle: `Idle -> Pairing -> Idle`.
///
/// While pairing, NOTIFY locations seen for the first time in this session
/// are probed, each in its own task. Stopping the session (timeout or
/// cancel) closes the socket but leaves probes already under way alone.
pub struct PairingSession {
    discovery: DiscoveryConfig,
    prober: Arc<Prober>,
    state: Mutex<PairingState>,
}

impl PairingSession {
    pub fn new(discovery: DiscoveryConfig, prober: Arc<Prober>) -> Self {
        Self {
            discovery,
            prober,
            state: Mutex::new(PairingState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PairingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pairing(&self) -> bool {
        match &*self.lock() {
            PairingState::Idle => false,
            PairingState::Pairing { listener, .. } => !listener.is_finished(),
        }
    }

    /// Bind the SSDP group from the configuration and start pairing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, timeout: Duration) -> Result<(), PairingError> {
        if self.is_pairing() {
            return Err(PairingError::AlreadyPairing);
        }

        let socket = ssdp::bind_multicast(
            self.discovery.multicast_group,
            self.discovery.port,
            self.discovery.interface,
        )
        .map_err(|source| PairingError::Bind {
            port: self.discovery.port,
            source,
        })?;

        self.start_with_socket(socket, timeout)
    }

    /// Start pairing on an already bound socket.
    ///
    /// The listener runs for half of `timeout`, leaving the second half for
    /// probes started late in the window to finish.
    pub fn start_with_socket(&self, socket: UdpSocket, timeout: Duration) -> Result<(), PairingError> {
        let mut state = self.lock();
        if let PairingState::Pairing { listener, .. } = &*state {
            if !listener.is_finished() {
                return Err(PairingError::AlreadyPairing);
            }
        }

        let listen_for = timeout / 2;
        info!(
            "pairing started, listening for SSDP NOTIFY messages (timeout {:?}, listening {:?})",
            timeout, listen_for
        );

        let (cancel, cancel_rx) = oneshot::channel();
        let prober = Arc::clone(&self.prober);
        let listener = tokio::spawn(async move {
            let mut seen = SeenLocations::new();
            ssdp::listen(socket, listen_for, cancel_rx, |datagram, notify| {
                for location in notify.locations() {
                    if seen.seen(location) {
                        continue;
                    }
                    info!("SSDP NOTIFY from {}, LOCATION={}", datagram.from, location);
                    let prober = Arc::clone(&prober);
                    let location = location.to_string();
                    tokio::spawn(async move {
                        prober.probe(&location).await;
                    });
                }
            })
            .await;
            info!("pairing window closed, {} location(s) seen", seen.len());
        });

        *state = PairingState::Pairing { cancel, listener };
        Ok(())
    }

    /// Stop listening. Idempotent.
    pub fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.lock(), PairingState::Idle);
        if let PairingState::Pairing { cancel, .. } = previous {
            info!("Cancelling pairing mode");
            // The listener may already have closed on its own.
            let _ = cancel.send(());
        }
    }
}
