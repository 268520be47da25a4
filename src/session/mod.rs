// Copyright 2026 btlink contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bluetooth session: adapter facade, event fan-out and the SPP server.

pub mod adapter;
pub mod events;
mod server;

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::permission::{Permission, PermissionHost};
use crate::platform::bluez::BluezAdapter;
use crate::platform::{AcceptedConnection, HostAdapter, SppService};

pub use adapter::AdapterControl;
pub use events::SessionEvent;

use server::ServerHandle;

/// Queue depth for the session event fan-out. A subscriber this far behind
/// starts losing its oldest events.
const EVENT_CAPACITY: usize = 128;

/// One Bluetooth session over the host's default adapter.
///
/// The session owns the event pump and at most one SPP server. It is
/// shared by reference; all methods take `&self`.
pub struct Session {
    adapter: AdapterControl,
    config: Config,
    events_tx: broadcast::Sender<SessionEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
    server: tokio::sync::Mutex<Option<ServerHandle>>,
}

impl Session {
    /// Connect to the host Bluetooth stack and start the event pump.
    ///
    /// A host without a usable adapter still yields a session; its queries
    /// degrade and its mutating operations fail with [`Error::Unsupported`].
    pub async fn new(config: Config) -> Self {
        let host = BluezAdapter::probe()
            .await
            .map(|adapter| Arc::new(adapter) as Arc<dyn HostAdapter>);
        Self::with_host(host, config).await
    }

    /// Build a session over an explicit host adapter.
    pub async fn with_host(host: Option<Arc<dyn HostAdapter>>, config: Config) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let adapter = AdapterControl::new(host);

        let mut pump = None;
        if let Some(host) = adapter.host() {
            if let Some(name) = &config.device_name {
                if let Err(err) = host.set_alias(name).await {
                    warn!("Could not set adapter name: {}", err);
                }
            }
            match host.subscribe_events().await {
                Ok(host_rx) => pump = Some(events::spawn_pump(host_rx, events_tx.clone())),
                Err(err) => warn!("Host events unavailable: {}", err),
            }
        }

        Self {
            adapter,
            config,
            events_tx,
            pump: Mutex::new(pump),
            server: tokio::sync::Mutex::new(None),
        }
    }

    /// The adapter facade for power, discovery and device queries.
    pub fn adapter(&self) -> &AdapterControl {
        &self.adapter
    }

    /// Subscribe to session events. Every subscriber sees every event in
    /// publish order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Run the discovery request flow: ask the permission host, then
    /// restart scanning. A scan already underway is cancelled first so the
    /// new round starts fresh.
    pub async fn request_discovery(&self, permissions: &dyn PermissionHost) -> Result<()> {
        if !self.adapter.is_supported() {
            return Err(Error::Unsupported);
        }
        let decision = permissions.request(Permission::DeviceDiscovery).await;
        if !decision.granted {
            return Err(Error::PermissionDenied {
                permission: Permission::DeviceDiscovery,
                dialog_shown: decision.dialog_shown,
            });
        }
        self.adapter.cancel_discovery().await;
        if self.adapter.start_discovery().await {
            Ok(())
        } else {
            Err(Error::Io(io::Error::other("host rejected discovery")))
        }
    }

    /// Open the SPP server with the configured service name and channel.
    pub async fn open_spp_server(&self) -> Result<mpsc::Receiver<AcceptedConnection>> {
        let service = SppService::spp(
            self.config.server.service_name.clone(),
            self.config.server.channel,
        );
        self.open_server(service).await
    }

    /// Bind `service` and start accepting connections.
    ///
    /// One server per session: a second open without an intervening
    /// [`close_server`](Self::close_server) fails with
    /// [`Error::AlreadyListening`]. The returned receiver yields accepted
    /// connections in accept order and owns them outright.
    pub async fn open_server(
        &self,
        service: SppService,
    ) -> Result<mpsc::Receiver<AcceptedConnection>> {
        let host = self.adapter.host().ok_or(Error::Unsupported)?;
        let mut slot = self.server.lock().await;
        if slot.is_some() {
            return Err(Error::AlreadyListening);
        }
        let listener = host.bind_service(&service).await?;
        let (handle, conn_rx) = server::spawn(listener, service);
        *slot = Some(handle);
        Ok(conn_rx)
    }

    /// Stop the server and release its listener. A session with no open
    /// server is left as is.
    pub async fn close_server(&self) {
        if let Some(handle) = self.server.lock().await.take() {
            handle.shutdown().await;
        }
    }

    /// Tear down the session: close the server and stop the event pump.
    /// Subscribers receive nothing after this returns. Idempotent.
    pub async fn shutdown(&self) {
        self.close_server().await;
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.abort();
            let _ = pump.await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The server handle stops its loop on drop; the pump needs an
        // explicit abort when shutdown was skipped.
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}
