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

//! BlueZ-backed host adapter.

use std::collections::HashSet;
use std::io;

use async_trait::async_trait;
use bluer::rfcomm::{Listener, SocketAddr};
use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, DeviceEvent, DeviceProperty};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::{AcceptedConnection, HostAdapter, HostEvent, HostListener, SppService};
use crate::device::{AdapterState, BondState, DeviceAddress, RemoteDevice};

/// Queue depth for one host event subscription.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Host adapter backed by the default BlueZ adapter.
pub struct BluezAdapter {
    adapter: Adapter,
    /// Live discovery round, stopped by dropping or signalling the sender.
    discovery: Mutex<Option<oneshot::Sender<()>>>,
}

impl BluezAdapter {
    /// Connect to BlueZ and claim the default adapter.
    ///
    /// Returns `None` when the daemon is unreachable or the host has no
    /// adapter; callers then run in unsupported mode.
    pub async fn probe() -> Option<Self> {
        let session = match bluer::Session::new().await {
            Ok(session) => session,
            Err(err) => {
                warn!("BlueZ session unavailable: {}", err);
                return None;
            }
        };
        let adapter = match session.default_adapter().await {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!("No Bluetooth adapter found: {}", err);
                return None;
            }
        };
        info!("Using Bluetooth adapter: {}", adapter.name());
        Some(Self {
            adapter,
            discovery: Mutex::new(None),
        })
    }
}

fn to_host_address(addr: Address) -> DeviceAddress {
    DeviceAddress(addr.0)
}

fn to_bluez_address(addr: DeviceAddress) -> Address {
    Address::new(addr.0)
}

fn io_err(err: bluer::Error) -> io::Error {
    io::Error::other(err)
}

/// Read the host's current record for a device, degrading to an
/// address-only record when BlueZ has forgotten it.
async fn lookup_device(adapter: &Adapter, addr: Address) -> RemoteDevice {
    let address = to_host_address(addr);
    let Ok(device) = adapter.device(addr) else {
        return RemoteDevice::unknown(address);
    };
    let name = device.name().await.ok().flatten();
    let bond = match device.is_paired().await {
        Ok(true) => BondState::Bonded,
        _ => BondState::None,
    };
    RemoteDevice {
        address,
        name,
        bond,
    }
}

/// Watch one device's `Paired` property and report bond transitions.
///
/// BlueZ only exposes the terminal flag. A pairing that completes has
/// passed through bonding, so the flip to `true` is reported as
/// `Bonding -> Bonded` and the flip to `false` as `Bonded -> None`.
fn spawn_bond_watcher(adapter: Adapter, addr: Address, tx: mpsc::Sender<HostEvent>) {
    tokio::spawn(async move {
        let Ok(device) = adapter.device(addr) else {
            return;
        };
        let mut paired = device.is_paired().await.unwrap_or(false);
        let events = match device.events().await {
            Ok(events) => events,
            Err(err) => {
                debug!("No property stream for {}: {}", addr, err);
                return;
            }
        };
        let mut events = Box::pin(events);
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                event = events.next() => match event {
                    Some(DeviceEvent::PropertyChanged(DeviceProperty::Paired(now))) => {
                        if now == paired {
                            continue;
                        }
                        paired = now;
                        let (previous, current) = if now {
                            (BondState::Bonding, BondState::Bonded)
                        } else {
                            (BondState::Bonded, BondState::None)
                        };
                        let name = device.name().await.ok().flatten();
                        let record = RemoteDevice {
                            address: to_host_address(addr),
                            name,
                            bond: current,
                        };
                        let changed = HostEvent::BondStateChanged {
                            device: record,
                            previous,
                            current,
                        };
                        if tx.send(changed).await.is_err() {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    });
}

#[async_trait]
impl HostAdapter for BluezAdapter {
    async fn is_powered(&self) -> io::Result<bool> {
        self.adapter.is_powered().await.map_err(io_err)
    }

    async fn set_powered(&self, on: bool) -> io::Result<()> {
        self.adapter.set_powered(on).await.map_err(io_err)
    }

    async fn set_alias(&self, alias: &str) -> io::Result<()> {
        self.adapter
            .set_alias(alias.to_string())
            .await
            .map_err(io_err)
    }

    async fn start_discovery(&self) -> io::Result<()> {
        let mut slot = self.discovery.lock().await;
        if slot.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "discovery is already in progress",
            ));
        }
        // The returned stream keeps the BlueZ discovery session alive;
        // dropping it is what stops the scan.
        let stream = self.adapter.discover_devices().await.map_err(io_err)?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = stream.next() => {
                        if event.is_none() {
                            break;
                        }
                    }
                }
            }
            debug!("Discovery session released");
        });
        *slot = Some(stop_tx);
        info!("Device discovery started");
        Ok(())
    }

    async fn cancel_discovery(&self) -> io::Result<()> {
        if let Some(stop) = self.discovery.lock().await.take() {
            let _ = stop.send(());
            info!("Device discovery cancelled");
        }
        Ok(())
    }

    async fn resolve_device(&self, address: DeviceAddress) -> io::Result<RemoteDevice> {
        Ok(lookup_device(&self.adapter, to_bluez_address(address)).await)
    }

    async fn pair_device(&self, address: DeviceAddress) -> io::Result<()> {
        let device = self
            .adapter
            .device(to_bluez_address(address))
            .map_err(io_err)?;
        device.pair().await.map_err(io_err)
    }

    async fn subscribe_events(&self) -> io::Result<mpsc::Receiver<HostEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut events = self.adapter.events().await.map_err(io_err)?;
        let known = self.adapter.device_addresses().await.map_err(io_err)?;
        let adapter = self.adapter.clone();

        tokio::spawn(async move {
            let mut watched: HashSet<Address> = HashSet::new();
            for addr in known {
                if watched.insert(addr) {
                    spawn_bond_watcher(adapter.clone(), addr, tx.clone());
                }
            }
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = events.next() => {
                        let Some(event) = event else { break };
                        match event {
                            AdapterEvent::DeviceAdded(addr) => {
                                if watched.insert(addr) {
                                    spawn_bond_watcher(adapter.clone(), addr, tx.clone());
                                }
                                let record = lookup_device(&adapter, addr).await;
                                if tx.send(HostEvent::DeviceFound(record)).await.is_err() {
                                    break;
                                }
                            }
                            AdapterEvent::DeviceRemoved(addr) => {
                                watched.remove(&addr);
                            }
                            AdapterEvent::PropertyChanged(AdapterProperty::Powered(on)) => {
                                let state = if on { AdapterState::On } else { AdapterState::Off };
                                if tx.send(HostEvent::AdapterStateChanged(state)).await.is_err() {
                                    break;
                                }
                            }
                            AdapterEvent::PropertyChanged(AdapterProperty::Discovering(false)) => {
                                if tx.send(HostEvent::DiscoveryFinished).await.is_err() {
                                    break;
                                }
                            }
                            AdapterEvent::PropertyChanged(_) => {}
                        }
                    }
                }
            }
            debug!("Host event feed closed");
        });

        Ok(rx)
    }

    async fn bind_service(&self, service: &SppService) -> io::Result<Box<dyn HostListener>> {
        if !self.adapter.is_powered().await.map_err(io_err)? {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "bluetooth adapter is powered off",
            ));
        }

        // Peers must be able to find and bond with the server.
        self.adapter.set_discoverable(true).await.map_err(io_err)?;
        self.adapter.set_pairable(true).await.map_err(io_err)?;

        let local_addr = SocketAddr::new(Address::any(), service.channel);
        let listener = Listener::bind(local_addr).await?;

        // bluer publishes the service record when the channel is bound; the
        // profile API would give finer SDP control.
        info!(
            "RFCOMM service {:?} listening on channel {} (UUID: {})",
            service.name, service.channel, service.uuid
        );
        Ok(Box::new(BluezListener { listener }))
    }
}

/// Bound RFCOMM socket on the BlueZ adapter.
struct BluezListener {
    listener: Listener,
}

#[async_trait]
impl HostListener for BluezListener {
    async fn accept(&mut self) -> io::Result<AcceptedConnection> {
        let (stream, peer) = self.listener.accept().await?;
        Ok(AcceptedConnection {
            peer: to_host_address(peer.addr),
            stream: Box::new(stream),
        })
    }
}
