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

//! Host Bluetooth stack abstraction.
//!
//! [`HostAdapter`] is the seam between session logic and the platform
//! stack. The production implementation is [`bluez::BluezAdapter`]; tests
//! drive the session with channel-scripted fakes instead of hardware.

pub mod bluez;

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::device::{AdapterState, BondState, DeviceAddress, RemoteDevice};

/// Well-known Serial Port Profile service class UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Service record for an RFCOMM server registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SppService {
    pub name: String,
    pub uuid: Uuid,
    pub channel: u8,
}

impl SppService {
    /// Service record under the standard SPP UUID.
    pub fn spp(name: impl Into<String>, channel: u8) -> Self {
        Self {
            name: name.into(),
            uuid: SPP_UUID,
            channel,
        }
    }
}

/// Raw notification from the host stack, before session-level decoding.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Discovery surfaced a device.
    DeviceFound(RemoteDevice),
    /// A device's bond state moved from `previous` to `current`.
    BondStateChanged {
        device: RemoteDevice,
        previous: BondState,
        current: BondState,
    },
    /// The adapter power state changed.
    AdapterStateChanged(AdapterState),
    /// A discovery round ended.
    DiscoveryFinished,
}

/// Byte transport of an accepted RFCOMM connection.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// An inbound connection accepted by a bound SPP service.
///
/// Owns the socket. The session hands the whole record to the caller and
/// keeps nothing, so dropping it closes the connection.
pub struct AcceptedConnection {
    pub peer: DeviceAddress,
    pub stream: Box<dyn ByteStream>,
}

impl fmt::Debug for AcceptedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptedConnection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Operations the session needs from a host Bluetooth adapter.
///
/// All methods report transport failures as `io::Error`; policy (degrading
/// to `false`, wrapping in session errors) stays in the session layer.
#[async_trait]
pub trait HostAdapter: Send + Sync {
    /// Whether the radio is currently powered.
    async fn is_powered(&self) -> io::Result<bool>;

    /// Power the radio on or off.
    async fn set_powered(&self, on: bool) -> io::Result<()>;

    /// Set the adapter's advertised friendly name.
    async fn set_alias(&self, alias: &str) -> io::Result<()>;

    /// Begin scanning for nearby devices. Fails if a scan is already running.
    async fn start_discovery(&self) -> io::Result<()>;

    /// Stop a running scan. Succeeds if no scan is running.
    async fn cancel_discovery(&self) -> io::Result<()>;

    /// Look up the host's current record for `address`.
    async fn resolve_device(&self, address: DeviceAddress) -> io::Result<RemoteDevice>;

    /// Start bonding with `address`. Resolves once pairing completes or fails;
    /// bond transitions arrive through the event stream either way.
    async fn pair_device(&self, address: DeviceAddress) -> io::Result<()>;

    /// Open a stream of host notifications. Each call returns an independent
    /// subscription; the feed stops when the receiver is dropped.
    async fn subscribe_events(&self) -> io::Result<mpsc::Receiver<HostEvent>>;

    /// Register `service` and bind its RFCOMM listener.
    async fn bind_service(&self, service: &SppService) -> io::Result<Box<dyn HostListener>>;
}

/// A bound server socket producing inbound connections.
#[async_trait]
pub trait HostListener: Send {
    /// Wait for the next inbound connection.
    async fn accept(&mut self) -> io::Result<AcceptedConnection>;
}
