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

//! Adapter facade.
//!
//! Wraps the optional host adapter and fixes the degradation policy: query
//! and discovery calls degrade to `false`/`None` on an unsupported host,
//! while mutating calls return [`Error::Unsupported`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::device::{BondState, DeviceAddress, RemoteDevice};
use crate::error::{Error, Result};
use crate::platform::HostAdapter;

/// Facade over the host adapter, safe to call on hosts without Bluetooth.
#[derive(Clone)]
pub struct AdapterControl {
    host: Option<Arc<dyn HostAdapter>>,
}

impl AdapterControl {
    pub(crate) fn new(host: Option<Arc<dyn HostAdapter>>) -> Self {
        Self { host }
    }

    /// Whether this host has a usable Bluetooth adapter.
    pub fn is_supported(&self) -> bool {
        self.host.is_some()
    }

    /// Whether the radio is powered. `false` when unsupported or when the
    /// host stack cannot be queried.
    pub async fn is_enabled(&self) -> bool {
        let Some(host) = &self.host else {
            return false;
        };
        host.is_powered().await.unwrap_or(false)
    }

    /// Power the radio on or off. Already being in the requested state is
    /// not an error.
    pub async fn set_enabled(&self, on: bool) -> Result<()> {
        let host = self.host.as_ref().ok_or(Error::Unsupported)?;
        if host.is_powered().await? == on {
            return Ok(());
        }
        host.set_powered(on).await?;
        info!("Adapter power set to {}", on);
        Ok(())
    }

    /// Begin scanning for nearby devices. Returns whether the scan started;
    /// an unsupported host or a host-side refusal both yield `false`.
    pub async fn start_discovery(&self) -> bool {
        let Some(host) = &self.host else {
            return false;
        };
        match host.start_discovery().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Could not start discovery: {}", err);
                false
            }
        }
    }

    /// Stop a running scan. Returns whether the host accepted the request.
    pub async fn cancel_discovery(&self) -> bool {
        let Some(host) = &self.host else {
            return false;
        };
        match host.cancel_discovery().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Could not cancel discovery: {}", err);
                false
            }
        }
    }

    /// Look up the host's record for `address`. `None` when unsupported or
    /// when the host has no record.
    pub async fn resolve_device(&self, address: DeviceAddress) -> Option<RemoteDevice> {
        let host = self.host.as_ref()?;
        match host.resolve_device(address).await {
            Ok(record) => Some(record),
            Err(err) => {
                debug!("Device lookup failed for {}: {}", address, err);
                None
            }
        }
    }

    /// Start bonding with `address`. An already bonded device is a no-op;
    /// completion is reported through the event stream, not the return.
    pub async fn pair_device(&self, address: DeviceAddress) -> Result<()> {
        let host = self.host.as_ref().ok_or(Error::Unsupported)?;
        let record = host.resolve_device(address).await?;
        if record.bond == BondState::Bonded {
            info!("{} is already bonded", record.label());
            return Ok(());
        }
        host.pair_device(address).await?;
        Ok(())
    }

    pub(crate) fn host(&self) -> Option<&Arc<dyn HostAdapter>> {
        self.host.as_ref()
    }
}
