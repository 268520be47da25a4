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

//! Device data model: addresses, bond state and adapter power state.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Power state reported by the host Bluetooth stack.
///
/// BlueZ only reports the terminal `On`/`Off` states; the transitional
/// states exist because other host stacks report them and the decode
/// table distinguishes "changed" from "changing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Off,
    TurningOff,
    On,
    TurningOn,
}

/// Bonding state of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BondState {
    #[default]
    None,
    Bonding,
    Bonded,
}

/// Six-byte Bluetooth device address in MAC format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub [u8; 6]);

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Error returned when parsing a malformed device address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bluetooth address: {0:?}")]
pub struct InvalidAddress(pub String);

impl FromStr for DeviceAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidAddress(s.to_string());
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in &mut bytes {
            let part = parts.next().ok_or_else(invalid)?;
            // from_str_radix accepts a sign prefix, so check the digits first.
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(DeviceAddress(bytes))
    }
}

/// Snapshot of a remote device as reported by the host stack.
///
/// Identity is the address; the friendly name may be unknown. Records are
/// only built from host-reported data or by address lookup, never invented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    pub address: DeviceAddress,
    pub name: Option<String>,
    pub bond: BondState,
}

impl RemoteDevice {
    /// Record for an address the host stack has no further knowledge of.
    pub fn unknown(address: DeviceAddress) -> Self {
        Self {
            address,
            name: None,
            bond: BondState::None,
        }
    }

    /// Display label: friendly name when known, address otherwise.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.address.to_string(),
        }
    }
}
