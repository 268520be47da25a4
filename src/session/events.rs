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

//! Decoding of host notifications into session events.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::device::{AdapterState, BondState, RemoteDevice};
use crate::platform::HostEvent;

/// Notification delivered to session subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Discovery surfaced a device.
    DeviceFound(RemoteDevice),
    /// A device finished bonding.
    Paired(RemoteDevice),
    /// A previously bonded device lost its bond.
    Unpaired(RemoteDevice),
    /// The adapter reached a stable power state.
    AdapterStateChanged { enabled: bool },
    /// The adapter entered a power transition.
    AdapterStateChanging { enabling: bool },
    /// A discovery round ended.
    DiscoveryFinished,
}

/// Map one host notification to its session event.
///
/// Only two bond transitions are significant: a completion
/// (`Bonding -> Bonded`) and a removal (`Bonded -> None`). Everything
/// else, including the start of bonding and failed attempts, is dropped.
pub(crate) fn decode(event: HostEvent) -> Option<SessionEvent> {
    match event {
        HostEvent::DeviceFound(device) => Some(SessionEvent::DeviceFound(device)),
        HostEvent::BondStateChanged {
            device,
            previous,
            current,
        } => match (previous, current) {
            (BondState::Bonding, BondState::Bonded) => Some(SessionEvent::Paired(device)),
            (BondState::Bonded, BondState::None) => Some(SessionEvent::Unpaired(device)),
            _ => None,
        },
        HostEvent::AdapterStateChanged(state) => Some(match state {
            AdapterState::On => SessionEvent::AdapterStateChanged { enabled: true },
            AdapterState::Off => SessionEvent::AdapterStateChanged { enabled: false },
            AdapterState::TurningOn => SessionEvent::AdapterStateChanging { enabling: true },
            AdapterState::TurningOff => SessionEvent::AdapterStateChanging { enabling: false },
        }),
        HostEvent::DiscoveryFinished => Some(SessionEvent::DiscoveryFinished),
    }
}

/// Forward decoded host events to subscribers until the host feed closes.
pub(crate) fn spawn_pump(
    mut host_rx: mpsc::Receiver<HostEvent>,
    tx: broadcast::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = host_rx.recv().await {
            let Some(decoded) = decode(event) else {
                continue;
            };
            debug!("Session event: {:?}", decoded);
            // A send error only means no subscriber is currently live.
            let _ = tx.send(decoded);
        }
        debug!("Event pump stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceAddress;

    fn device(addr: &str) -> RemoteDevice {
        RemoteDevice::unknown(addr.parse::<DeviceAddress>().unwrap())
    }

    fn bond_change(previous: BondState, current: BondState) -> HostEvent {
        HostEvent::BondStateChanged {
            device: device("00:11:22:33:44:55"),
            previous,
            current,
        }
    }

    #[test]
    fn test_device_found_passes_through() {
        let found = device("DE:AD:BE:EF:00:01");
        assert_eq!(
            decode(HostEvent::DeviceFound(found.clone())),
            Some(SessionEvent::DeviceFound(found))
        );
    }

    #[test]
    fn test_bond_completion_is_paired() {
        assert_eq!(
            decode(bond_change(BondState::Bonding, BondState::Bonded)),
            Some(SessionEvent::Paired(device("00:11:22:33:44:55")))
        );
    }

    #[test]
    fn test_bond_removal_is_unpaired() {
        assert_eq!(
            decode(bond_change(BondState::Bonded, BondState::None)),
            Some(SessionEvent::Unpaired(device("00:11:22:33:44:55")))
        );
    }

    #[test]
    fn test_other_bond_transitions_are_dropped() {
        // Start of bonding.
        assert_eq!(decode(bond_change(BondState::None, BondState::Bonding)), None);
        // Failed attempt.
        assert_eq!(decode(bond_change(BondState::Bonding, BondState::None)), None);
        assert_eq!(decode(bond_change(BondState::None, BondState::Bonded)), None);
        assert_eq!(decode(bond_change(BondState::Bonded, BondState::Bonding)), None);
    }

    #[test]
    fn test_adapter_states_decode() {
        assert_eq!(
            decode(HostEvent::AdapterStateChanged(AdapterState::On)),
            Some(SessionEvent::AdapterStateChanged { enabled: true })
        );
        assert_eq!(
            decode(HostEvent::AdapterStateChanged(AdapterState::Off)),
            Some(SessionEvent::AdapterStateChanged { enabled: false })
        );
        assert_eq!(
            decode(HostEvent::AdapterStateChanged(AdapterState::TurningOn)),
            Some(SessionEvent::AdapterStateChanging { enabling: true })
        );
        assert_eq!(
            decode(HostEvent::AdapterStateChanged(AdapterState::TurningOff)),
            Some(SessionEvent::AdapterStateChanging { enabling: false })
        );
    }

    #[test]
    fn test_discovery_finished_passes_through() {
        assert_eq!(
            decode(HostEvent::DiscoveryFinished),
            Some(SessionEvent::DiscoveryFinished)
        );
    }

    #[tokio::test]
    async fn test_pump_fans_out_in_order() {
        let (host_tx, host_rx) = mpsc::channel(8);
        let (tx, mut first) = broadcast::channel(8);
        let mut second = tx.subscribe();
        let pump = spawn_pump(host_rx, tx);

        host_tx
            .send(HostEvent::DeviceFound(device("DE:AD:BE:EF:00:01")))
            .await
            .unwrap();
        host_tx.send(HostEvent::DiscoveryFinished).await.unwrap();

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await.unwrap(),
                SessionEvent::DeviceFound(device("DE:AD:BE:EF:00:01"))
            );
            assert_eq!(rx.recv().await.unwrap(), SessionEvent::DiscoveryFinished);
        }

        drop(host_tx);
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_skips_insignificant_events() {
        let (host_tx, host_rx) = mpsc::channel(8);
        let (tx, mut rx) = broadcast::channel(8);
        let _pump = spawn_pump(host_rx, tx);

        host_tx
            .send(bond_change(BondState::None, BondState::Bonding))
            .await
            .unwrap();
        host_tx.send(HostEvent::DiscoveryFinished).await.unwrap();

        // The dropped transition must not occupy a queue slot.
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::DiscoveryFinished);
    }
}
