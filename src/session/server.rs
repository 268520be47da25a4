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

//! SPP server accept loop.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::platform::{AcceptedConnection, HostListener, SppService};

/// Queue depth for accepted connections awaiting pickup.
const CONNECTION_QUEUE: usize = 32;

/// Handle to a running accept loop.
///
/// Stopping is explicit through [`shutdown`](Self::shutdown); dropping the
/// handle releases the stop sender, which also ends the loop.
pub(crate) struct ServerHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Signal the loop to stop and wait for the listener to be released.
    pub(crate) async fn shutdown(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

/// Start the accept loop on an already bound listener.
///
/// Accepted connections arrive on the returned receiver in accept order.
pub(crate) fn spawn(
    listener: Box<dyn HostListener>,
    service: SppService,
) -> (ServerHandle, mpsc::Receiver<AcceptedConnection>) {
    let (conn_tx, conn_rx) = mpsc::channel(CONNECTION_QUEUE);
    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(accept_loop(listener, service, conn_tx, stop_rx));
    (ServerHandle { stop_tx, task }, conn_rx)
}

async fn accept_loop(
    mut listener: Box<dyn HostListener>,
    service: SppService,
    conn_tx: mpsc::Sender<AcceptedConnection>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    info!("Server {:?} waiting for connections", service.name);

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                info!("Server {:?} stopped", service.name);
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(connection) => {
                    info!("Connection from {}", connection.peer);
                    // A full queue blocks here until the receiver catches up;
                    // a dropped receiver fails the send at once. Stop still
                    // interrupts a blocked forward.
                    tokio::select! {
                        sent = conn_tx.send(connection) => {
                            if let Err(err) = sent {
                                warn!("Dropping inbound connection: {}", err);
                            }
                        }
                        _ = &mut stop_rx => {
                            info!("Server {:?} stopped", service.name);
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!("Accept failed, server {:?} closing: {}", service.name, err);
                    break;
                }
            }
        }
    }
}
