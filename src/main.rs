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

//! Interactive demo shell for the Bluetooth session.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use btlink::{
    AcceptedConnection, AlwaysGranted, Config, DeviceAddress, Error, Session, SessionEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("btlink=info".parse().unwrap()),
        )
        .init();

    info!("Starting btlink v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let session = Session::new(config).await;
    if !session.adapter().is_supported() {
        anyhow::bail!("bluetooth is not supported on this host");
    }

    let mut events = session.subscribe();
    let mut connections: Option<mpsc::Receiver<AcceptedConnection>> = None;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    println!("btlink ready; type 'help' for commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if handle_command(&session, line.trim(), &mut connections).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => print_event(&event),
                    Err(err) => info!("Event stream interrupted: {}", err),
                }
            }
            connection = next_connection(&mut connections) => {
                match connection {
                    Some(connection) => {
                        // No data protocol is spoken; dropping the stream
                        // closes the socket again.
                        println!("accepted connection from {}", connection.peer);
                    }
                    None => {
                        println!("server closed");
                        connections = None;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    session.shutdown().await;
    info!("btlink stopped");
    Ok(())
}

/// Resolve the next accepted connection, or park when no server is open.
async fn next_connection(
    connections: &mut Option<mpsc::Receiver<AcceptedConnection>>,
) -> Option<AcceptedConnection> {
    match connections {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::DeviceFound(device) => {
            println!("found {} ({})", device.label(), device.address);
        }
        SessionEvent::Paired(device) => println!("paired with {}", device.label()),
        SessionEvent::Unpaired(device) => println!("unpaired from {}", device.label()),
        SessionEvent::AdapterStateChanged { enabled } => {
            println!("adapter is now {}", if *enabled { "on" } else { "off" });
        }
        SessionEvent::AdapterStateChanging { enabling } => {
            println!(
                "adapter is turning {}",
                if *enabling { "on" } else { "off" }
            );
        }
        SessionEvent::DiscoveryFinished => println!("discovery finished"),
    }
}

/// Execute one shell command. Returns `true` when the shell should exit.
async fn handle_command(
    session: &Session,
    line: &str,
    connections: &mut Option<mpsc::Receiver<AcceptedConnection>>,
) -> bool {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let argument = parts.next();

    match command {
        "" => {}
        "help" => {
            println!("commands:");
            println!("  status            adapter and server state");
            println!("  on | off          power the adapter");
            println!("  discover          scan for nearby devices");
            println!("  cancel            stop scanning");
            println!("  pair <addr>       bond with a device");
            println!("  resolve <addr>    show the host's record for a device");
            println!("  server            open the SPP server");
            println!("  stop              close the SPP server");
            println!("  quit              exit");
        }
        "status" => {
            println!(
                "supported: {}, enabled: {}, server: {}",
                session.adapter().is_supported(),
                session.adapter().is_enabled().await,
                if connections.is_some() { "open" } else { "closed" },
            );
        }
        "on" | "off" => match session.adapter().set_enabled(command == "on").await {
            Ok(()) => println!("ok"),
            Err(err) => println!("error: {}", err),
        },
        "discover" => match session.request_discovery(&AlwaysGranted).await {
            Ok(()) => println!("scanning..."),
            Err(Error::PermissionDenied { dialog_shown, .. }) => {
                if dialog_shown {
                    println!("permission denied; grant it to scan for devices");
                } else {
                    println!("permission denied; enable device discovery in settings");
                }
            }
            Err(err) => println!("error: {}", err),
        },
        "cancel" => {
            if session.adapter().cancel_discovery().await {
                println!("discovery cancelled");
            } else {
                println!("could not cancel discovery");
            }
        }
        "pair" => match parse_address(argument) {
            Ok(addr) => match session.adapter().pair_device(addr).await {
                Ok(()) => println!("pairing with {} requested", addr),
                Err(err) => println!("error: {}", err),
            },
            Err(message) => println!("{}", message),
        },
        "resolve" => match parse_address(argument) {
            Ok(addr) => match session.adapter().resolve_device(addr).await {
                Some(device) => {
                    println!("{} bond={:?}", device.label(), device.bond);
                }
                None => println!("no record for {}", addr),
            },
            Err(message) => println!("{}", message),
        },
        "server" => match session.open_spp_server().await {
            Ok(rx) => {
                *connections = Some(rx);
                println!("server open");
            }
            Err(Error::AlreadyListening) => println!("server is already open"),
            Err(err) => println!("error: {}", err),
        },
        "stop" => {
            session.close_server().await;
            *connections = None;
            println!("server closed");
        }
        "quit" | "exit" => return true,
        other => println!("unknown command {:?}; try 'help'", other),
    }
    false
}

fn parse_address(argument: Option<&str>) -> std::result::Result<DeviceAddress, String> {
    let Some(raw) = argument else {
        return Err("usage: <command> XX:XX:XX:XX:XX:XX".to_string());
    };
    raw.parse::<DeviceAddress>()
        .map_err(|err| format!("error: {}", err))
}
