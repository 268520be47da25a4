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

//! Classic Bluetooth (RFCOMM/SPP) session management for Linux.
//!
//! A [`Session`] wraps the host's default adapter behind a facade that is
//! safe to use on hosts without Bluetooth, fans out adapter and device
//! notifications to any number of subscribers, and runs at most one SPP
//! server whose accepted connections are handed to the caller untouched.
//!
//! ```no_run
//! use btlink::{Config, Session};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::new(Config::default()).await;
//!     let mut events = session.subscribe();
//!     session.adapter().start_discovery().await;
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod permission;
pub mod platform;
pub mod session;

pub use config::Config;
pub use device::{AdapterState, BondState, DeviceAddress, RemoteDevice};
pub use error::{Error, Result};
pub use permission::{AlwaysGranted, Permission, PermissionDecision, PermissionHost};
pub use platform::{
    AcceptedConnection, ByteStream, HostAdapter, HostEvent, HostListener, SppService, SPP_UUID,
};
pub use session::{AdapterControl, Session, SessionEvent};
