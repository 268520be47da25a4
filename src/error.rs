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

//! Session error type.

use std::io;

use thiserror::Error;

use crate::permission::Permission;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable Bluetooth adapter exists on this host.
    #[error("bluetooth is not supported on this host")]
    Unsupported,

    /// The session already has a live SPP server. Close it before reopening.
    #[error("an SPP server is already listening")]
    AlreadyListening,

    /// The permission host declined a permission the operation requires.
    /// `dialog_shown` tells callers whether the user saw a prompt or the
    /// denial was automatic, so they can word follow-up guidance.
    #[error("{permission} permission denied")]
    PermissionDenied {
        permission: Permission,
        dialog_shown: bool,
    },

    /// Transport-level failure reported by the host stack.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
