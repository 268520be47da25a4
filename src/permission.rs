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

//! Runtime permission gating.
//!
//! Discovery reveals nearby-device information, so the session asks a
//! [`PermissionHost`] before scanning instead of assuming consent.

use std::fmt;

use async_trait::async_trait;

/// Runtime permissions the session may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Scanning for nearby devices.
    DeviceDiscovery,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::DeviceDiscovery => write!(f, "device-discovery"),
        }
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDecision {
    pub granted: bool,
    /// Whether the user saw a prompt, as opposed to an automatic denial
    /// from a remembered choice or policy.
    pub dialog_shown: bool,
}

impl PermissionDecision {
    pub fn granted() -> Self {
        Self {
            granted: true,
            dialog_shown: false,
        }
    }

    pub fn denied(dialog_shown: bool) -> Self {
        Self {
            granted: false,
            dialog_shown,
        }
    }
}

/// Source of permission decisions, typically backed by a user prompt.
#[async_trait]
pub trait PermissionHost: Send + Sync {
    async fn request(&self, permission: Permission) -> PermissionDecision;
}

/// Grants every request without prompting. Suits headless use where the
/// operating user already holds the needed privileges.
pub struct AlwaysGranted;

#[async_trait]
impl PermissionHost for AlwaysGranted {
    async fn request(&self, _permission: Permission) -> PermissionDecision {
        PermissionDecision::granted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_granted() {
        let decision = AlwaysGranted.request(Permission::DeviceDiscovery).await;
        assert!(decision.granted);
    }

    #[test]
    fn test_permission_display() {
        assert_eq!(Permission::DeviceDiscovery.to_string(), "device-discovery");
    }
}
