// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Everything between the gateway and the third-party services: the
//! access-control resolver, the credential vault with refresh-on-read
//! semantics, the per-service blocked-path denylist, and the read proxy.

mod blocked;
mod resolver;
mod upstream;
mod vault;

pub use blocked::BlockedPaths;
pub use resolver::AccessResolver;
pub use upstream::{resolve_base_url, AuthSpec, ReadProxy, UpstreamResponse};
pub use vault::CredentialVault;
