// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The approval queue: agents submit batches of write requests, a human (or
//! a per-agent bypass flag) decides, and the executor replays approved
//! batches against the upstream service.

mod executor;
mod state;
mod view;

pub use executor::Executor;
pub use state::QueueService;
pub use view::{QueueView, SubmitOutcome};
