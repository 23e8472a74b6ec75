// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reply pipeline: from a normalized sender batch to a sent reply.
//!
//! [`WorkerPool`] takes batches off a bounded queue and hands each one to
//! [`BatchProcessor`], which resolves the tenant, runs the admission gates,
//! generates a reply through the provider, and dispatches it.

pub mod admission;
pub mod dispatcher;
pub mod generator;
pub mod manual;
pub mod metrics;
pub mod processor;
pub mod prompt;
pub mod settings;
pub mod shutdown;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{AdmissionPolicy, Denial};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use generator::ReplyGenerator;
pub use manual::{ManualSendOutcome, ManualSender};
pub use processor::{BatchOutcome, BatchProcessor, PipelineDeps};
pub use settings::SettingsCache;
pub use shutdown::install_signal_handler;
pub use worker::{run_batch, EnqueueError, WorkQueue, WorkerPool, DEAD_LETTER_SOURCE};
