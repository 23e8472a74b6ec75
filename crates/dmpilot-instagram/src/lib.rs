// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instagram platform integration for dmpilot.
//!
//! Inbound: signature verification, the subscription handshake, and
//! normalization of webhook deliveries into [`SenderBatch`]es.
//! Outbound: [`GraphChannel`], the Graph API [`ChannelAdapter`].
//!
//! [`SenderBatch`]: dmpilot_core::types::SenderBatch
//! [`ChannelAdapter`]: dmpilot_core::traits::ChannelAdapter

pub mod graph;
pub mod handshake;
pub mod normalize;
pub mod payload;
pub mod signature;

pub use graph::GraphChannel;
pub use handshake::{verify_subscription, SubscriptionQuery};
pub use normalize::normalize;
pub use payload::WebhookPayload;
pub use signature::{sign, verify_signature, SIGNATURE_HEADER};
