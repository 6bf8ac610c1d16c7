//! Queue-mediated function-call bridge for hosted agents.
//!
//! A prompt starts an agent run; whenever the run stops on
//! `requires_action`, the tool call is published to an inbound queue as an
//! [`codec::InvocationEnvelope`], answered by a worker on the outbound queue
//! with a [`codec::ResultEnvelope`] carrying the same correlation id, and
//! submitted back to the run before polling resumes.

pub mod agent;
pub mod bridge;
pub mod capability;
pub mod codec;
pub mod config;
pub mod error;
pub mod listener;
pub mod mock;
pub mod openai;
pub mod pending;
pub mod poller;
pub mod queue;

pub use bridge::Bridge;
pub use error::{BridgeError, Result};
