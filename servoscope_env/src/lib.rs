//! Servoscope Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction that lets the Servoscope
//! pipeline run against a real device link or a simulated one.
//!
//! # Core Concept
//!
//! Everything the pipeline does not own is intercepted here:
//! - Time (`now()`, `sleep()`)
//! - Transport (`connected()`, `send()`, `recv()`)
//!
//! The wire format is one JSON text frame per event, `[event, payload]`.
//!
//! # Example
//!
//! ```ignore
//! use servoscope_env::{EventTransport, ScopeContext};
//!
//! async fn pump<Ctx: ScopeContext, Net: EventTransport>(ctx: &Ctx, net: &Net) {
//!     net.connected().await?;
//!     while let Some(frame) = net.recv().await {
//!         handle_frame(&frame, ctx.now_secs());
//!     }
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;
mod loopback;

pub use context::ScopeContext;
pub use transport::EventTransport;
pub use types::{Envelope, SUBSCRIBE_EVENT, UNSUBSCRIBE_EVENT};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use loopback::{loopback, LinkState, LoopbackPeer, LoopbackTransport};
