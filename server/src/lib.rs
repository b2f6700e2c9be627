//! # Trajectory Amalgamation Server
//!
//! Streams a visual simplification of geometric trajectory data to
//! connected viewers over long-lived multipart HTTP-like connections,
//! and accepts live view-parameter updates on separate control
//! connections.
//!
//! ## Architecture
//!
//! A single coordinating loop ([`network::Server::run`]) owns all
//! mutable state. Per-connection reader tasks feed it whole requests
//! through a message queue; per-connection writer tasks drain outbound
//! frame queues. A control request names a *target* data channel, and
//! the resulting record stream is queued to that channel's writer — the
//! connection that sent the update never receives the data itself.
//!
//! ## Pipeline
//!
//! For each selected group, member trajectories are projected into view
//! space, quantized to the resolution grid, and clipped against the
//! view rectangle ([`clip`]). Each visible run is colorized by group
//! position, encoded into the fixed binary record layout
//! ([`shared::wire`]), and staged through a bounded chunk buffer
//! ([`buffer`]) that frames flushes as transfer chunks.
//!
//! The dataset and group list are loaded once at startup ([`loader`])
//! and stay read-only for the process lifetime, so request handling
//! needs no synchronization beyond the coordinating loop itself.

pub mod amalgamate;
pub mod buffer;
pub mod clip;
pub mod loader;
pub mod network;
pub mod registry;
pub mod request;
