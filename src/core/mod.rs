//! Core module containing the main functionality of Probekit
//!
//! This module provides:
//! - Transport layer for serial and TCP connections, with buffered reception
//!   and automatic socket reconnection
//! - Receive buffer with hex/text rendering
//! - Payload codec (literal text and hex-pair strings)
//! - Script data model and replace-only script store
//! - Step sequencer with validation and progress reporting

pub mod buffer;
pub mod codec;
pub mod script;
pub mod sequencer;
pub mod transport;
