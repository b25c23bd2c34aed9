//! Network layer.
//!
//! This module provides the Kafka frame codec used by broker transports to
//! cut the inbound byte stream into complete responses.

pub mod codec;

pub use codec::{FrameKind, KafkaCodec, KafkaFrame};
