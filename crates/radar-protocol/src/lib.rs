//! Decoder for the Photon-family protocol16 wire format: typed parameter
//! values, the reliable/unreliable command framing above them, and the
//! JSON envelope shapes used to fan decoded messages out to subscribers.

pub mod frame;
pub mod message;
pub mod reader;
pub mod value;

pub use frame::{parse_packet, Command, FrameError, Message, Packet};
pub use message::{BatchEnvelope, InboundMessage, OutboundMessage};
pub use reader::{ByteReader, ReaderError};
pub use value::{DecodeError, EventData, OperationRequest, OperationResponse, ParameterTable, Value};
