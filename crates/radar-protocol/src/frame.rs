//! The two-layer framing above the typed-value format: a container packet
//! holding reliable/unreliable/disconnect commands, each carrying at most
//! one inner message (event, operation request, or operation response).

use thiserror::Error;

use crate::reader::{ByteReader, ReaderError};
use crate::value::{
    decode_event_data, decode_operation_request, decode_operation_response, DecodeError,
    EventData, OperationRequest, OperationResponse,
};

pub mod command_type {
    pub const DISCONNECT: u8 = 4;
    pub const RELIABLE: u8 = 6;
    pub const UNRELIABLE: u8 = 7;
}

pub mod message_type {
    pub const OPERATION_REQUEST: u8 = 2;
    pub const OPERATION_RESPONSE: u8 = 3;
    pub const EVENT: u8 = 4;
}

const PACKET_HEADER_LEN: usize = 12;
const COMMAND_HEADER_LEN: usize = 12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("command length {declared} is smaller than the 12-byte header")]
    CommandTooShort { declared: u32 },
    #[error("unknown command type {0}")]
    UnknownCommandType(u8),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
}

/// The decoded payload of a reliable/unreliable command, if any.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Event(EventData),
    Request(OperationRequest),
    Response(OperationResponse),
}

/// One command inside a packet. `payload` is `None` for commands that carry
/// no inner message (disconnect, or a reliable/unreliable command whose
/// message type this decoder does not recognize but whose header is still
/// well-formed).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub command_type: u8,
    pub channel_id: u8,
    pub command_flags: u8,
    pub length: u32,
    pub sequence_number: u32,
    pub message: Option<Message>,
}

/// A container packet: one UDP datagram's worth of commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub peer_id: u16,
    pub flags: u8,
    pub command_count: u8,
    pub timestamp: u32,
    pub challenge: u32,
    pub commands: Vec<Command>,
}

/// Parses a full UDP payload into a [`Packet`].
///
/// Mirrors the original's recovery behavior: if a command fails to parse,
/// parsing stops and the commands collected so far are returned rather than
/// the whole packet being discarded.
pub fn parse_packet(data: &[u8]) -> Result<Packet, FrameError> {
    let mut reader = ByteReader::new(data);
    let peer_id = reader.read_u16_be()?;
    let flags = reader.read_u8()?;
    let command_count = reader.read_u8()?;
    let timestamp = reader.read_u32_be()?;
    let challenge = reader.read_u32_be()?;

    let mut commands = Vec::with_capacity(command_count as usize);
    for _ in 0..command_count {
        match parse_command(&mut reader) {
            Ok(cmd) => commands.push(cmd),
            Err(_) => break,
        }
    }

    Ok(Packet {
        peer_id,
        flags,
        command_count,
        timestamp,
        challenge,
        commands,
    })
}

/// Parses one command header plus whatever inner message its type carries.
fn parse_command(reader: &mut ByteReader) -> Result<Command, FrameError> {
    let command_type = reader.read_u8()?;
    let channel_id = reader.read_u8()?;
    let command_flags = reader.read_u8()?;
    reader.skip(1)?; // reserved byte
    let length = reader.read_u32_be()?;
    let sequence_number = reader.read_u32_be()?;

    if (length as usize) < COMMAND_HEADER_LEN {
        return Err(FrameError::CommandTooShort { declared: length });
    }
    let payload_len = length as usize - COMMAND_HEADER_LEN;
    let mut payload_reader = reader.sub_reader(payload_len)?;

    let message = match command_type {
        command_type::DISCONNECT => None,
        command_type::UNRELIABLE => {
            // Unreliable commands carry a 4-byte sequence number ahead of
            // the reliable command body; its value isn't otherwise used.
            payload_reader.skip(4)?;
            parse_reliable_body(&mut payload_reader)?
        }
        command_type::RELIABLE => parse_reliable_body(&mut payload_reader)?,
        other => return Err(FrameError::UnknownCommandType(other)),
    };

    Ok(Command {
        command_type,
        channel_id,
        command_flags,
        length,
        sequence_number,
        message,
    })
}

/// Reliable command body: one reserved byte, then a message-type byte, then
/// the message itself.
fn parse_reliable_body(reader: &mut ByteReader) -> Result<Option<Message>, FrameError> {
    if reader.remaining() == 0 {
        return Ok(None);
    }
    reader.skip(1)?;
    if reader.remaining() == 0 {
        return Ok(None);
    }
    let message_type = reader.read_u8()?;
    let message = match message_type {
        message_type::EVENT => Message::Event(decode_event_data(reader)?),
        message_type::OPERATION_REQUEST => Message::Request(decode_operation_request(reader)?),
        message_type::OPERATION_RESPONSE => Message::Response(decode_operation_response(reader)?),
        other => return Err(FrameError::UnknownMessageType(other)),
    };
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ParameterTable, Value};

    fn packet_header(command_count: u8) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(&0x1234u16.to_be_bytes()); // peer_id
        h.push(0); // flags
        h.push(command_count);
        h.extend_from_slice(&0u32.to_be_bytes()); // timestamp
        h.extend_from_slice(&0u32.to_be_bytes()); // challenge
        h
    }

    fn command_header(command_type: u8, length: u32, seq: u32) -> Vec<u8> {
        let mut h = Vec::new();
        h.push(command_type);
        h.push(0); // channel_id
        h.push(0); // command_flags
        h.push(0); // reserved
        h.extend_from_slice(&length.to_be_bytes());
        h.extend_from_slice(&seq.to_be_bytes());
        h
    }

    fn empty_parameter_table() -> Vec<u8> {
        0u16.to_be_bytes().to_vec()
    }

    #[test]
    fn parses_packet_with_no_commands() {
        let data = packet_header(0);
        let packet = parse_packet(&data).unwrap();
        assert_eq!(packet.peer_id, 0x1234);
        assert_eq!(packet.commands.len(), 0);
    }

    #[test]
    fn parses_disconnect_command_with_no_message() {
        let mut data = packet_header(1);
        let body_len = 0;
        data.extend(command_header(
            command_type::DISCONNECT,
            (COMMAND_HEADER_LEN + body_len) as u32,
            1,
        ));
        let packet = parse_packet(&data).unwrap();
        assert_eq!(packet.commands.len(), 1);
        assert_eq!(packet.commands[0].message, None);
    }

    #[test]
    fn parses_reliable_event_command() {
        let mut body = vec![0u8]; // reserved
        body.push(message_type::EVENT);
        body.push(42); // event code
        body.extend(empty_parameter_table());

        let mut data = packet_header(1);
        data.extend(command_header(
            command_type::RELIABLE,
            (COMMAND_HEADER_LEN + body.len()) as u32,
            1,
        ));
        data.extend(body);

        let packet = parse_packet(&data).unwrap();
        match &packet.commands[0].message {
            Some(Message::Event(e)) => assert_eq!(e.code, 42),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_unreliable_event_command_skipping_leading_sequence() {
        let mut body = 99u32.to_be_bytes().to_vec(); // unreliable sequence number
        body.push(0u8); // reserved
        body.push(message_type::EVENT);
        body.push(7); // event code
        body.extend(empty_parameter_table());

        let mut data = packet_header(1);
        data.extend(command_header(
            command_type::UNRELIABLE,
            (COMMAND_HEADER_LEN + body.len()) as u32,
            1,
        ));
        data.extend(body);

        let packet = parse_packet(&data).unwrap();
        match &packet.commands[0].message {
            Some(Message::Event(e)) => assert_eq!(e.code, 7),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn command_shorter_than_header_is_rejected() {
        let mut reader = ByteReader::new(&command_header(command_type::RELIABLE, 4, 1));
        let err = parse_command(&mut reader).unwrap_err();
        assert_eq!(err, FrameError::CommandTooShort { declared: 4 });
    }

    #[test]
    fn unknown_command_type_stops_packet_parsing_but_keeps_prior_commands() {
        let mut data = packet_header(2);
        data.extend(command_header(
            command_type::DISCONNECT,
            COMMAND_HEADER_LEN as u32,
            1,
        ));
        data.extend(command_header(200, COMMAND_HEADER_LEN as u32, 2));

        let packet = parse_packet(&data).unwrap();
        assert_eq!(packet.commands.len(), 1);
        assert_eq!(packet.command_count, 2);
    }

    #[test]
    fn operation_request_round_trips_through_parameters() {
        let mut body = vec![0u8]; // reserved
        body.push(message_type::OPERATION_REQUEST);
        body.push(5); // operation code
        body.extend(1u16.to_be_bytes()); // one parameter
        body.push(0); // key
        body.push(crate::value::type_code::BYTE);
        body.push(9);

        let mut data = packet_header(1);
        data.extend(command_header(
            command_type::RELIABLE,
            (COMMAND_HEADER_LEN + body.len()) as u32,
            1,
        ));
        data.extend(body);

        let packet = parse_packet(&data).unwrap();
        match &packet.commands[0].message {
            Some(Message::Request(r)) => {
                assert_eq!(r.operation_code, 5);
                assert_eq!(r.parameters.get(&0), Some(&Value::Byte(9)));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn event_code_three_gets_position_patch_through_full_parse() {
        let mut bytes = vec![0u8; 17];
        bytes[9..13].copy_from_slice(&1.0f32.to_le_bytes());
        bytes[13..17].copy_from_slice(&2.0f32.to_le_bytes());

        let mut body = vec![0u8]; // reserved
        body.push(message_type::EVENT);
        body.push(3); // move event code
        body.extend(1u16.to_be_bytes()); // one parameter: key 1, byte array
        body.push(1);
        body.push(crate::value::type_code::BYTE_ARRAY);
        body.extend((bytes.len() as u32).to_be_bytes());
        body.extend(bytes);

        let mut data = packet_header(1);
        data.extend(command_header(
            command_type::RELIABLE,
            (COMMAND_HEADER_LEN + body.len()) as u32,
            1,
        ));
        data.extend(body);

        let packet = parse_packet(&data).unwrap();
        match &packet.commands[0].message {
            Some(Message::Event(e)) => {
                let params: &ParameterTable = &e.parameters;
                assert_eq!(params.get(&4), Some(&Value::Float(1.0)));
                assert_eq!(params.get(&5), Some(&Value::Float(2.0)));
                assert_eq!(params.get(&252), Some(&Value::Byte(3)));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
