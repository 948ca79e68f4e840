//! Manager stream framing and packet classification

use crate::{
    constants::{BANNER_PREFIX, MAX_BUFFER_SIZE, MAX_PACKET_SIZE},
    error::{AmiError, AmiResult},
    packet::Packet,
};
use tracing::trace;

/// Kind of an incoming packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Synchronous reply to an action (`Response:` field)
    Response,
    /// Asynchronous notification (`Event:` field)
    Event,
    /// Neither field present
    Unknown,
}

impl PacketKind {
    /// Classify a decoded packet. `Response` wins if both fields are present.
    pub fn classify(packet: &Packet) -> Self {
        if packet
            .response()
            .is_some()
        {
            PacketKind::Response
        } else if packet
            .event()
            .is_some()
        {
            PacketKind::Event
        } else {
            PacketKind::Unknown
        }
    }
}

/// Incremental packet parser.
///
/// Bytes from the transport are appended with [`add_data`](Self::add_data);
/// [`parse_packet`](Self::parse_packet) yields one packet each time a blank
/// line terminator is buffered.
pub struct PacketParser {
    buffer: Vec<u8>,
}

/// Offset just past the blank line that ends the first packet in `buf`.
fn find_packet_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (i, &b) in buf
        .iter()
        .enumerate()
    {
        if b == b'\n' {
            let line = &buf[line_start..i];
            if line.is_empty() || line == b"\r" {
                return Some(i + 1);
            }
            line_start = i + 1;
        }
    }
    None
}

impl PacketParser {
    /// Create new parser
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Add data to the parser buffer
    pub fn add_data(&mut self, data: &[u8]) -> AmiResult<()> {
        self.buffer
            .extend_from_slice(data);
        if self
            .buffer
            .len()
            > MAX_BUFFER_SIZE
        {
            return Err(AmiError::protocol_error(format!(
                "Buffer size {} exceeds limit {}",
                self.buffer
                    .len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Number of buffered, not yet parsed bytes.
    pub fn buffered(&self) -> usize {
        self.buffer
            .len()
    }

    /// Drop blank lines sitting between packets, and the one-line
    /// `Asterisk Call Manager/x.y` greeting if it is still in the stream.
    fn skip_blank_lines(&mut self) {
        loop {
            if self
                .buffer
                .starts_with(BANNER_PREFIX.as_bytes())
            {
                let Some(nl) = self
                    .buffer
                    .iter()
                    .position(|&b| b == b'\n')
                else {
                    return;
                };
                trace!("[PARSE] Skipping manager banner");
                self.buffer
                    .drain(..=nl);
            } else if self
                .buffer
                .starts_with(b"\n")
            {
                self.buffer
                    .drain(..1);
            } else if self
                .buffer
                .starts_with(b"\r\n")
            {
                self.buffer
                    .drain(..2);
            } else {
                return;
            }
        }
    }

    /// Try to parse a complete packet from the buffer.
    ///
    /// Returns `Ok(None)` until a full packet is buffered. A packet that fails
    /// to decode is still consumed, so the next call starts at the following
    /// packet.
    pub fn parse_packet(&mut self) -> AmiResult<Option<Packet>> {
        self.skip_blank_lines();

        let Some(end) = find_packet_end(&self.buffer) else {
            if self
                .buffer
                .len()
                > MAX_PACKET_SIZE
            {
                return Err(AmiError::protocol_error(format!(
                    "Packet exceeds {} bytes without a terminator",
                    MAX_PACKET_SIZE
                )));
            }
            return Ok(None);
        };

        let raw: Vec<u8> = self
            .buffer
            .drain(..end)
            .collect();
        let text = String::from_utf8(raw)
            .map_err(|_| AmiError::protocol_error("Invalid UTF-8 in packet"))?;

        let packet = Packet::decode(&text)?;
        trace!("[PARSE] Decoded packet with {} fields", packet.len());
        Ok(Some(packet))
    }
}

impl Default for PacketParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"Response: Success\r\nActionID: 1\r\nMessage: Context created\r\n\r\n")
            .unwrap();
        let packet = parser
            .parse_packet()
            .unwrap()
            .unwrap();

        assert_eq!(PacketKind::classify(&packet), PacketKind::Response);
        assert_eq!(packet.response(), Some("Success"));
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_incomplete_packet() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"Event: ExtensionInfo\r\nExten: 10")
            .unwrap();
        assert!(parser
            .parse_packet()
            .unwrap()
            .is_none());

        parser
            .add_data(b"0\r\n\r\n")
            .unwrap();
        let packet = parser
            .parse_packet()
            .unwrap()
            .unwrap();
        assert_eq!(packet.get("Exten"), Some("100"));
    }

    #[test]
    fn test_split_terminator() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"Event: ContextDumpComplete\r\n\r")
            .unwrap();
        assert!(parser
            .parse_packet()
            .unwrap()
            .is_none());
        parser
            .add_data(b"\n")
            .unwrap();
        assert!(parser
            .parse_packet()
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_multiple_packets_in_one_read() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"Event: ExtensionInfo\nExten: 100\n\nEvent: ContextDumpComplete\n\n")
            .unwrap();

        let first = parser
            .parse_packet()
            .unwrap()
            .unwrap();
        let second = parser
            .parse_packet()
            .unwrap()
            .unwrap();
        assert!(first.is_event("ExtensionInfo"));
        assert!(second.is_event("ContextDumpComplete"));
        assert!(parser
            .parse_packet()
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_leading_blank_lines_skipped() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"\r\n\r\nResponse: Success\r\n\r\n")
            .unwrap();
        let packet = parser
            .parse_packet()
            .unwrap()
            .unwrap();
        assert_eq!(packet.response(), Some("Success"));
    }

    #[test]
    fn test_malformed_packet_consumed() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"Event: Bogus\r\nno separator here\r\n\r\nEvent: ContextDumpComplete\r\n\r\n")
            .unwrap();

        let err = parser
            .parse_packet()
            .unwrap_err();
        assert!(matches!(err, AmiError::MalformedPacket { .. }));

        let next = parser
            .parse_packet()
            .unwrap()
            .unwrap();
        assert!(next.is_event("ContextDumpComplete"));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"Event: \xff\xfe\r\n\r\n")
            .unwrap();
        assert!(matches!(
            parser.parse_packet(),
            Err(AmiError::Protocol { .. })
        ));
    }

    #[test]
    fn test_banner_skipped() {
        let mut parser = PacketParser::new();
        parser
            .add_data(b"Asterisk Call Manager/1.1\r\nResponse: Success\r\nMessage: Authentication accepted\r\n\r\n")
            .unwrap();
        let packet = parser
            .parse_packet()
            .unwrap()
            .unwrap();
        assert_eq!(packet.message(), Some("Authentication accepted"));
    }

    #[test]
    fn test_classify_unknown() {
        let packet = Packet::new().with("Ping", "Pong");
        assert_eq!(PacketKind::classify(&packet), PacketKind::Unknown);
        let event = Packet::new().with("Event", "ExtensionInfo");
        assert_eq!(PacketKind::classify(&event), PacketKind::Event);
    }
}
