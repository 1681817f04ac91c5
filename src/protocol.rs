//! The 16-byte binary header every Jeux packet starts with, and the
//! blocking framing used to send and receive one over a `TcpStream`.
//!
//! ```text
//!  0        1        2        3        4        5        6        7
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! |  type  |   id   |  role  |  pad   |         size (u16, BE)  |  pad    |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! |                  timestamp_sec (u32, BE)                             |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! |                  timestamp_nsec (u32, BE)                            |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//! followed by exactly `size` bytes of payload, with no delimiter.

use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::time::Instant;

const HEADER_LEN: usize = 16;

static CLOCK_START: OnceLock<Instant> = OnceLock::new();

/// Seconds and nanoseconds since an arbitrary but fixed point in this
/// process's lifetime — the same monotonic-clock contract a `CLOCK_MONOTONIC`
/// timestamp makes, without claiming to mean wall-clock time.
pub fn monotonic_timestamp() -> (u32, u32) {
    let start = CLOCK_START.get_or_init(Instant::now);
    let elapsed = start.elapsed();
    (elapsed.as_secs() as u32, elapsed.subsec_nanos())
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Login = 1,
    Users = 2,
    Invite = 3,
    Revoke = 4,
    Accept = 5,
    Decline = 6,
    Move = 7,
    Resign = 8,
    Ack = 9,
    Nack = 10,
    Invited = 11,
    Revoked = 12,
    Accepted = 13,
    Declined = 14,
    Moved = 15,
    Resigned = 16,
    Ended = 17,
}

impl TryFrom<u8> for PacketType {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PacketType::*;
        Ok(match value {
            1 => Login,
            2 => Users,
            3 => Invite,
            4 => Revoke,
            5 => Accept,
            6 => Decline,
            7 => Move,
            8 => Resign,
            9 => Ack,
            10 => Nack,
            11 => Invited,
            12 => Revoked,
            13 => Accepted,
            14 => Declined,
            15 => Moved,
            16 => Resigned,
            17 => Ended,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrecognized packet type {other}"),
                ))
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub id: u8,
    pub role: u8,
    pub size: u16,
    pub timestamp_sec: u32,
    pub timestamp_nsec: u32,
}

impl PacketHeader {
    /// Builds a header stamped with the current monotonic time, leaving
    /// `size` to be filled in by [`send_packet`] from the payload it's given.
    pub fn new(packet_type: PacketType, id: u8, role: u8) -> PacketHeader {
        let (sec, nsec) = monotonic_timestamp();
        PacketHeader {
            packet_type,
            id,
            role,
            size: 0,
            timestamp_sec: sec,
            timestamp_nsec: nsec,
        }
    }

    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.packet_type as u8;
        buf[1] = self.id;
        buf[2] = self.role;
        buf[3] = 0;
        buf[4..6].copy_from_slice(&self.size.to_be_bytes());
        buf[6..8].copy_from_slice(&[0, 0]);
        buf[8..12].copy_from_slice(&self.timestamp_sec.to_be_bytes());
        buf[12..16].copy_from_slice(&self.timestamp_nsec.to_be_bytes());
        buf
    }

    fn decode(buf: &[u8; HEADER_LEN]) -> io::Result<PacketHeader> {
        let packet_type = PacketType::try_from(buf[0])?;
        let id = buf[1];
        let role = buf[2];
        let size = u16::from_be_bytes([buf[4], buf[5]]);
        let timestamp_sec = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let timestamp_nsec = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        Ok(PacketHeader {
            packet_type,
            id,
            role,
            size,
            timestamp_sec,
            timestamp_nsec,
        })
    }
}

/// Writes a header and its payload in full, blocking until every byte is on
/// the wire. `Write::write_all` already loops until the buffer is exhausted
/// and turns a zero-length write into an error, which is exactly the
/// framing contract this protocol needs.
pub fn send_packet<W: Write>(writer: &mut W, mut header: PacketHeader, payload: &[u8]) -> io::Result<()> {
    header.size = payload
        .len()
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large for a u16 size field"))?;
    writer.write_all(&header.encode())?;
    if !payload.is_empty() {
        writer.write_all(payload)?;
    }
    writer.flush()
}

/// Reads one full packet, blocking until the header and its payload have
/// both arrived. `Read::read_exact` surfaces a short read or EOF as
/// `UnexpectedEof`, which the caller treats the same as any other
/// disconnect.
pub fn recv_packet<R: Read>(reader: &mut R) -> io::Result<(PacketHeader, Vec<u8>)> {
    let mut buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut buf)?;
    let header = PacketHeader::decode(&buf)?;
    let mut payload = vec![0u8; header.size as usize];
    if !payload.is_empty() {
        reader.read_exact(&mut payload)?;
    }
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_packet_with_payload() {
        let header = PacketHeader::new(PacketType::Invited, 3, 2);
        let mut buf = Vec::new();
        send_packet(&mut buf, header, b"alice").unwrap();

        let mut cursor = Cursor::new(buf);
        let (decoded, payload) = recv_packet(&mut cursor).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Invited);
        assert_eq!(decoded.id, 3);
        assert_eq!(decoded.role, 2);
        assert_eq!(decoded.size, 5);
        assert_eq!(payload, b"alice");
    }

    #[test]
    fn round_trips_a_packet_with_no_payload() {
        let header = PacketHeader::new(PacketType::Ack, 0, 0);
        let mut buf = Vec::new();
        send_packet(&mut buf, header, &[]).unwrap();

        let mut cursor = Cursor::new(buf);
        let (decoded, payload) = recv_packet(&mut cursor).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Ack);
        assert_eq!(decoded.size, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn truncated_header_is_unexpected_eof() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let err = recv_packet(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn unrecognized_type_byte_is_rejected() {
        let mut cursor = Cursor::new(vec![0u8; HEADER_LEN]);
        let err = recv_packet(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
