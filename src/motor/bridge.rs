// Motor bridge serial protocol
//
// The bridge board owns the H-bridge and the encoder inputs. The host sends
// drive commands; the bridge streams one frame per rising edge of encoder
// channel A carrying the level of channel B.
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::driver::{DriveCommand, Side};
use super::encoder::TickCounter;

/// Default serial configuration for the bridge
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Broadcast ID, addresses both wheels
pub const BROADCAST_ID: u8 = 0xFE;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Drive = 0x10,
    Stop = 0x11,
    Edge = 0x20,
}

impl TryFrom<u8> for Instruction {
    type Error = BridgeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x10 => Ok(Self::Drive),
            0x11 => Ok(Self::Stop),
            0x20 => Ok(Self::Edge),
            other => Err(BridgeError::UnknownInstruction(other)),
        }
    }
}

/// Error types for bridge communication
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame from wheel {id}: {reason}")]
    InvalidFrame { id: u8, reason: String },

    #[error("Checksum mismatch for wheel {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Unknown instruction 0x{0:02X}")]
    UnknownInstruction(u8),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// A decoded packet
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: u8,
    pub instruction: Instruction,
    pub params: Vec<u8>,
}

/// Wheel ID on the bridge
pub fn wheel_id(side: Side) -> u8 {
    match side {
        Side::Left => 1,
        Side::Right => 2,
    }
}

/// Calculate checksum for a packet (excluding header)
fn checksum(data: &[u8]) -> u8 {
    let sum: u16 = data.iter().map(|&b| b as u16).sum();
    (!sum & 0xFF) as u8
}

/// Build a packet with header and checksum
pub fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8; // instruction + params + checksum
    let mut packet = Vec::with_capacity(6 + params.len());

    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(length);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);

    // Checksum over id, length, instruction, params
    let checksum_data = &packet[2..];
    packet.push(checksum(checksum_data));

    packet
}

fn read_u8<R: Read + ?Sized>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// Read one frame, skipping bytes until a header is found
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Frame> {
    let mut previous = 0u8;
    loop {
        let byte = read_u8(reader)?;
        if previous == HEADER[0] && byte == HEADER[1] {
            break;
        }
        previous = byte;
    }

    // IDs are never 0xFF, extra header bytes are line noise
    let mut id = read_u8(reader)?;
    while id == HEADER[0] {
        id = read_u8(reader)?;
    }
    let length = read_u8(reader)? as usize;

    if length < 2 {
        return Err(BridgeError::InvalidFrame {
            id,
            reason: format!("Length {} too short", length),
        });
    }

    // instruction + params + checksum
    let mut remaining = vec![0u8; length];
    reader.read_exact(&mut remaining)?;

    let mut checksum_data = vec![id, length as u8];
    checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
    if checksum(&checksum_data) != remaining[remaining.len() - 1] {
        return Err(BridgeError::ChecksumMismatch { id });
    }

    Ok(Frame {
        id,
        instruction: Instruction::try_from(remaining[0])?,
        params: remaining[1..remaining.len() - 1].to_vec(),
    })
}

/// Motor bridge - handles the host side of the serial link
pub struct MotorBridge {
    port: Box<dyn SerialPort>,
}

impl MotorBridge {
    /// Open a new connection to the bridge
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Send a drive command to one wheel
    pub fn drive(&mut self, side: Side, command: DriveCommand) -> Result<()> {
        let id = wheel_id(side);
        let params = [command.direction as u8, command.duty];
        debug!("Drive wheel {}: {:?}", id, command);
        self.send_packet(&build_packet(id, Instruction::Drive, &params))
    }

    /// Stop both wheels with a single broadcast
    pub fn stop_all(&mut self) -> Result<()> {
        self.send_packet(&build_packet(BROADCAST_ID, Instruction::Stop, &[]))
    }

    /// Start the encoder edge reader on a second handle to the same port
    ///
    /// This thread is the asynchronous tick source: it only ever records
    /// edges into the counters, and marks both faulted if it stops.
    pub fn spawn_edge_reader(
        &self,
        left: Arc<TickCounter>,
        right: Arc<TickCounter>,
    ) -> Result<JoinHandle<()>> {
        let mut port = self.port.try_clone()?;
        let handle = thread::Builder::new()
            .name("encoder-edges".into())
            .spawn(move || edge_reader_loop(&mut *port, &left, &right))?;
        Ok(handle)
    }
}

fn edge_reader_loop<R: Read + ?Sized>(port: &mut R, left: &TickCounter, right: &TickCounter) {
    loop {
        match read_frame(port) {
            Ok(frame) => dispatch_edge(&frame, left, right),
            Err(BridgeError::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e @ (BridgeError::ChecksumMismatch { .. }
            | BridgeError::InvalidFrame { .. }
            | BridgeError::UnknownInstruction(_))) => {
                warn!("Dropping bridge frame: {}", e);
            }
            Err(e) => {
                error!("Encoder edge reader stopped: {}", e);
                left.mark_faulted();
                right.mark_faulted();
                return;
            }
        }
    }
}

/// Feed one decoded frame into the matching counter
pub fn dispatch_edge(frame: &Frame, left: &TickCounter, right: &TickCounter) {
    if frame.instruction != Instruction::Edge {
        debug!("Ignoring {:?} frame from bridge", frame.instruction);
        return;
    }
    let Some(&phase_b) = frame.params.first() else {
        warn!("Edge frame from wheel {} without phase", frame.id);
        return;
    };

    match frame.id {
        id if id == wheel_id(Side::Left) => left.record_edge(phase_b != 0),
        id if id == wheel_id(Side::Right) => right.record_edge(phase_b != 0),
        id => warn!("Edge frame from unknown wheel {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_checksum() {
        // ~(1+4+0x10+1+50) = ~72 = 183
        let data = [1u8, 4, 0x10, 1, 50];
        assert_eq!(checksum(&data), 183);
    }

    #[test]
    fn test_build_packet() {
        let packet = build_packet(BROADCAST_ID, Instruction::Stop, &[]);
        // Header (2) + ID (1) + Length (1) + Instruction (1) + Checksum (1) = 6 bytes
        assert_eq!(packet.len(), 6);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], BROADCAST_ID);
        assert_eq!(packet[3], 2);
        assert_eq!(packet[4], 0x11);
    }

    #[test]
    fn test_read_frame_skips_noise() {
        let mut bytes = vec![0x00, 0x42, 0xFF];
        bytes.extend(build_packet(2, Instruction::Edge, &[1]));
        let frame = read_frame(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(
            frame,
            Frame {
                id: 2,
                instruction: Instruction::Edge,
                params: vec![1],
            }
        );
    }

    #[test]
    fn test_read_frame_rejects_bad_checksum() {
        let mut bytes = build_packet(1, Instruction::Edge, &[0]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            read_frame(&mut Cursor::new(bytes)),
            Err(BridgeError::ChecksumMismatch { id: 1 })
        ));
    }

    #[test]
    fn test_edges_reach_counters() {
        let left = TickCounter::new();
        let right = TickCounter::new();
        let mut stream = Vec::new();
        stream.extend(build_packet(1, Instruction::Edge, &[1]));
        stream.extend(build_packet(1, Instruction::Edge, &[1]));
        stream.extend(build_packet(2, Instruction::Edge, &[0]));
        let mut cursor = Cursor::new(stream);

        for _ in 0..3 {
            let frame = read_frame(&mut cursor).unwrap();
            dispatch_edge(&frame, &left, &right);
        }

        assert_eq!(left.take(), 2);
        assert_eq!(right.take(), -1);
    }

    #[test]
    fn test_reader_exit_marks_counters_faulted() {
        let left = TickCounter::new();
        let right = TickCounter::new();
        let mut stream = vec![0x00];
        stream.extend(build_packet(1, Instruction::Edge, &[1]));
        stream.extend(build_packet(9, Instruction::Edge, &[1]));

        // End of stream stands in for an unplugged port
        edge_reader_loop(&mut Cursor::new(stream), &left, &right);

        assert_eq!(left.take(), 1);
        assert_eq!(right.take(), 0);
        assert!(left.is_faulted());
        assert!(right.is_faulted());
    }
}
