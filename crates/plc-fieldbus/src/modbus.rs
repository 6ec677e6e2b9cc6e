//! Modbus/TCP server engine.
//!
//! Frames one Application Data Unit (ADU) at a time over a connected
//! socket: a 7-byte MBAP header followed by a PDU, dispatches the PDU
//! against a [`MemorySpace`], and writes back an MBAP-framed response PDU
//! or exception. The session terminates on EOF or any I/O error; it never
//! propagates a client-caused protocol error back up as a session failure.

use crate::FieldbusModule;
use plc_common::diagnostics::Counters;
use plc_common::error::{PlcError, PlcResult};
use plc_common::section::Section;
use plc_memory::MemorySpace;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use tracing::trace;

/// Modbus function codes this engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteSingleRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }
}

/// Modbus exception codes this engine raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
}

const MAX_COIL_READ: u16 = 2000;
const MAX_REGISTER_READ: u16 = 125;
const MAX_COIL_WRITE: u16 = 1968;
const MAX_REGISTER_WRITE: u16 = 123;

/// Modbus TCP Application Protocol header: transaction id, protocol id
/// (always 0 on the wire), length, unit id.
#[derive(Debug, Clone, Copy)]
struct MbapHeader {
    transaction_id: u16,
    length: u16,
    unit_id: u8,
}

impl MbapHeader {
    const SIZE: usize = 7;

    fn from_bytes(bytes: &[u8; Self::SIZE]) -> PlcResult<Self> {
        let protocol_id = u16::from_be_bytes([bytes[2], bytes[3]]);
        if protocol_id != 0 {
            return Err(PlcError::Protocol(format!(
                "unsupported MBAP protocol id {protocol_id}"
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        })
    }

    fn response_prefix(self, pdu_len: usize) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        out[4..6].copy_from_slice(&((pdu_len + 1) as u16).to_be_bytes());
        out[6] = self.unit_id;
        out
    }
}

fn exception_response(func_byte: u8, exception: ExceptionCode) -> Vec<u8> {
    vec![func_byte | 0x80, exception as u8]
}

fn read_bits(pdu: &[u8], func_byte: u8, memory: &MemorySpace) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let qty = u16::from_be_bytes([pdu[3], pdu[4]]);
    if qty == 0 || qty > MAX_COIL_READ {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    match memory.get_bits(u32::from(addr), u32::from(qty)) {
        Ok(bits) => {
            let byte_count = (qty as usize).div_ceil(8);
            let mut packed = vec![0u8; byte_count];
            for (i, &bit) in bits.iter().enumerate() {
                if bit != 0 {
                    packed[i / 8] |= 1 << (i % 8);
                }
            }
            let mut out = Vec::with_capacity(2 + byte_count);
            out.push(func_byte);
            out.push(byte_count as u8);
            out.extend_from_slice(&packed);
            out
        }
        Err(PlcError::OutOfBounds { .. }) => {
            exception_response(func_byte, ExceptionCode::IllegalDataAddress)
        }
        Err(_) => exception_response(func_byte, ExceptionCode::IllegalDataAddress),
    }
}

fn read_registers(pdu: &[u8], func_byte: u8, memory: &MemorySpace) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let qty = u16::from_be_bytes([pdu[3], pdu[4]]);
    if qty == 0 || qty > MAX_REGISTER_READ {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    match memory.get_words(Section::Words16, u32::from(addr), u32::from(qty)) {
        Ok(values) => {
            let mut out = Vec::with_capacity(2 + values.len() * 2);
            out.push(func_byte);
            out.push((values.len() * 2) as u8);
            for v in values {
                out.extend_from_slice(&(v as u16).to_be_bytes());
            }
            out
        }
        Err(_) => exception_response(func_byte, ExceptionCode::IllegalDataAddress),
    }
}

fn write_single_coil(pdu: &[u8], func_byte: u8, memory: &MemorySpace) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let value = u16::from_be_bytes([pdu[3], pdu[4]]);
    let bit = match value {
        0xFF00 => 1u8,
        0x0000 => 0u8,
        _ => return exception_response(func_byte, ExceptionCode::IllegalDataValue),
    };
    match memory.set_bits(u32::from(addr), &[bit]) {
        Ok(()) => pdu[..5].to_vec(),
        Err(_) => exception_response(func_byte, ExceptionCode::IllegalDataAddress),
    }
}

fn write_single_register(pdu: &[u8], func_byte: u8, memory: &MemorySpace) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let value = u16::from_be_bytes([pdu[3], pdu[4]]);
    match memory.set_words(Section::Words16, u32::from(addr), &[u64::from(value)]) {
        Ok(()) => pdu[..5].to_vec(),
        Err(_) => exception_response(func_byte, ExceptionCode::IllegalDataAddress),
    }
}

fn write_multiple_coils(pdu: &[u8], func_byte: u8, memory: &MemorySpace) -> Vec<u8> {
    if pdu.len() < 6 {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let qty = u16::from_be_bytes([pdu[3], pdu[4]]);
    let byte_count = pdu[5] as usize;
    if qty == 0 || qty > MAX_COIL_WRITE {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let expected_bytes = (qty as usize).div_ceil(8);
    if byte_count != expected_bytes || pdu.len() < 6 + byte_count {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let data = &pdu[6..6 + byte_count];
    let bits: Vec<u8> = (0..qty as usize)
        .map(|i| (data[i / 8] >> (i % 8)) & 1)
        .collect();
    match memory.set_bits(u32::from(addr), &bits) {
        Ok(()) => pdu[..5].to_vec(),
        Err(_) => exception_response(func_byte, ExceptionCode::IllegalDataAddress),
    }
}

fn write_multiple_registers(pdu: &[u8], func_byte: u8, memory: &MemorySpace) -> Vec<u8> {
    if pdu.len() < 6 {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let qty = u16::from_be_bytes([pdu[3], pdu[4]]);
    let byte_count = pdu[5] as usize;
    if qty == 0 || qty > MAX_REGISTER_WRITE {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let expected_bytes = qty as usize * 2;
    if byte_count != expected_bytes || pdu.len() < 6 + byte_count {
        return exception_response(func_byte, ExceptionCode::IllegalDataValue);
    }
    let values: Vec<u64> = pdu[6..6 + byte_count]
        .chunks_exact(2)
        .map(|c| u64::from(u16::from_be_bytes([c[0], c[1]])))
        .collect();
    match memory.set_words(Section::Words16, u32::from(addr), &values) {
        Ok(()) => pdu[..5].to_vec(),
        Err(_) => exception_response(func_byte, ExceptionCode::IllegalDataAddress),
    }
}

fn dispatch(pdu: &[u8], memory: &MemorySpace) -> Vec<u8> {
    let Some(&func_byte) = pdu.first() else {
        return exception_response(0, ExceptionCode::IllegalFunction);
    };
    let Some(function) = FunctionCode::from_byte(func_byte) else {
        return exception_response(func_byte, ExceptionCode::IllegalFunction);
    };
    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            read_bits(pdu, func_byte, memory)
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            read_registers(pdu, func_byte, memory)
        }
        FunctionCode::WriteSingleCoil => write_single_coil(pdu, func_byte, memory),
        FunctionCode::WriteSingleRegister => write_single_register(pdu, func_byte, memory),
        FunctionCode::WriteMultipleCoils => write_multiple_coils(pdu, func_byte, memory),
        FunctionCode::WriteMultipleRegisters => write_multiple_registers(pdu, func_byte, memory),
    }
}

/// Serve Modbus/TCP requests on an already-accepted connection until the
/// peer closes it or an I/O error occurs.
///
/// # Errors
///
/// Returns [`PlcError::Transport`] on a socket error other than a clean
/// EOF, and [`PlcError::Protocol`] if the MBAP header names an
/// unsupported protocol id. A bad function code, out-of-bounds address,
/// or malformed PDU is never an error here — it is mapped to a Modbus
/// exception response and the session continues.
pub fn serve_connection(
    mut socket: TcpStream,
    memory: &MemorySpace,
    counters: &Counters,
) -> PlcResult<()> {
    socket
        .set_nodelay(true)
        .map_err(|e| PlcError::Transport(e.to_string()))?;
    loop {
        let mut header_buf = [0u8; MbapHeader::SIZE];
        match socket.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(PlcError::Transport(e.to_string())),
        }
        let header = MbapHeader::from_bytes(&header_buf)?;
        if header.length == 0 {
            return Ok(());
        }
        let pdu_len = header.length as usize - 1;
        let mut pdu = vec![0u8; pdu_len];
        match socket.read_exact(&mut pdu) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(PlcError::Transport(e.to_string())),
        }

        trace!(transaction_id = header.transaction_id, pdu_len, "handling modbus request");
        let response_pdu = dispatch(&pdu, memory);
        if response_pdu.first().is_some_and(|&b| b & 0x80 != 0) {
            counters.record_exception();
        } else {
            counters.record_request();
        }
        let mut frame = Vec::with_capacity(MbapHeader::SIZE + response_pdu.len());
        frame.extend_from_slice(&header.response_prefix(response_pdu.len()));
        frame.extend_from_slice(&response_pdu);
        socket
            .write_all(&frame)
            .map_err(|e| PlcError::Transport(e.to_string()))?;
    }
}

/// The Modbus/TCP fieldbus module, registered under the class name
/// `"modbus_tcp"`.
#[derive(Debug, Default)]
pub struct ModbusTcpModule;

impl FieldbusModule for ModbusTcpModule {
    fn serve(&self, socket: TcpStream, memory: Arc<MemorySpace>, counters: &Counters) -> PlcResult<()> {
        serve_connection(socket, &memory, counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plc_memory::MemSpaceConfig;

    fn space() -> MemorySpace {
        MemorySpace::new(MemSpaceConfig {
            blen: 64,
            w16len: 64,
            w32len: 0,
            w64len: 0,
        })
    }

    #[test]
    fn coil_write_then_read_round_trips() {
        let mem = space();
        let write_pdu = [0x05, 0x00, 0x03, 0xFF, 0x00];
        let resp = dispatch(&write_pdu, &mem);
        assert_eq!(resp, write_pdu);

        let read_pdu = [0x01, 0x00, 0x00, 0x00, 0x08];
        let resp = dispatch(&read_pdu, &mem);
        assert_eq!(resp, vec![0x01, 0x01, 0x08]);
    }

    #[test]
    fn register_write_multiple_then_read_round_trips() {
        let mem = space();
        let write_pdu = [
            0x10, 0x00, 0x00, 0x00, 0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03,
        ];
        let resp = dispatch(&write_pdu, &mem);
        assert_eq!(resp, vec![0x10, 0x00, 0x00, 0x00, 0x03]);

        let read_pdu = [0x03, 0x00, 0x00, 0x00, 0x03];
        let resp = dispatch(&read_pdu, &mem);
        assert_eq!(
            resp,
            vec![0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03]
        );
    }

    #[test]
    fn out_of_bounds_read_is_illegal_data_address() {
        let mem = MemorySpace::new(MemSpaceConfig {
            blen: 0,
            w16len: 16,
            w32len: 0,
            w64len: 0,
        });
        let pdu = [0x03, 0x00, 0x0F, 0x00, 0x05];
        let resp = dispatch(&pdu, &mem);
        assert_eq!(resp, vec![0x83, 0x02]);
    }

    #[test]
    fn unknown_function_is_illegal_function() {
        let mem = space();
        let pdu = [0x42, 0x00, 0x00, 0x00, 0x01];
        let resp = dispatch(&pdu, &mem);
        assert_eq!(resp, vec![0xC2, 0x01]);
    }

    #[test]
    fn zero_quantity_read_is_illegal_data_value() {
        let mem = space();
        let pdu = [0x03, 0x00, 0x00, 0x00, 0x00];
        let resp = dispatch(&pdu, &mem);
        assert_eq!(resp, vec![0x83, 0x03]);
    }

    #[test]
    fn write_multiple_byte_count_mismatch_is_illegal_data_value() {
        let mem = space();
        let pdu = [0x10, 0x00, 0x00, 0x00, 0x01, 0x04, 0x00, 0x01];
        let resp = dispatch(&pdu, &mem);
        assert_eq!(resp, vec![0x90, 0x03]);
    }

    #[test]
    fn mbap_header_round_trips_transaction_id() {
        let bytes = [0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x01];
        let header = MbapHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.transaction_id, 0x1234);
        assert_eq!(header.length, 6);
        assert_eq!(header.unit_id, 1);
        let response = header.response_prefix(2);
        assert_eq!(&response[0..2], &[0x12, 0x34]);
        assert_eq!(&response[4..6], &[0x00, 0x03]);
    }
}
