//! Служебные sub-packet: ошибки, батарея, акселерометр, DRL/REF.

use byteorder::{BigEndian, ByteOrder};

use bcistream_types::{
    BatteryStatus, ProtocolError, ProtocolResult, SubPacketDescriptor, SubPacketKind, Telemetry,
    DROPPED_FLAG,
};

use crate::{
    bits::BitCursor,
    framer::{ACCELEROMETER_LEN, BATTERY_LEN, DRL_REF_LEN, ERROR_LEN},
};

fn require(
    bytes: &[u8],
    len: usize,
) -> ProtocolResult<()> {
    if bytes.len() < len {
        return Err(ProtocolError::truncated_bytes(len, bytes.len()));
    }
    Ok(())
}

/// Флаги ошибок: big-endian u32 в байтах 1-4.
pub fn decode_error(bytes: &[u8]) -> ProtocolResult<u32> {
    require(bytes, ERROR_LEN)?;
    Ok(BigEndian::read_u32(&bytes[1..5]))
}

/// Батарея: четыре big-endian u16 в байтах 1-8.
pub fn decode_battery(bytes: &[u8]) -> ProtocolResult<BatteryStatus> {
    require(bytes, BATTERY_LEN)?;
    Ok(BatteryStatus {
        charge_raw: BigEndian::read_u16(&bytes[1..3]),
        fuel_gauge_mv: BigEndian::read_u16(&bytes[3..5]),
        adc_mv: BigEndian::read_u16(&bytes[5..7]),
        temperature_c: BigEndian::read_i16(&bytes[7..9]),
    })
}

/// Акселерометр: 3 × 10 бит в байтах 1-4, затем (с флагом) счётчик
/// пропущенных сэмплов.
pub fn decode_accelerometer(bytes: &[u8]) -> ProtocolResult<([i32; 3], Option<u16>)> {
    require(bytes, ACCELEROMETER_LEN)?;

    let mut cursor = BitCursor::new(&bytes[1..ACCELEROMETER_LEN]);
    let mut axes = [0i32; 3];
    for axis in axes.iter_mut() {
        *axis = cursor.read_bits(10)? as i32;
    }

    let dropped = if bytes[0] & DROPPED_FLAG != 0 {
        require(bytes, ACCELEROMETER_LEN + 2)?;
        Some(BigEndian::read_u16(&bytes[5..7]))
    } else {
        None
    };

    Ok((axes, dropped))
}

/// DRL/REF: 2 × 10 бит в байтах 1-3.
pub fn decode_drl_ref(bytes: &[u8]) -> ProtocolResult<(i32, i32)> {
    require(bytes, DRL_REF_LEN)?;
    let mut cursor = BitCursor::new(&bytes[1..DRL_REF_LEN]);
    let drl = cursor.read_bits(10)? as i32;
    let reference = cursor.read_bits(10)? as i32;
    Ok((drl, reference))
}

/// Декодирует служебный sub-packet.
///
/// Возвращает телеметрию (если тип её несёт) и счётчик пропущенных
/// гарнитурой сэмплов. Sync и EEG дают `(None, None)`.
pub fn decode_telemetry(
    desc: &SubPacketDescriptor,
    bytes: &[u8],
) -> ProtocolResult<(Option<Telemetry>, Option<u16>)> {
    let out = match desc.kind {
        SubPacketKind::Error => (Some(Telemetry::ErrorFlags(decode_error(bytes)?)), None),
        SubPacketKind::Battery => (Some(Telemetry::Battery(decode_battery(bytes)?)), None),
        SubPacketKind::Accelerometer => {
            let (axes, dropped) = decode_accelerometer(bytes)?;
            (Some(Telemetry::Accelerometer(axes)), dropped)
        }
        SubPacketKind::DrlRef => {
            let (drl, reference) = decode_drl_ref(bytes)?;
            (Some(Telemetry::DrlRef { drl, reference }), None)
        }
        SubPacketKind::Sync | SubPacketKind::CompressedEeg | SubPacketKind::UncompressedEeg => {
            (None, None)
        }
    };
    Ok(out)
}
