//! Несжатый сэмпл EEG (sub-packet 0xE).
//!
//! ```text
//! byte 0     тип/флаг
//! bytes 1-5  4 × 10 бит, MSB-first: ch0 ch1 ch2 ch3
//! bytes 6-7  big-endian счётчик пропущенных сэмплов (только с флагом 0x08)
//! ```

use byteorder::{BigEndian, ByteOrder};

use bcistream_types::{
    ProtocolError, ProtocolResult, SampleVector, SubPacketKind, CHANNEL_COUNT, DROPPED_FLAG,
};

use crate::framer::UNCOMPRESSED_LEN;

/// Максимальное значение 10-битного поля
pub const MAX_10BIT: i32 = 0x3FF;

/// Декодированный несжатый sub-packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncompressedSample {
    pub sample: SampleVector,
    /// Число сэмплов, потерянных гарнитурой перед этим
    pub dropped: Option<u16>,
}

/// Распаковывает 4 × 10 бит из 5 байт.
pub fn unpack_channels(b: &[u8; 5]) -> [i32; CHANNEL_COUNT] {
    let [b1, b2, b3, b4, b5] = b.map(|v| v as i32);
    [
        (b1 << 2) | (b2 >> 6),
        ((b2 & 0x3F) << 4) | (b3 >> 4),
        ((b3 & 0x0F) << 6) | (b4 >> 2),
        ((b4 & 0x03) << 8) | b5,
    ]
}

/// Упаковывает 4 значения в 5 байт (значения обрезаются до 10 бит).
pub fn pack_channels(values: &[i32; CHANNEL_COUNT]) -> [u8; 5] {
    let [c0, c1, c2, c3] = values.map(|v| (v & MAX_10BIT) as u16);
    [
        (c0 >> 2) as u8,
        (((c0 & 0x03) << 6) | (c1 >> 4)) as u8,
        (((c1 & 0x0F) << 4) | (c2 >> 6)) as u8,
        (((c2 & 0x3F) << 2) | (c3 >> 8)) as u8,
        (c3 & 0xFF) as u8,
    ]
}

/// Декодирует несжатый sub-packet (байты от байта типа включительно).
pub fn decode_uncompressed(bytes: &[u8]) -> ProtocolResult<UncompressedSample> {
    if bytes.len() < UNCOMPRESSED_LEN {
        return Err(ProtocolError::truncated_bytes(UNCOMPRESSED_LEN, bytes.len()));
    }

    let mut packed = [0u8; 5];
    packed.copy_from_slice(&bytes[1..6]);
    let sample = SampleVector::new(unpack_channels(&packed));

    let dropped = if bytes[0] & DROPPED_FLAG != 0 {
        if bytes.len() < UNCOMPRESSED_LEN + 2 {
            return Err(ProtocolError::truncated_bytes(
                UNCOMPRESSED_LEN + 2,
                bytes.len(),
            ));
        }
        Some(BigEndian::read_u16(&bytes[6..8]))
    } else {
        None
    };

    Ok(UncompressedSample { sample, dropped })
}

/// Кодирует несжатый sub-packet (используется симулятором и тестами).
pub fn encode_uncompressed(
    values: &[i32; CHANNEL_COUNT],
    dropped: Option<u16>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(UNCOMPRESSED_LEN + 2);
    out.push(SubPacketKind::UncompressedEeg.type_byte(dropped.is_some()));
    out.extend_from_slice(&pack_channels(values));
    if let Some(n) = dropped {
        out.extend_from_slice(&n.to_be_bytes());
    }
    out
}
