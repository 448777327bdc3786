//! Разбиение radio payload на sub-packet.
//!
//! Каждый sub-packet начинается с байта типа: старший ниббл задаёт тип,
//! бит 0x08 - флаг пропущенных сэмплов. Длина определяется типом (и для
//! сжатого EEG - полем bit-length), так что payload разбирается одним
//! проходом слева направо. Принятый список всегда покрывает payload
//! целиком; любое расхождение отбрасывает payload.

use byteorder::{BigEndian, ByteOrder};

use bcistream_types::{
    ProtocolError, ProtocolResult, SubPacketDescriptor, SubPacketKind, DROPPED_FLAG,
};

/// Максимум sub-packet в одном payload
pub const MAX_SUB_PACKETS: usize = 64;

/// Длина sync sub-packet (0xFFFFAA55)
pub const SYNC_LEN: usize = 4;
pub const ERROR_LEN: usize = 5;
pub const BATTERY_LEN: usize = 9;
pub const DRL_REF_LEN: usize = 4;
pub const UNCOMPRESSED_LEN: usize = 6;
pub const ACCELEROMETER_LEN: usize = 5;

/// Дополнительные байты счётчика пропущенных сэмплов
pub const DROPPED_COUNT_LEN: usize = 2;

/// Заголовок сжатого блока: тип + 5 байт медиан/квантования + 2 байта bit-length
pub const COMPRESSED_HEADER_LEN: usize = 8;

/// Смещение поля bit-length (big-endian u16) в сжатом sub-packet
pub const BIT_LENGTH_OFFSET: usize = 6;

/// Длина sub-packet, начинающегося с `rest[0]`.
fn sub_packet_len(
    kind: SubPacketKind,
    dropped: bool,
    rest: &[u8],
) -> ProtocolResult<usize> {
    let extra = if dropped { DROPPED_COUNT_LEN } else { 0 };

    let len = match kind {
        SubPacketKind::Sync => SYNC_LEN,
        SubPacketKind::Error => ERROR_LEN,
        SubPacketKind::Battery => BATTERY_LEN,
        SubPacketKind::DrlRef => DRL_REF_LEN,
        SubPacketKind::UncompressedEeg => UNCOMPRESSED_LEN + extra,
        SubPacketKind::Accelerometer => ACCELEROMETER_LEN + extra,
        SubPacketKind::CompressedEeg => {
            if rest.len() < COMPRESSED_HEADER_LEN {
                return Err(ProtocolError::truncated_bytes(
                    COMPRESSED_HEADER_LEN,
                    rest.len(),
                ));
            }
            let bit_len = BigEndian::read_u16(&rest[BIT_LENGTH_OFFSET..]) as usize;
            COMPRESSED_HEADER_LEN + bit_len.div_ceil(8)
        }
    };

    Ok(len)
}

/// Разбивает payload на упорядоченный список sub-packet.
///
/// Неизвестный тип, выход за конец payload или превышение
/// [`MAX_SUB_PACKETS`] отбрасывают payload целиком: частичный список
/// не возвращается.
pub fn frame(payload: &[u8]) -> ProtocolResult<Vec<SubPacketDescriptor>> {
    let mut out = Vec::new();
    let mut offset = 0usize;

    while offset < payload.len() {
        if out.len() == MAX_SUB_PACKETS {
            return Err(ProtocolError::SubPacketLimit {
                limit: MAX_SUB_PACKETS,
            });
        }

        let type_byte = payload[offset];
        let nibble = type_byte >> 4;
        let dropped_flag = type_byte & DROPPED_FLAG != 0;

        let kind = SubPacketKind::from_nibble(nibble)
            .ok_or(ProtocolError::UnknownSubPacketType { nibble, offset })?;

        let rest = &payload[offset..];
        let len = sub_packet_len(kind, dropped_flag, rest)?;

        if len > rest.len() {
            return Err(ProtocolError::truncated_bytes(len, rest.len()));
        }

        out.push(SubPacketDescriptor {
            kind,
            offset,
            len,
            dropped_flag,
        });

        offset += len;
    }

    Ok(out)
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
