//! Сжатый блок EEG (sub-packet 0xC).
//!
//! ```text
//! byte 0     тип/флаг
//! bytes 1-5  4 × (медиана 6 бит + код квантования 4 бита), MSB-first
//! bytes 6-7  big-endian длина битового потока в битах
//! byte 8..   битовый поток, ceil(bit_length / 8) байт
//! ```
//!
//! Битовый поток содержит 16 дельт на канал, каналы подряд. Каждая дельта
//! закодирована как унарное частное, остаток переменной ширины (зависит
//! от медианы канала) и бит знака. Полярность знака (1 = минус)
//! сохраняется в том виде, в каком её выдаёт гарнитура.

use byteorder::{BigEndian, ByteOrder};

use bcistream_types::{ProtocolError, ProtocolResult, CHANNEL_COUNT, DELTAS_PER_CHANNEL};

use crate::{
    bits::BitCursor,
    framer::{BIT_LENGTH_OFFSET, COMPRESSED_HEADER_LEN},
};

/// Медиана 0: дельты не кодируются, но курсор сдвигается на 6 бит.
pub const ZERO_MEDIAN_SKIP_BITS: usize = 6;

/// Максимальная медиана (6 бит)
pub const MAX_MEDIAN: u8 = 0x3F;

/// Дельты одного блока: `[канал][номер сэмпла]`
pub type DeltaBlock = [[i32; DELTAS_PER_CHANNEL]; CHANNEL_COUNT];

/// Параметры сжатия одного канала.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelParams {
    pub median: u8,
    /// 4-битный код квантования
    pub quant_code: u8,
}

/// Заголовок сжатого блока.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedHeader {
    pub channels: [ChannelParams; CHANNEL_COUNT],
    /// Объявленная длина битового потока
    pub bit_length: u16,
}

/// Результат декодирования блока.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    pub header: CompressedHeader,
    pub deltas: DeltaBlock,
    pub bits_consumed: usize,
    /// `LengthMismatch`, если поток прочитан не ровно на bit_length бит
    pub length_warning: Option<ProtocolError>,
}

/// Множитель квантования: произведение 2, 4, 8, 16 по установленным битам
/// кода (от младшего к старшему).
///
/// ```
/// use bcistream_core::compressed::quantization_multiplier;
/// assert_eq!(quantization_multiplier(0b0000), 1);
/// assert_eq!(quantization_multiplier(0b0011), 8);
/// assert_eq!(quantization_multiplier(0b1111), 1024);
/// ```
pub fn quantization_multiplier(code: u8) -> i32 {
    let mut m = 1;
    for (bit, factor) in [2, 4, 8, 16].into_iter().enumerate() {
        if code & (1 << bit) != 0 {
            m *= factor;
        }
    }
    m
}

/// Ширина остатка для медианы: `(max_remainder_bits, max1less)`.
///
/// Медиана 1 - особый случай: ширина принудительно 1 бит.
pub fn remainder_width(median: u8) -> (u32, u32) {
    debug_assert!(median > 0);
    let max_remainder_bits = if median == 1 {
        1
    } else {
        u8::BITS - 1 - median.leading_zeros()
    };
    let max1less = (1u32 << (max_remainder_bits + 1)) - median as u32;
    (max_remainder_bits, max1less)
}

impl CompressedHeader {
    /// Распаковывает заголовок из первых 8 байт sub-packet.
    pub fn parse(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.len() < COMPRESSED_HEADER_LEN {
            return Err(ProtocolError::truncated_bytes(
                COMPRESSED_HEADER_LEN,
                bytes.len(),
            ));
        }

        let (b1, b2, b3, b4, b5) = (bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]);

        let channels = [
            ChannelParams {
                median: b1 >> 2,
                quant_code: ((b1 & 0x03) << 2) | (b2 >> 6),
            },
            ChannelParams {
                median: b2 & 0x3F,
                quant_code: b3 >> 4,
            },
            ChannelParams {
                median: ((b3 & 0x0F) << 2) | (b4 >> 6),
                quant_code: (b4 >> 2) & 0x0F,
            },
            ChannelParams {
                median: ((b4 & 0x03) << 4) | (b5 >> 4),
                quant_code: b5 & 0x0F,
            },
        ];

        Ok(Self {
            channels,
            bit_length: BigEndian::read_u16(&bytes[BIT_LENGTH_OFFSET..]),
        })
    }

    /// Упаковывает медианы и коды квантования в байты 1-5.
    pub fn pack_params(channels: &[ChannelParams; CHANNEL_COUNT]) -> [u8; 5] {
        let [c0, c1, c2, c3] = channels.map(|c| (c.median & MAX_MEDIAN, c.quant_code & 0x0F));
        [
            (c0.0 << 2) | (c0.1 >> 2),
            ((c0.1 & 0x03) << 6) | c1.0,
            (c1.1 << 4) | (c2.0 >> 2),
            ((c2.0 & 0x03) << 6) | (c2.1 << 2) | (c3.0 >> 4),
            ((c3.0 & 0x0F) << 4) | c3.1,
        ]
    }

    /// Число байт битового потока после заголовка.
    pub fn data_len(&self) -> usize {
        (self.bit_length as usize).div_ceil(8)
    }
}

/// Декодирует одну дельту канала с ненулевой медианой.
fn decode_delta(
    cursor: &mut BitCursor<'_>,
    median: u8,
    max_remainder_bits: u32,
    max1less: u32,
    multiplier: i32,
) -> ProtocolResult<i32> {
    let mut quotient: i32 = 0;
    while cursor.read_bit()? == 1 {
        quotient += 1;
    }

    let mut remainder = cursor.read_bits(max_remainder_bits)?;
    if remainder >= max1less {
        remainder = ((remainder << 1) | cursor.read_bit()? as u32) - max1less;
    }

    let sign = if cursor.read_bit()? == 1 { -1 } else { 1 };

    let magnitude = quotient
        .wrapping_mul(median as i32)
        .wrapping_add(remainder as i32);
    Ok(magnitude.wrapping_mul(sign).wrapping_mul(multiplier))
}

/// Декодирует дельты одного канала в `out`.
pub fn decode_channel(
    cursor: &mut BitCursor<'_>,
    params: ChannelParams,
    out: &mut [i32; DELTAS_PER_CHANNEL],
) -> ProtocolResult<()> {
    if params.median == 0 {
        *out = [0; DELTAS_PER_CHANNEL];
        return cursor.skip_bits(ZERO_MEDIAN_SKIP_BITS);
    }

    let (max_remainder_bits, max1less) = remainder_width(params.median);
    let multiplier = quantization_multiplier(params.quant_code);

    for delta in out.iter_mut() {
        *delta = decode_delta(
            cursor,
            params.median,
            max_remainder_bits,
            max1less,
            multiplier,
        )?;
    }
    Ok(())
}

/// Декодирует сжатый sub-packet целиком (байты от байта типа включительно).
///
/// Чтение ограничено `ceil(bit_length / 8)` байтами после заголовка;
/// выход за них даёт `Truncated`. Несовпадение числа прочитанных бит с
/// `bit_length` не является ошибкой: дельты возвращаются, а предупреждение
/// кладётся в [`CompressedBlock::length_warning`].
pub fn decode_compressed(bytes: &[u8]) -> ProtocolResult<CompressedBlock> {
    let header = CompressedHeader::parse(bytes)?;

    let data_end = COMPRESSED_HEADER_LEN + header.data_len();
    if bytes.len() < data_end {
        return Err(ProtocolError::truncated_bytes(data_end, bytes.len()));
    }

    let mut cursor = BitCursor::new(&bytes[COMPRESSED_HEADER_LEN..data_end]);
    let mut deltas: DeltaBlock = [[0; DELTAS_PER_CHANNEL]; CHANNEL_COUNT];

    for (params, out) in header.channels.iter().zip(deltas.iter_mut()) {
        decode_channel(&mut cursor, *params, out)?;
    }

    let bits_consumed = cursor.bits_consumed();
    let declared = header.bit_length as usize;
    let length_warning = (bits_consumed != declared).then_some(ProtocolError::LengthMismatch {
        declared_bits: declared,
        consumed_bits: bits_consumed,
    });

    Ok(CompressedBlock {
        header,
        deltas,
        bits_consumed,
        length_warning,
    })
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Эталонный блок: канал 0 - медиана 5, код квантования 0b0001 (×2),
    /// каналы 1-3 - медиана 0. 92 бита потока.
    const GOLDEN: [u8; 20] = [
        0xC0, // тип
        0x14, 0x40, 0x00, 0x00, 0x00, // медианы/квантование
        0x00, 0x5C, // bit-length = 92
        0x25, 0x06, 0x42, 0x2E, 0x30, 0xA3, 0xD0, 0x9B, 0x84, 0xC0, 0x00, 0x00,
    ];

    const GOLDEN_CH0: [i32; 16] = [2, -4, 0, 6, 10, -10, 8, -2, 0, 14, -8, 4, 2, -6, 20, -12];

    #[test]
    fn test_quantization_multiplier() {
        assert_eq!(quantization_multiplier(0), 1);
        assert_eq!(quantization_multiplier(0b0001), 2);
        assert_eq!(quantization_multiplier(0b0010), 4);
        assert_eq!(quantization_multiplier(0b0011), 8);
        assert_eq!(quantization_multiplier(0b0100), 8);
        assert_eq!(quantization_multiplier(0b1000), 16);
        assert_eq!(quantization_multiplier(0b1111), 2 * 4 * 8 * 16);
    }

    #[test]
    fn test_remainder_width() {
        assert_eq!(remainder_width(1), (1, 3));
        assert_eq!(remainder_width(2), (1, 2));
        assert_eq!(remainder_width(5), (2, 3));
        assert_eq!(remainder_width(8), (3, 8));
        assert_eq!(remainder_width(63), (5, 1));
    }

    #[test]
    fn test_header_layout() {
        // медианы [63, 0, 33, 9], коды [15, 3, 8, 1]
        let bytes = [0xC0, 0xFF, 0xC0, 0x38, 0x60, 0x91, 0x01, 0x02];
        let h = CompressedHeader::parse(&bytes).unwrap();

        let medians: Vec<u8> = h.channels.iter().map(|c| c.median).collect();
        let codes: Vec<u8> = h.channels.iter().map(|c| c.quant_code).collect();
        assert_eq!(medians, vec![63, 0, 33, 9]);
        assert_eq!(codes, vec![15, 3, 8, 1]);
        assert_eq!(h.bit_length, 0x0102);
        assert_eq!(h.data_len(), 33);

        assert_eq!(CompressedHeader::pack_params(&h.channels), [0xFF, 0xC0, 0x38, 0x60, 0x91]);
    }

    #[test]
    fn test_golden_vector() {
        let block = decode_compressed(&GOLDEN).unwrap();

        assert_eq!(block.header.channels[0].median, 5);
        assert_eq!(block.header.channels[0].quant_code, 0b0001);
        assert_eq!(block.deltas[0], GOLDEN_CH0);
        for ch in 1..CHANNEL_COUNT {
            assert_eq!(block.deltas[ch], [0; 16]);
        }
        assert_eq!(block.bits_consumed, 92);
        assert_eq!(block.length_warning, None);
    }

    #[test]
    fn test_zero_median_consumes_six_bits() {
        let data = [0xFF; 2];
        let mut cursor = BitCursor::new(&data);
        let mut out = [7; DELTAS_PER_CHANNEL];

        decode_channel(&mut cursor, ChannelParams::default(), &mut out).unwrap();

        assert_eq!(out, [0; DELTAS_PER_CHANNEL]);
        assert_eq!(cursor.bits_consumed(), ZERO_MEDIAN_SKIP_BITS);
    }

    #[test]
    fn test_all_zero_medians() {
        // 4 × 6 = 24 бита
        let bytes = [0xC0, 0, 0, 0, 0, 0, 0x00, 0x18, 0, 0, 0];
        let block = decode_compressed(&bytes).unwrap();
        assert_eq!(block.deltas, [[0; 16]; 4]);
        assert_eq!(block.bits_consumed, 24);
        assert!(block.length_warning.is_none());
    }

    #[test]
    fn test_median_one() {
        // канал 0: медиана 1, дельты [1, -1, 0, 2, 0 × 11, 3]
        let bytes = [
            0xC0, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x49, 0x89, 0x18, 0x00, 0x00, 0x00, 0x70,
            0x00, 0x00, 0x00, 0x00,
        ];
        let block = decode_compressed(&bytes).unwrap();

        let mut expected = [0; 16];
        expected[..4].copy_from_slice(&[1, -1, 0, 2]);
        expected[15] = 3;
        assert_eq!(block.deltas[0], expected);
        assert_eq!(block.bits_consumed, 73);
    }

    #[test]
    fn test_length_mismatch_is_lenient() {
        // тот же поток, но заголовок объявляет 96 бит вместо 92
        let mut bytes = GOLDEN;
        bytes[7] = 0x60;

        let block = decode_compressed(&bytes).unwrap();
        assert_eq!(block.deltas[0], GOLDEN_CH0);
        assert_eq!(
            block.length_warning,
            Some(ProtocolError::LengthMismatch {
                declared_bits: 96,
                consumed_bits: 92
            })
        );
    }

    #[test]
    fn test_stream_shorter_than_needed_is_truncated() {
        // объявлено 8 бит, а каналу 0 нужно больше
        let mut bytes = GOLDEN[..9].to_vec();
        bytes[7] = 0x08;

        let err = decode_compressed(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn test_missing_data_bytes() {
        let err = decode_compressed(&GOLDEN[..12]).unwrap_err();
        assert_eq!(err, ProtocolError::truncated_bytes(20, 12));
    }
}
