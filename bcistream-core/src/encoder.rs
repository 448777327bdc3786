//! Кодирование сжатых блоков EEG в формате гарнитуры.
//!
//! Нужен симулятору устройства и тестам: пишет ровно тот битовый поток,
//! который разбирает [`crate::compressed::decode_compressed`].

use thiserror::Error;

use bcistream_types::{SubPacketKind, CHANNEL_COUNT, DELTAS_PER_CHANNEL};

use crate::{
    bits::BitWriter,
    compressed::{
        quantization_multiplier, remainder_width, ChannelParams, CompressedHeader, DeltaBlock,
        MAX_MEDIAN, ZERO_MEDIAN_SKIP_BITS,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Дельта не кратна множителю квантования
    #[error("Delta {delta} on channel {channel} is not a multiple of quantization {multiplier}")]
    NotQuantized {
        channel: usize,
        delta: i32,
        multiplier: i32,
    },

    /// Ненулевая дельта в канале с медианой 0
    #[error("Channel {channel} has median 0 but non-zero deltas")]
    NonZeroWithZeroMedian { channel: usize },

    #[error("Median {0} does not fit in 6 bits")]
    MedianOutOfRange(u8),

    #[error("Quantization code {0} does not fit in 4 bits")]
    QuantCodeOutOfRange(u8),

    /// Поток длиннее, чем помещается в 16-битное поле bit-length
    #[error("Bitstream of {0} bits exceeds the 16-bit length field")]
    StreamTooLong(usize),
}

/// Подбирает медиану канала: средний модуль дельты, ограниченный 1..=63.
/// Канал без изменений получает медиану 0.
pub fn choose_median(deltas: &[i32; DELTAS_PER_CHANNEL]) -> u8 {
    if deltas.iter().all(|&d| d == 0) {
        return 0;
    }
    let sum: u64 = deltas.iter().map(|d| d.unsigned_abs() as u64).sum();
    let mean = sum.div_ceil(DELTAS_PER_CHANNEL as u64);
    mean.clamp(1, MAX_MEDIAN as u64) as u8
}

fn encode_channel(
    w: &mut BitWriter,
    channel: usize,
    params: ChannelParams,
    deltas: &[i32; DELTAS_PER_CHANNEL],
) -> Result<(), EncodeError> {
    if params.median == 0 {
        if deltas.iter().any(|&d| d != 0) {
            return Err(EncodeError::NonZeroWithZeroMedian { channel });
        }
        w.write_bits(0, ZERO_MEDIAN_SKIP_BITS as u32);
        return Ok(());
    }

    let (max_remainder_bits, max1less) = remainder_width(params.median);
    let multiplier = quantization_multiplier(params.quant_code);
    let median = params.median as u32;

    for &delta in deltas {
        if delta % multiplier != 0 {
            return Err(EncodeError::NotQuantized {
                channel,
                delta,
                multiplier,
            });
        }
        let magnitude = delta.unsigned_abs() / multiplier as u32;
        let quotient = magnitude / median;
        let remainder = magnitude % median;

        for _ in 0..quotient {
            w.write_bit(true);
        }
        w.write_bit(false);

        if remainder < max1less {
            w.write_bits(remainder, max_remainder_bits);
        } else {
            w.write_bits(remainder + max1less, max_remainder_bits + 1);
        }

        w.write_bit(delta < 0);
    }
    Ok(())
}

/// Кодирует сжатый sub-packet с заданными параметрами каналов.
pub fn encode_compressed(
    channels: &[ChannelParams; CHANNEL_COUNT],
    deltas: &DeltaBlock,
) -> Result<Vec<u8>, EncodeError> {
    for c in channels {
        if c.median > MAX_MEDIAN {
            return Err(EncodeError::MedianOutOfRange(c.median));
        }
        if c.quant_code > 0x0F {
            return Err(EncodeError::QuantCodeOutOfRange(c.quant_code));
        }
    }

    let mut w = BitWriter::new();
    for (channel, (params, ch_deltas)) in channels.iter().zip(deltas.iter()).enumerate() {
        encode_channel(&mut w, channel, *params, ch_deltas)?;
    }

    let bit_length = w.bits_written();
    let bit_length_u16 =
        u16::try_from(bit_length).map_err(|_| EncodeError::StreamTooLong(bit_length))?;

    let data = w.into_bytes();
    let mut out = Vec::with_capacity(8 + data.len());
    out.push(SubPacketKind::CompressedEeg.type_byte(false));
    out.extend_from_slice(&CompressedHeader::pack_params(channels));
    out.extend_from_slice(&bit_length_u16.to_be_bytes());
    out.extend_from_slice(&data);
    Ok(out)
}

/// Кодирует блок без квантования, подбирая медианы автоматически.
pub fn encode_deltas(deltas: &DeltaBlock) -> Result<Vec<u8>, EncodeError> {
    let channels = deltas.map(|d| ChannelParams {
        median: choose_median(&d),
        quant_code: 0,
    });
    encode_compressed(&channels, deltas)
}
