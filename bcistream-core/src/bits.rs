//! Побитовое чтение и запись MSB-first.
//!
//! [`BitCursor`] проверяет границы на каждом обращении и возвращает
//! [`ProtocolError::Truncated`] вместо чтения за пределами sub-packet.
//! Позиция (байт + смещение бита) доступна снаружи: по ней декодер
//! сверяет число прочитанных бит с заголовком.

use bcistream_types::{ProtocolError, ProtocolResult};

/// Bounds-checked курсор по срезу байт.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    /// Индекс текущего байта
    byte: usize,
    /// Смещение бита внутри текущего байта (0 = старший бит)
    bit: u8,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            bit: 0,
        }
    }

    pub fn byte_index(&self) -> usize {
        self.byte
    }

    pub fn bit_offset(&self) -> u8 {
        self.bit
    }

    /// Всего прочитано (или пропущено) бит с начала среза.
    pub fn bits_consumed(&self) -> usize {
        self.byte * 8 + self.bit as usize
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bits_consumed()
    }

    fn ensure(
        &self,
        n: usize,
    ) -> ProtocolResult<()> {
        let available = self.remaining_bits();
        if n > available {
            return Err(ProtocolError::Truncated {
                needed_bits: n,
                available_bits: available,
            });
        }
        Ok(())
    }

    fn advance(&mut self) {
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.byte += 1;
        }
    }

    /// Читает один бит.
    #[inline]
    pub fn read_bit(&mut self) -> ProtocolResult<u8> {
        self.ensure(1)?;
        let v = (self.data[self.byte] >> (7 - self.bit)) & 1;
        self.advance();
        Ok(v)
    }

    /// Читает `n` бит (n <= 32) старшим битом вперёд.
    ///
    /// При нехватке данных курсор не сдвигается. Больше 32 бит в `u32`
    /// не помещается: такой запрос отклоняется как `Truncated`.
    pub fn read_bits(
        &mut self,
        n: u32,
    ) -> ProtocolResult<u32> {
        if n > u32::BITS {
            return Err(ProtocolError::Truncated {
                needed_bits: n as usize,
                available_bits: u32::BITS as usize,
            });
        }
        self.ensure(n as usize)?;

        let mut v: u32 = 0;
        for _ in 0..n {
            let b = (self.data[self.byte] >> (7 - self.bit)) & 1;
            v = (v << 1) | b as u32;
            self.advance();
        }
        Ok(v)
    }

    /// Пропускает `n` бит без чтения значения.
    pub fn skip_bits(
        &mut self,
        n: usize,
    ) -> ProtocolResult<()> {
        self.ensure(n)?;
        let pos = self.bits_consumed() + n;
        self.byte = pos / 8;
        self.bit = (pos % 8) as u8;
        Ok(())
    }
}

/// Запись бит старшим вперёд. Последний байт дополняется нулями.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bits_written(&self) -> usize {
        self.bits
    }

    pub fn write_bit(
        &mut self,
        bit: bool,
    ) {
        let off = self.bits % 8;
        if off == 0 {
            self.buf.push(0);
        }
        if bit {
            let last = self.buf.len() - 1;
            self.buf[last] |= 0x80 >> off;
        }
        self.bits += 1;
    }

    /// Записывает младшие `n` бит `value` старшим вперёд. Биты старше
    /// 32-го пишутся нулями.
    pub fn write_bits(
        &mut self,
        value: u32,
        n: u32,
    ) {
        for i in (0..n).rev() {
            self.write_bit(value.checked_shr(i).unwrap_or(0) & 1 == 1);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_msb_first() {
        let data = [0b1010_0000, 0xFF];
        let mut c = BitCursor::new(&data);

        assert_eq!(c.read_bit().unwrap(), 1);
        assert_eq!(c.read_bit().unwrap(), 0);
        assert_eq!(c.read_bits(2).unwrap(), 0b10);
        assert_eq!(c.bits_consumed(), 4);

        // чтение через границу байта
        assert_eq!(c.read_bits(8).unwrap(), 0b0000_1111);
        assert_eq!(c.byte_index(), 1);
        assert_eq!(c.bit_offset(), 4);
        assert_eq!(c.remaining_bits(), 4);
    }

    #[test]
    fn test_byte_index_advances_at_bit_eight() {
        let data = [0x00, 0x80];
        let mut c = BitCursor::new(&data);
        c.read_bits(7).unwrap();
        assert_eq!((c.byte_index(), c.bit_offset()), (0, 7));
        c.read_bit().unwrap();
        assert_eq!((c.byte_index(), c.bit_offset()), (1, 0));
        assert_eq!(c.read_bit().unwrap(), 1);
    }

    #[test]
    fn test_truncated_does_not_move_cursor() {
        let data = [0xAB];
        let mut c = BitCursor::new(&data);
        c.read_bits(6).unwrap();

        let err = c.read_bits(3).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Truncated {
                needed_bits: 3,
                available_bits: 2
            }
        );
        assert_eq!(c.bits_consumed(), 6);

        assert_eq!(c.read_bits(2).unwrap(), 0b11);
        assert!(c.read_bit().is_err());
    }

    #[test]
    fn test_empty_slice() {
        let mut c = BitCursor::new(&[]);
        assert_eq!(c.remaining_bits(), 0);
        assert!(c.read_bit().is_err());
        assert_eq!(c.read_bits(0).unwrap(), 0);
    }

    #[test]
    fn test_skip_bits() {
        let data = [0x00, 0x04];
        let mut c = BitCursor::new(&data);
        c.skip_bits(13).unwrap();
        assert_eq!(c.bits_consumed(), 13);
        assert_eq!(c.read_bit().unwrap(), 1);
        assert!(c.skip_bits(3).is_err());
        assert!(c.skip_bits(2).is_ok());
    }

    #[test]
    fn test_read_32_bits() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut c = BitCursor::new(&data);
        assert_eq!(c.read_bits(32).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_read_more_than_32_bits_rejected() {
        let data = [0xFF; 8];
        let mut c = BitCursor::new(&data);

        assert_eq!(
            c.read_bits(33),
            Err(ProtocolError::Truncated {
                needed_bits: 33,
                available_bits: 32
            })
        );
        assert_eq!(c.bits_consumed(), 0);
        assert_eq!(c.read_bits(32).unwrap(), u32::MAX);
    }

    #[test]
    fn test_writer_zero_fills_above_32_bits() {
        let mut w = BitWriter::new();
        w.write_bits(0xFFFF_FFFF, 40);
        assert_eq!(w.into_bytes(), vec![0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_writer_pads_last_byte() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(0x1FF, 9);
        assert_eq!(w.bits_written(), 12);
        assert_eq!(w.into_bytes(), vec![0b1011_1111, 0b1111_0000]);
    }
}
