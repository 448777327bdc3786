use thiserror::Error;

/// Результат для операций разбора протокола гарнитуры.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Результат для операций транспорта (кольцевой буфер в shared memory).
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Ошибки разбора radio payload.
///
/// Ни одна из них не останавливает поток захвата: payload или
/// sub-packet отбрасываются, и цикл продолжает со следующего чтения.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Неизвестный тип sub-packet (старший ниббл). Отбрасывается весь payload.
    #[error("Unknown sub-packet type 0x{nibble:X} at byte offset {offset}")]
    UnknownSubPacketType { nibble: u8, offset: usize },

    /// Чтение за пределами объявленной длины sub-packet
    #[error("Truncated sub-packet: needed {needed_bits} bits, only {available_bits} available")]
    Truncated {
        needed_bits: usize,
        available_bits: usize,
    },

    /// Число прочитанных бит не совпало с bit-length из заголовка.
    /// Нефатально: декодированные дельты всё равно используются.
    #[error("Bit length mismatch: header declares {declared_bits} bits, decoder consumed {consumed_bits}")]
    LengthMismatch {
        declared_bits: usize,
        consumed_bits: usize,
    },

    /// Достигнут предел числа sub-packet в одном payload
    #[error("Sub-packet limit of {limit} reached before end of payload")]
    SubPacketLimit { limit: usize },
}

/// Ошибки кольцевого транспорта.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Сегмент или семафоры не удалось создать/подключить (фатально при старте)
    #[error("Shared segment unavailable: {0}")]
    SegmentUnavailable(String),

    /// Некорректная геометрия кольца
    #[error("Invalid ring layout: {0}")]
    InvalidLayout(String),

    /// Операция над счётчиком страниц завершилась ошибкой
    #[error("Page counter error: {0}")]
    Counter(String),

    /// Ошибки ввода/вывода (автоконвертируются из std::io::Error)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// `Truncated` в терминах байт (для фрейминга).
    pub fn truncated_bytes(
        needed: usize,
        available: usize,
    ) -> Self {
        Self::Truncated {
            needed_bits: needed * 8,
            available_bits: available * 8,
        }
    }

    /// Ошибка отбрасывает весь payload, а не только один sub-packet.
    pub fn rejects_payload(&self) -> bool {
        matches!(
            self,
            Self::UnknownSubPacketType { .. } | Self::SubPacketLimit { .. }
        )
    }
}

impl TransportError {
    pub fn unavailable<S: Into<String>>(s: S) -> Self {
        Self::SegmentUnavailable(s.into())
    }

    pub fn layout<S: Into<String>>(s: S) -> Self {
        Self::InvalidLayout(s.into())
    }

    pub fn counter<S: Into<String>>(s: S) -> Self {
        Self::Counter(s.into())
    }
}
