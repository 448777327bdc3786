/// Флаг "есть пропущенные сэмплы" в первом байте sub-packet.
pub const DROPPED_FLAG: u8 = 0x08;

/// Тип sub-packet (старший ниббл первого байта).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubPacketKind {
    /// Уровни DRL/REF электродов
    DrlRef = 0x9,
    /// Акселерометр, 3 оси
    Accelerometer = 0xA,
    /// Батарея и температура
    Battery = 0xB,
    /// Сжатый блок EEG (16 сэмплов на канал)
    CompressedEeg = 0xC,
    /// Флаги ошибок гарнитуры
    Error = 0xD,
    /// Несжатый сэмпл EEG
    UncompressedEeg = 0xE,
    /// Синхрослово 0xFFFFAA55
    Sync = 0xF,
}

/// Описание одного sub-packet внутри payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPacketDescriptor {
    pub kind: SubPacketKind,
    /// Смещение первого байта в payload
    pub offset: usize,
    /// Длина в байтах, включая байт типа
    pub len: usize,
    /// Установлен бит [`DROPPED_FLAG`]
    pub dropped_flag: bool,
}

impl SubPacketKind {
    pub fn from_nibble(v: u8) -> Option<Self> {
        match v {
            0x9 => Some(SubPacketKind::DrlRef),
            0xA => Some(SubPacketKind::Accelerometer),
            0xB => Some(SubPacketKind::Battery),
            0xC => Some(SubPacketKind::CompressedEeg),
            0xD => Some(SubPacketKind::Error),
            0xE => Some(SubPacketKind::UncompressedEeg),
            0xF => Some(SubPacketKind::Sync),
            _ => None,
        }
    }

    pub fn as_nibble(&self) -> u8 {
        *self as u8
    }

    /// Первый байт sub-packet с этим типом.
    pub fn type_byte(
        &self,
        dropped: bool,
    ) -> u8 {
        let flag = if dropped { DROPPED_FLAG } else { 0 };
        (self.as_nibble() << 4) | flag
    }

    /// Несёт ли sub-packet сэмплы EEG.
    pub fn is_eeg(&self) -> bool {
        matches!(
            self,
            SubPacketKind::CompressedEeg | SubPacketKind::UncompressedEeg
        )
    }
}

impl SubPacketDescriptor {
    /// Байты sub-packet внутри payload.
    ///
    /// Дескриптор должен быть получен фреймером из того же payload.
    pub fn slice<'a>(
        &self,
        payload: &'a [u8],
    ) -> &'a [u8] {
        &payload[self.offset..self.offset + self.len]
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

impl std::fmt::Display for SubPacketKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            SubPacketKind::DrlRef => write!(f, "drl/ref"),
            SubPacketKind::Accelerometer => write!(f, "accelerometer"),
            SubPacketKind::Battery => write!(f, "battery"),
            SubPacketKind::CompressedEeg => write!(f, "compressed-eeg"),
            SubPacketKind::Error => write!(f, "error"),
            SubPacketKind::UncompressedEeg => write!(f, "uncompressed-eeg"),
            SubPacketKind::Sync => write!(f, "sync"),
        }
    }
}
