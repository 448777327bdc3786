/// Число каналов EEG гарнитуры
pub const CHANNEL_COUNT: usize = 4;

/// Дельт на канал в одном сжатом блоке
pub const DELTAS_PER_CHANNEL: usize = 16;

/// Размер одного значения канала в shared memory (i32)
pub const SAMPLE_ELEMENT_SIZE: usize = std::mem::size_of::<i32>();

/// Размер одного [`SampleVector`] в shared memory
pub const SAMPLE_SIZE: usize = CHANNEL_COUNT * SAMPLE_ELEMENT_SIZE;

/// Один восстановленный отсчёт времени: значения всех каналов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleVector(pub [i32; CHANNEL_COUNT]);

impl SampleVector {
    pub fn new(values: [i32; CHANNEL_COUNT]) -> Self {
        Self(values)
    }

    pub fn channels(&self) -> &[i32; CHANNEL_COUNT] {
        &self.0
    }

    /// Записывает сэмпл в `dst` (native-endian, `SAMPLE_SIZE` байт).
    pub fn write_ne(
        &self,
        dst: &mut [u8],
    ) {
        for (chunk, v) in dst[..SAMPLE_SIZE]
            .chunks_exact_mut(SAMPLE_ELEMENT_SIZE)
            .zip(self.0.iter())
        {
            chunk.copy_from_slice(&v.to_ne_bytes());
        }
    }

    /// Читает сэмпл из `src` (native-endian, `SAMPLE_SIZE` байт).
    pub fn read_ne(src: &[u8]) -> Self {
        let mut values = [0i32; CHANNEL_COUNT];
        for (v, chunk) in values
            .iter_mut()
            .zip(src[..SAMPLE_SIZE].chunks_exact(SAMPLE_ELEMENT_SIZE))
        {
            *v = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self(values)
    }
}

impl From<[i32; CHANNEL_COUNT]> for SampleVector {
    fn from(values: [i32; CHANNEL_COUNT]) -> Self {
        Self(values)
    }
}
