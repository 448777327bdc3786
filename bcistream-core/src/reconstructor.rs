//! Восстановление абсолютных значений каналов из сэмплов и дельт.

use bcistream_types::{SampleVector, CHANNEL_COUNT, DELTAS_PER_CHANNEL};

use crate::compressed::DeltaBlock;

/// Текущие абсолютные значения каналов.
pub type ChannelState = [i32; CHANNEL_COUNT];

/// Держит состояние каналов одного соединения.
///
/// Единственный писатель состояния - поток захвата. Сложение идёт с
/// переполнением по модулю 2^32: испорченный поток не может уронить поток.
#[derive(Debug, Clone, Default)]
pub struct SampleReconstructor {
    state: ChannelState,
}

impl SampleReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Сброс к нулю (переподключение гарнитуры).
    pub fn reset(&mut self) {
        self.state = [0; CHANNEL_COUNT];
    }

    /// Несжатый сэмпл заменяет состояние и выдаётся как есть.
    pub fn apply_absolute(
        &mut self,
        sample: SampleVector,
    ) -> SampleVector {
        self.state = sample.0;
        sample
    }

    /// Применяет 16 дельт на канал, выдавая 16 сэмплов в порядке прихода.
    pub fn apply_deltas(
        &mut self,
        deltas: &DeltaBlock,
        out: &mut Vec<SampleVector>,
    ) {
        out.reserve(DELTAS_PER_CHANNEL);
        for i in 0..DELTAS_PER_CHANNEL {
            for (c, value) in self.state.iter_mut().enumerate() {
                *value = value.wrapping_add(deltas[c][i]);
            }
            out.push(SampleVector::new(self.state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_replaces_state() {
        let mut r = SampleReconstructor::new();
        let s = r.apply_absolute(SampleVector::new([1, 2, 3, 4]));
        assert_eq!(s.0, [1, 2, 3, 4]);
        assert_eq!(r.state(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_deltas_are_cumulative() {
        let mut r = SampleReconstructor::new();
        r.apply_absolute(SampleVector::new([10, 20, 30, 40]));

        let mut deltas: DeltaBlock = [[0; 16]; 4];
        deltas[0] = [1; 16];
        deltas[3][0] = -40;
        deltas[3][15] = 7;

        let mut out = Vec::new();
        r.apply_deltas(&deltas, &mut out);

        assert_eq!(out.len(), 16);
        assert_eq!(out[0].0, [11, 20, 30, 0]);
        assert_eq!(out[14].0, [25, 20, 30, 0]);
        assert_eq!(out[15].0, [26, 20, 30, 7]);
        assert_eq!(r.state(), &[26, 20, 30, 7]);
    }

    #[test]
    fn test_reset_and_wrapping() {
        let mut r = SampleReconstructor::new();
        r.apply_absolute(SampleVector::new([i32::MAX, 0, 0, 0]));

        let mut deltas: DeltaBlock = [[0; 16]; 4];
        deltas[0][0] = 1;
        let mut out = Vec::new();
        r.apply_deltas(&deltas, &mut out);
        assert_eq!(out[0].0[0], i32::MIN);

        r.reset();
        assert_eq!(r.state(), &[0; 4]);
    }
}
