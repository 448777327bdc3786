//! Разбор одного radio payload: фрейминг → декодеры → восстановление.

use bcistream_types::{
    ProtocolError, ProtocolResult, SampleVector, SubPacketDescriptor, SubPacketKind, Telemetry,
};

use crate::{
    compressed::decode_compressed, framer::frame, reconstructor::SampleReconstructor,
    telemetry::decode_telemetry, uncompressed::decode_uncompressed,
};

/// Итог разбора одного payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadReport {
    /// Сколько sub-packet выделил фреймер
    pub sub_packets: usize,
    /// Восстановленные сэмплы в порядке прихода
    pub samples: Vec<SampleVector>,
    pub telemetry: Vec<Telemetry>,
    /// Отброшенные sub-packet
    pub errors: Vec<(SubPacketDescriptor, ProtocolError)>,
    /// Нефатальные предупреждения (`LengthMismatch`)
    pub warnings: Vec<ProtocolError>,
    /// Сумма счётчиков пропущенных сэмплов, сообщённых гарнитурой
    pub headband_dropped: u64,
}

/// Декодер одного соединения. Владеет состоянием каналов.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    reconstructor: SampleReconstructor,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconstructor(&self) -> &SampleReconstructor {
        &self.reconstructor
    }

    /// Сброс состояния каналов при переподключении.
    pub fn reset(&mut self) {
        self.reconstructor.reset();
    }

    /// Разбирает payload.
    ///
    /// `Err` означает, что payload отброшен целиком (ошибка фрейминга) и
    /// состояние каналов не менялось. Ошибки отдельных sub-packet
    /// попадают в [`PayloadReport::errors`], остальные sub-packet
    /// обрабатываются.
    pub fn decode_payload(
        &mut self,
        payload: &[u8],
    ) -> ProtocolResult<PayloadReport> {
        let descriptors = frame(payload)?;

        let mut report = PayloadReport {
            sub_packets: descriptors.len(),
            ..Default::default()
        };

        for desc in descriptors {
            if let Err(e) = self.decode_sub_packet(&desc, desc.slice(payload), &mut report) {
                report.errors.push((desc, e));
            }
        }

        Ok(report)
    }

    fn decode_sub_packet(
        &mut self,
        desc: &SubPacketDescriptor,
        bytes: &[u8],
        report: &mut PayloadReport,
    ) -> ProtocolResult<()> {
        match desc.kind {
            SubPacketKind::UncompressedEeg => {
                let s = decode_uncompressed(bytes)?;
                if let Some(n) = s.dropped {
                    report.headband_dropped += n as u64;
                }
                let sample = self.reconstructor.apply_absolute(s.sample);
                report.samples.push(sample);
            }
            SubPacketKind::CompressedEeg => {
                let block = decode_compressed(bytes)?;
                if let Some(w) = block.length_warning {
                    report.warnings.push(w);
                }
                self.reconstructor
                    .apply_deltas(&block.deltas, &mut report.samples);
            }
            _ => {
                let (telemetry, dropped) = decode_telemetry(desc, bytes)?;
                report.telemetry.extend(telemetry);
                if let Some(n) = dropped {
                    report.headband_dropped += n as u64;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encoder::encode_deltas, uncompressed::encode_uncompressed};

    const SYNC: [u8; 4] = [0xFF, 0xFF, 0xAA, 0x55];

    #[test]
    fn test_rejected_payload_keeps_state() {
        let mut dec = Decoder::new();
        let mut payload = encode_uncompressed(&[5, 6, 7, 8], None);
        dec.decode_payload(&payload).unwrap();

        payload.extend_from_slice(&[0x10, 0, 0]);
        let err = dec.decode_payload(&payload).unwrap_err();
        assert!(err.rejects_payload());
        assert_eq!(dec.reconstructor().state(), &[5, 6, 7, 8]);
    }

    #[test]
    fn test_bad_sub_packet_does_not_stop_the_rest() {
        let mut dec = Decoder::new();

        let mut deltas = [[0; 16]; 4];
        deltas[0][0] = 3;
        let mut compressed = encode_deltas(&deltas).unwrap();
        // поток объявлен на 1 байт, а данных для канала 0 больше:
        // фреймер примет, декодер упрётся в конец
        compressed[6] = 0x00;
        compressed[7] = 0x08;
        compressed.truncate(9);

        let mut payload = compressed;
        payload.extend_from_slice(&encode_uncompressed(&[1, 2, 3, 4], None));

        let report = dec.decode_payload(&payload).unwrap();
        assert_eq!(report.sub_packets, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0.kind, SubPacketKind::CompressedEeg);
        assert_eq!(report.samples, vec![SampleVector::new([1, 2, 3, 4])]);
    }

    #[test]
    fn test_telemetry_and_headband_drops() {
        let mut dec = Decoder::new();
        let mut payload = SYNC.to_vec();
        payload.extend_from_slice(&[0xB0, 0x64, 0x00, 0x0F, 0x3C, 0x0F, 0x28, 0x00, 0x1F]);
        payload.extend_from_slice(&encode_uncompressed(&[0, 0, 0, 0], Some(4)));
        payload.extend_from_slice(&[0xA8, 0, 0, 0, 0, 0x00, 0x02]);

        let report = dec.decode_payload(&payload).unwrap();
        assert_eq!(report.sub_packets, 4);
        assert_eq!(report.telemetry.len(), 2);
        assert!(matches!(report.telemetry[0], Telemetry::Battery(_)));
        assert_eq!(report.headband_dropped, 6);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_length_mismatch_goes_to_warnings() {
        let mut dec = Decoder::new();
        let mut deltas = [[0; 16]; 4];
        deltas[2] = [4; 16];
        let mut bytes = encode_deltas(&deltas).unwrap();
        // объявляем на 1 бит меньше: байт данных тот же
        let declared = u16::from_be_bytes([bytes[6], bytes[7]]) - 1;
        bytes[6..8].copy_from_slice(&declared.to_be_bytes());

        let report = dec.decode_payload(&bytes).unwrap();
        assert_eq!(report.samples.len(), 16);
        assert_eq!(report.samples[15].0, [0, 0, 64, 0]);
        assert!(matches!(
            report.warnings[..],
            [ProtocolError::LengthMismatch { .. }]
        ));
    }
}
