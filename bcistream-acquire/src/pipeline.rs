use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use bcistream_core::{Decoder, PayloadReport};
use bcistream_transport::{AppendOutcome, SampleSink};
use bcistream_types::Telemetry;

use crate::{
    device::{DeviceRead, HeadbandDevice},
    metrics::AcquireMetrics,
    AcquireConfig, AcquireResult,
};

/// Оркестрирует сессию захвата.
///
/// Один поток владеет всей цепочкой: чтение радио → фрейминг →
/// декодирование → восстановление → запись в кольцо. Ошибки протокола
/// не останавливают цикл.
pub struct AcquisitionPipeline {
    config: AcquireConfig,
    metrics: Arc<AcquireMetrics>,
    stop_flag: Arc<AtomicBool>,
}

impl AcquisitionPipeline {
    /// Создаёт пайплайн. Возвращает также shared-ссылку на метрики.
    pub fn new(config: AcquireConfig) -> (Self, Arc<AcquireMetrics>) {
        let metrics = AcquireMetrics::new();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let p = Self {
            config,
            metrics: metrics.clone(),
            stop_flag,
        };

        (p, metrics)
    }

    /// Флаг остановки. Проверяется между чтениями радио.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Запускает захват. Блокируется до остановки, истечения времени или
    /// закрытия устройства.
    pub fn run(
        self,
        mut device: Box<dyn HeadbandDevice>,
        sink: &mut dyn SampleSink,
    ) -> AcquireResult<()> {
        let info = device.info();
        let cfg = &self.config;

        info!(
            "Starting acquisition: {} ({}), duration: {:?}",
            info.name,
            info.address.as_deref().unwrap_or("-"),
            cfg.duration_secs
        );

        let stats_interval = Duration::from_secs(cfg.stats_interval_secs);
        let mut decoder = Decoder::new();
        let mut buf = Vec::with_capacity(512);

        let session_start = Instant::now();
        let mut last_stats = Instant::now();

        loop {
            //  Проверяем ограничение по времени
            if let Some(dur) = cfg.duration_secs {
                if session_start.elapsed().as_secs() >= dur {
                    info!("Duration limit reached ({dur}s). Stopping...");
                    break;
                }
            }

            //  Проверяем внешний stop_flag (Ctrl+C)
            if self.stop_flag.load(Ordering::Relaxed) {
                info!("Stop signal received. Stopping...");
                break;
            }

            match device.read_payload(&mut buf)? {
                DeviceRead::Payload => self.handle_payload(&mut decoder, &buf, sink),
                DeviceRead::Reconnected => {
                    decoder.reset();
                    self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                    info!("Device reconnected, channel state reset");
                }
                DeviceRead::Closed => {
                    info!("Device closed. Stopping...");
                    break;
                }
            }

            // Периодически выводим статистику
            if last_stats.elapsed() >= stats_interval {
                self.log_progress(&session_start);
                last_stats = Instant::now();
            }
        }

        info!(
            "Acquisition finished: {} posted pages, {} dropped samples",
            sink.posted(),
            sink.dropped()
        );
        Ok(())
    }

    fn handle_payload(
        &self,
        decoder: &mut Decoder,
        payload: &[u8],
        sink: &mut dyn SampleSink,
    ) {
        let m = &self.metrics;
        m.payloads.fetch_add(1, Ordering::Relaxed);
        m.bytes_received
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        let report = match decoder.decode_payload(payload) {
            Ok(r) => r,
            Err(e) => {
                m.rejected_payloads.fetch_add(1, Ordering::Relaxed);
                warn!("Payload of {} bytes discarded: {e}", payload.len());
                return;
            }
        };

        self.record_report(&report);

        let mut transport_errors = 0u64;
        for sample in &report.samples {
            match sink.append(sample) {
                Ok(AppendOutcome::Written) => {
                    m.samples_written.fetch_add(1, Ordering::Relaxed);
                }
                Ok(AppendOutcome::Posted) => {
                    m.samples_written.fetch_add(1, Ordering::Relaxed);
                    m.pages_posted.fetch_add(1, Ordering::Relaxed);
                }
                Ok(AppendOutcome::Dropped) => {
                    m.samples_dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    m.samples_dropped.fetch_add(1, Ordering::Relaxed);
                    if transport_errors == 0 {
                        warn!("Transport error, sample dropped: {e}");
                    }
                    transport_errors += 1;
                }
            }
        }

        if transport_errors > 1 {
            warn!("{transport_errors} samples dropped by transport errors in one payload");
        }
    }

    fn record_report(
        &self,
        report: &PayloadReport,
    ) {
        let m = &self.metrics;

        m.samples_emitted
            .fetch_add(report.samples.len() as u64, Ordering::Relaxed);
        m.headband_dropped
            .fetch_add(report.headband_dropped, Ordering::Relaxed);

        for (desc, e) in &report.errors {
            m.sub_packet_errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Sub-packet {} at offset {} discarded: {e}",
                desc.kind, desc.offset
            );
        }

        for w in &report.warnings {
            m.length_mismatches.fetch_add(1, Ordering::Relaxed);
            warn!("{w}");
        }

        if report.headband_dropped > 0 {
            warn!(
                "Headband reports {} dropped samples",
                report.headband_dropped
            );
        }

        for t in &report.telemetry {
            debug!("Telemetry: {t:?}");
            if let Telemetry::Battery(b) = t {
                m.record_battery(b.charge_pct());
            }
        }
    }

    fn log_progress(
        &self,
        start: &Instant,
    ) {
        let m = &self.metrics;

        info!(
            "[ {:.0}s ] payloads={} samples={} ({:.1} Hz) dropped={} ({:.2}%) pages={} errors={}",
            start.elapsed().as_secs_f64(),
            m.payloads.load(Ordering::Relaxed),
            m.samples_emitted.load(Ordering::Relaxed),
            m.sample_rate_hz(start),
            m.samples_dropped.load(Ordering::Relaxed),
            m.drop_rate_pct(),
            m.pages_posted.load(Ordering::Relaxed),
            m.sub_packet_errors.load(Ordering::Relaxed)
                + m.rejected_payloads.load(Ordering::Relaxed),
        );
    }
}
