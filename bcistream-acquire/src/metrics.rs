use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Метрики сессии, обновляемые lock-free.
#[derive(Debug, Default)]
pub struct AcquireMetrics {
    pub payloads: AtomicU64,
    pub bytes_received: AtomicU64,
    /// Payload, отброшенные целиком (ошибка фрейминга)
    pub rejected_payloads: AtomicU64,
    pub sub_packet_errors: AtomicU64,
    pub length_mismatches: AtomicU64,
    pub samples_emitted: AtomicU64,
    pub samples_written: AtomicU64,
    pub samples_dropped: AtomicU64,
    pub pages_posted: AtomicU64,
    /// Пропуски, о которых сообщила сама гарнитура
    pub headband_dropped: AtomicU64,
    pub reconnects: AtomicU64,
    /// Последний заряд батареи в десятых долях процента
    pub battery_pct_x10: AtomicU64,
    pub battery_reports: AtomicU64,
}

/// Snapshot метрик для отображения / тестирования.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub duration_secs: f64,
    pub payloads: u64,
    pub bytes_received: u64,
    pub rejected_payloads: u64,
    pub sub_packet_errors: u64,
    pub length_mismatches: u64,
    pub samples_emitted: u64,
    pub samples_written: u64,
    pub samples_dropped: u64,
    pub pages_posted: u64,
    pub headband_dropped: u64,
    pub reconnects: u64,
    pub battery_pct: Option<f64>,
    pub sample_rate_hz: f64,
    pub drop_rate_pct: f64,
}

impl AcquireMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Сэмплов в секунду с начала сессии.
    pub fn sample_rate_hz(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        self.samples_emitted.load(Ordering::Relaxed) as f64 / secs
    }

    /// Процент сэмплов, отброшенных транспортом (0.0-100.0).
    pub fn drop_rate_pct(&self) -> f64 {
        let emitted = self.samples_emitted.load(Ordering::Relaxed);
        let dropped = self.samples_dropped.load(Ordering::Relaxed);

        if emitted == 0 {
            0.0
        } else {
            dropped as f64 / emitted as f64 * 100.0
        }
    }

    pub fn record_battery(
        &self,
        pct: f64,
    ) {
        let x10 = (pct.clamp(0.0, 100.0) * 10.0).round() as u64;
        self.battery_pct_x10.store(x10, Ordering::Relaxed);
        self.battery_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn battery_pct(&self) -> Option<f64> {
        if self.battery_reports.load(Ordering::Relaxed) == 0 {
            return None;
        }
        Some(self.battery_pct_x10.load(Ordering::Relaxed) as f64 / 10.0)
    }

    /// Итоговая сводка для вывода в конце сессии.
    pub fn summary(
        &self,
        elapsed: &Instant,
    ) -> MetricsSummary {
        MetricsSummary {
            duration_secs: elapsed.elapsed().as_secs_f64(),
            payloads: self.payloads.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            rejected_payloads: self.rejected_payloads.load(Ordering::Relaxed),
            sub_packet_errors: self.sub_packet_errors.load(Ordering::Relaxed),
            length_mismatches: self.length_mismatches.load(Ordering::Relaxed),
            samples_emitted: self.samples_emitted.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            pages_posted: self.pages_posted.load(Ordering::Relaxed),
            headband_dropped: self.headband_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            battery_pct: self.battery_pct(),
            sample_rate_hz: self.sample_rate_hz(elapsed),
            drop_rate_pct: self.drop_rate_pct(),
        }
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Duration      : {:.1}s", self.duration_secs)?;
        writeln!(
            f,
            "  Payloads      : {} ({} rejected, {:.1} KB)",
            self.payloads,
            self.rejected_payloads,
            self.bytes_received as f64 / 1e3
        )?;
        writeln!(
            f,
            "  Sub-packets   : {} errors, {} length mismatches",
            self.sub_packet_errors, self.length_mismatches
        )?;
        writeln!(
            f,
            "  Samples       : {} ({:.1} Hz)",
            self.samples_emitted, self.sample_rate_hz
        )?;
        writeln!(f, "  Written       : {}", self.samples_written)?;
        writeln!(
            f,
            "  Dropped       : {} ({:.2}%)",
            self.samples_dropped, self.drop_rate_pct
        )?;
        writeln!(f, "  Pages posted  : {}", self.pages_posted)?;
        writeln!(f, "  Headband lost : {}", self.headband_dropped)?;
        writeln!(f, "  Reconnects    : {}", self.reconnects)?;
        match self.battery_pct {
            Some(pct) => writeln!(f, "  Battery       : {pct:.1}%")?,
            None => writeln!(f, "  Battery       : n/a")?,
        }
        write!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")
    }
}
