// Симулятор выдаёт payload в том же формате, что и гарнитура: sync,
// периодический несжатый сэмпл для ресинхронизации, сжатый блок из 16
// сэмплов и изредка батарею. Темп задаётся sim_rate_hz, как у реального
// устройства. Значения - случайное блуждание в 10-битном диапазоне,
// чтобы несжатый сэмпл совпадал с восстановленным состоянием.

use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use log::{info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use bcistream_core::{encode_deltas, encode_uncompressed, DeltaBlock, MAX_10BIT};
use bcistream_types::{SubPacketKind, CHANNEL_COUNT, DELTAS_PER_CHANNEL};

use crate::{AcquireConfig, AcquireError, AcquireResult, DeviceKind};

/// Синхрослово в начале каждого payload симулятора
pub const SYNC_WORD: [u8; 4] = [0xFF, 0xFF, 0xAA, 0x55];

/// Результат одного чтения с гарнитуры.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRead {
    /// В буфере лежит очередной payload.
    Payload,
    /// Соединение восстановлено; состояние каналов нужно сбросить.
    Reconnected,
    /// Источник исчерпан.
    Closed,
}

/// Абстракция гарнитуры. Выбирается один раз из конфигурации.
///
/// Реализации: [`SimulatedDevice`], [`SerialDevice`].
pub trait HeadbandDevice: Send {
    /// Информация об устройстве
    fn info(&self) -> DeviceInfo;

    /// Блокирующее чтение одного payload в `buf` (буфер очищается).
    fn read_payload(
        &mut self,
        buf: &mut Vec<u8>,
    ) -> AcquireResult<DeviceRead>;
}

/// Информация об устройстве (для логирования).
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub address: Option<String>,
    /// Номинальная частота сэмплов, если известна
    pub sample_rate_hz: Option<u32>,
}

/// Генератор синтетического EEG потока.
pub struct SimulatedDevice {
    pub sample_rate_hz: u32,
    /// Несжатый сэмпл каждые N payload
    pub resync_every: u64,
    /// Батарея каждые N payload
    pub battery_every: u64,
    /// Имитация переподключения каждые N payload (None = никогда)
    pub reconnect_every: Option<u64>,
    /// Без синхронизации по реальному времени
    pub unpaced: bool,
    values: [i32; CHANNEL_COUNT],
    /// Следующий payload начнётся с несжатого сэмпла
    resync_pending: bool,
    rng: StdRng,
    payloads: u64,
    samples: u64,
    started: Option<Instant>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SimulatedDevice {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self::with_seed(sample_rate_hz, rand::random())
    }

    /// Детерминированный поток (для тестов).
    pub fn with_seed(
        sample_rate_hz: u32,
        seed: u64,
    ) -> Self {
        Self {
            sample_rate_hz,
            resync_every: 8,
            battery_every: 32,
            reconnect_every: None,
            unpaced: false,
            values: [512; CHANNEL_COUNT],
            resync_pending: false,
            rng: StdRng::seed_from_u64(seed),
            payloads: 0,
            samples: 0,
            started: None,
        }
    }

    /// Текущее значение каналов (последний выданный сэмпл).
    pub fn values(&self) -> &[i32; CHANNEL_COUNT] {
        &self.values
    }

    /// Шаг случайного блуждания, не выходящий за 10 бит.
    fn next_deltas(&mut self) -> DeltaBlock {
        let mut deltas = [[0i32; DELTAS_PER_CHANNEL]; CHANNEL_COUNT];
        for (value, ch) in self.values.iter_mut().zip(deltas.iter_mut()) {
            for d in ch.iter_mut() {
                let step = self.rng.gen_range(-12..=12);
                let next = (*value + step).clamp(0, MAX_10BIT);
                *d = next - *value;
                *value = next;
            }
        }
        deltas
    }

    fn battery_bytes(&mut self) -> [u8; 9] {
        let charge_pct = 100 - (self.payloads / 1_000).min(100) as u16;
        let charge_raw = charge_pct * 512;
        let fuel_mv: u16 = 3_700 + self.rng.gen_range(0..200);
        let temp_c: i16 = 30;

        let mut out = [0u8; 9];
        out[0] = SubPacketKind::Battery.type_byte(false);
        out[1..3].copy_from_slice(&charge_raw.to_be_bytes());
        out[3..5].copy_from_slice(&fuel_mv.to_be_bytes());
        out[5..7].copy_from_slice(&fuel_mv.to_be_bytes());
        out[7..9].copy_from_slice(&temp_c.to_be_bytes());
        out
    }

    fn pace(&mut self) {
        if self.unpaced {
            return;
        }
        let start = *self.started.get_or_insert_with(Instant::now);

        // pacing - синхронизация по реальному времени
        let period_ns = 1_000_000_000f64 / self.sample_rate_hz as f64;
        let expected = Duration::from_nanos((self.samples as f64 * period_ns) as u64);
        let elapsed = start.elapsed();

        if expected > elapsed {
            thread::sleep(expected - elapsed);
        }
    }
}

impl HeadbandDevice for SimulatedDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Simulated headband".to_string(),
            address: Some("SIM-0001".to_string()),
            sample_rate_hz: Some(self.sample_rate_hz),
        }
    }

    fn read_payload(
        &mut self,
        buf: &mut Vec<u8>,
    ) -> AcquireResult<DeviceRead> {
        buf.clear();
        self.pace();

        if let Some(n) = self.reconnect_every {
            if self.payloads > 0 && self.payloads % n == 0 && !self.resync_pending {
                self.values = [512; CHANNEL_COUNT];
                self.resync_pending = true;
                return Ok(DeviceRead::Reconnected);
            }
        }

        buf.extend_from_slice(&SYNC_WORD);

        if self.resync_pending || self.payloads % self.resync_every.max(1) == 0 {
            buf.extend_from_slice(&encode_uncompressed(&self.values, None));
            self.samples += 1;
            self.resync_pending = false;
        }

        let deltas = self.next_deltas();
        buf.extend_from_slice(&encode_deltas(&deltas)?);
        self.samples += DELTAS_PER_CHANNEL as u64;

        if self.payloads % self.battery_every.max(1) == self.battery_every.max(1) - 1 {
            let battery = self.battery_bytes();
            buf.extend_from_slice(&battery);
        }

        self.payloads += 1;
        Ok(DeviceRead::Payload)
    }
}

/// Гарнитура за символьным устройством (RFCOMM / serial).
///
/// Один `read` - один payload. При EOF или ошибке чтения устройство
/// переоткрывается; после `max_reconnects` неудач источник закрыт.
pub struct SerialDevice {
    path: PathBuf,
    file: File,
    pub read_size: usize,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    reconnects: u32,
}

impl SerialDevice {
    pub fn open(path: &Path) -> AcquireResult<Self> {
        let file = File::open(path).map_err(|e| {
            AcquireError::DeviceNotFound(format!("{}: {e}", path.display()))
        })?;

        info!("Opened headband device {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            read_size: 512,
            max_reconnects: 5,
            reconnect_delay: Duration::from_secs(1),
            reconnects: 0,
        })
    }

    fn reopen(&mut self) -> AcquireResult<DeviceRead> {
        while self.reconnects < self.max_reconnects {
            self.reconnects += 1;
            thread::sleep(self.reconnect_delay);

            match File::open(&self.path) {
                Ok(file) => {
                    self.file = file;
                    info!(
                        "Reconnected to {} (attempt {})",
                        self.path.display(),
                        self.reconnects
                    );
                    return Ok(DeviceRead::Reconnected);
                }
                Err(e) => warn!(
                    "Reconnect to {} failed (attempt {}): {e}",
                    self.path.display(),
                    self.reconnects
                ),
            }
        }

        info!(
            "Giving up on {} after {} reconnects",
            self.path.display(),
            self.reconnects
        );
        Ok(DeviceRead::Closed)
    }
}

impl HeadbandDevice for SerialDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial headband".to_string(),
            address: Some(self.path.display().to_string()),
            sample_rate_hz: None,
        }
    }

    fn read_payload(
        &mut self,
        buf: &mut Vec<u8>,
    ) -> AcquireResult<DeviceRead> {
        buf.clear();
        buf.resize(self.read_size, 0);

        loop {
            match self.file.read(buf) {
                Ok(0) => {
                    buf.clear();
                    warn!("{}: end of stream", self.path.display());
                    return self.reopen();
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(DeviceRead::Payload);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    buf.clear();
                    warn!("{}: read failed: {e}", self.path.display());
                    return self.reopen();
                }
            }
        }
    }
}

/// Создаёт нужное устройство по конфигурации.
pub fn create_device(config: &AcquireConfig) -> AcquireResult<Box<dyn HeadbandDevice>> {
    match &config.device {
        DeviceKind::Simulated => Ok(Box::new(SimulatedDevice::new(config.sim_rate_hz))),
        DeviceKind::Serial => {
            let path = config.device_path.as_deref().ok_or_else(|| {
                AcquireError::DeviceNotFound("no device path configured".to_string())
            })?;
            Ok(Box::new(SerialDevice::open(path)?))
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
