use std::path::PathBuf;

use bcistream_transport::RingLayout;

use crate::{AcquireError, AcquireResult};

/// Ключ SysV сегмента по умолчанию ("BCI\0")
pub const DEFAULT_SHM_KEY: i32 = 0x4243_4900;

/// Ключ набора семафоров по умолчанию
pub const DEFAULT_SEM_KEY: i32 = 0x4243_4901;

/// Источник payload (выбор при старте).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Встроенный симулятор гарнитуры (не требует железа).
    Simulated,
    /// Символьное устройство (RFCOMM / serial), например `/dev/rfcomm0`.
    Serial,
}

/// Куда уходят восстановленные сэмплы.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// SysV сегмент и семафоры; consumer - отдельный процесс.
    Sysv,
    /// Файл, отображённый в память, и внутрипроцессный consumer.
    File(PathBuf),
}

/// Полная конфигурация сессии захвата.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub device: DeviceKind,
    /// Путь к символьному устройству (для `Serial`)
    pub device_path: Option<PathBuf>,
    /// Частота сэмплов симулятора (Гц)
    pub sim_rate_hz: u32,
    pub transport: TransportKind,
    pub shm_key: i32,
    pub sem_key: i32,
    /// Страниц в кольце (2-4)
    pub page_count: usize,
    pub samples_per_page: usize,
    /// Удалить SysV объекты при выходе (только если их создали мы)
    pub remove_on_exit: bool,
    /// Ограничение по времени (None = до Ctrl+C)
    pub duration_secs: Option<u64>,
    /// Интервал вывода статистики (секунды)
    pub stats_interval_secs: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl AcquireConfig {
    pub fn layout(&self) -> AcquireResult<RingLayout> {
        Ok(RingLayout::new(self.page_count, self.samples_per_page)?)
    }

    /// Проверяет согласованность полей до открытия ресурсов.
    pub fn validate(&self) -> AcquireResult<()> {
        self.layout()?;

        if self.device == DeviceKind::Serial && self.device_path.is_none() {
            return Err(AcquireError::Config(
                "serial device requires a device path".to_string(),
            ));
        }
        if self.device == DeviceKind::Simulated && self.sim_rate_hz == 0 {
            return Err(AcquireError::Config(
                "simulated sample rate must be > 0".to_string(),
            ));
        }
        if self.transport == TransportKind::Sysv && self.shm_key == self.sem_key {
            return Err(AcquireError::Config(format!(
                "segment and semaphore keys must differ (both 0x{:08X})",
                self.shm_key
            )));
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для DeviceKind, TransportKind, AcquireConfig
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for DeviceKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DeviceKind::Simulated => write!(f, "sim"),
            DeviceKind::Serial => write!(f, "serial"),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" | "simulated" => Ok(DeviceKind::Simulated),
            "serial" | "rfcomm" => Ok(DeviceKind::Serial),
            _ => Err(format!("Unknown device type: '{s}'. Use: sim, serial")),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            TransportKind::Sysv => write!(f, "sysv"),
            TransportKind::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sysv") {
            return Ok(TransportKind::Sysv);
        }
        match s.strip_prefix("file:") {
            Some(path) if !path.is_empty() => Ok(TransportKind::File(PathBuf::from(path))),
            _ => Err(format!(
                "Unknown transport: '{s}'. Use: sysv, file:<path>"
            )),
        }
    }
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::Simulated,
            device_path: None,
            sim_rate_hz: 256,
            transport: TransportKind::Sysv,
            shm_key: DEFAULT_SHM_KEY,
            sem_key: DEFAULT_SEM_KEY,
            page_count: 3,
            samples_per_page: 256,
            remove_on_exit: false,
            duration_secs: None,
            stats_interval_secs: 5,
        }
    }
}

/// Парсит ключ IPC: десятичный или `0x` шестнадцатеричный.
///
/// # Примеры
/// ```
/// use bcistream_acquire::config::parse_key;
/// assert_eq!(parse_key("0x42434900").unwrap(), 0x4243_4900);
/// assert_eq!(parse_key("1234").unwrap(), 1234);
/// ```
pub fn parse_key(s: &str) -> Result<i32, String> {
    let s = s.trim();
    let lower = s.to_lowercase();

    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        // ключи SysV часто записывают как беззнаковые 32 бита
        u32::from_str_radix(hex, 16).map(|v| v as i32)
    } else {
        s.parse::<i32>()
    };

    parsed.map_err(|e| format!("Invalid IPC key '{s}': {e}"))
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("0x42434900").unwrap(), DEFAULT_SHM_KEY);
        assert_eq!(parse_key("0X10").unwrap(), 16);
        assert_eq!(parse_key(" 77 ").unwrap(), 77);
        assert_eq!(parse_key("0xFFFFFFFF").unwrap(), -1);
        assert!(parse_key("0x").is_err());
        assert!(parse_key("key").is_err());
    }

    #[test]
    fn test_device_kind_fromstr() {
        assert_eq!("sim".parse::<DeviceKind>().unwrap(), DeviceKind::Simulated);
        assert_eq!("RFCOMM".parse::<DeviceKind>().unwrap(), DeviceKind::Serial);
        assert!("hackrf".parse::<DeviceKind>().is_err());
        assert_eq!(DeviceKind::Serial.to_string(), "serial");
    }

    #[test]
    fn test_transport_kind_fromstr() {
        assert_eq!("sysv".parse::<TransportKind>().unwrap(), TransportKind::Sysv);
        assert_eq!(
            "file:/dev/shm/eeg".parse::<TransportKind>().unwrap(),
            TransportKind::File(PathBuf::from("/dev/shm/eeg"))
        );
        assert!("file:".parse::<TransportKind>().is_err());
        assert!("tcp".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_default_is_valid() {
        let cfg = AcquireConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.layout().unwrap().capacity(), 768);
    }

    #[test]
    fn test_validate_rejects_inconsistent_config() {
        let cfg = AcquireConfig {
            device: DeviceKind::Serial,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(AcquireError::Config(_))));

        let cfg = AcquireConfig {
            page_count: 5,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(AcquireError::Transport(_))));

        let cfg = AcquireConfig {
            sem_key: DEFAULT_SHM_KEY,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
