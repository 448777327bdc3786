/// Состояние батареи (sub-packet 0xB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    /// Заряд в процентах × 512
    pub charge_raw: u16,
    pub fuel_gauge_mv: u16,
    pub adc_mv: u16,
    pub temperature_c: i16,
}

/// Служебные данные гарнитуры, не относящиеся к EEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Telemetry {
    /// Битовая маска ошибок гарнитуры
    ErrorFlags(u32),
    Battery(BatteryStatus),
    /// Три оси акселерометра, 10 бит каждая
    Accelerometer([i32; 3]),
    /// Уровни DRL и REF электродов, 10 бит каждый
    DrlRef { drl: i32, reference: i32 },
}

impl BatteryStatus {
    /// Заряд в процентах (0.0-100.0).
    pub fn charge_pct(&self) -> f64 {
        self.charge_raw as f64 / 512.0
    }
}
