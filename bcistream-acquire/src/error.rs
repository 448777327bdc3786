use bcistream_core::EncodeError;
use bcistream_types::TransportError;
use thiserror::Error;

pub type AcquireResult<T> = std::result::Result<T, AcquireError>;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// Гарнитура не найдена
    #[error("Headband device not found: {0}")]
    DeviceNotFound(String),

    /// Ошибка чтения с гарнитуры
    #[error("Headband device error: {0}")]
    DeviceError(String),

    /// Ошибка транспорта (сегмент, семафоры)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Ошибка кодирования в симуляторе
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка пайплайна (inter-thread)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Несогласованная конфигурация
    #[error("Invalid configuration: {0}")]
    Config(String),
}
