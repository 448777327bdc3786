//! Протокол EEG гарнитуры
//!
//! Разбор radio payload на sub-packet, декодирование несжатых сэмплов и
//! сжатых блоков (унарное частное + остаток переменной ширины + знак),
//! восстановление абсолютных значений каналов.
//!
//! # Быстрый старт
//!
//! ```
//! use bcistream_core::{encode_uncompressed, Decoder};
//!
//! let mut decoder = Decoder::new();
//! let payload = encode_uncompressed(&[100, 200, 300, 400], None);
//!
//! let report = decoder.decode_payload(&payload)?;
//! assert_eq!(report.samples[0].0, [100, 200, 300, 400]);
//! # Ok::<(), bcistream_types::ProtocolError>(())
//! ```

pub mod bits;
pub mod compressed;
pub mod decoder;
pub mod encoder;
pub mod framer;
pub mod reconstructor;
pub mod telemetry;
pub mod uncompressed;

pub use bits::*;
pub use compressed::*;
pub use decoder::*;
pub use encoder::*;
pub use framer::*;
pub use reconstructor::*;
pub use telemetry::*;
pub use uncompressed::*;

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
