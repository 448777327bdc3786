//! Межпроцессное кольцо страниц для EEG сэмплов.
//!
//! Producer (поток чтения радио) никогда не блокируется: если свободной
//! страницы нет, сэмпл отбрасывается и учитывается. Consumer - отдельный
//! процесс, ждёт заполненную страницу, вычитывает её и возвращает в пул.
//! Единственная синхронизация - пара счётчиков [`PageCounters`].

pub mod consumer;
pub mod counters;
pub mod layout;
pub mod producer;
pub mod region;
#[cfg(target_os = "linux")]
pub mod sysv;

pub use consumer::*;
pub use counters::*;
pub use layout::*;
pub use producer::*;
pub use region::*;
#[cfg(target_os = "linux")]
pub use sysv::*;

/// Producer поверх SysV сегмента и семафоров.
#[cfg(target_os = "linux")]
pub type SysvProducer = RingProducer<SysvSegment, SysvSemaphores>;

/// Consumer поверх SysV сегмента и семафоров.
#[cfg(target_os = "linux")]
pub type SysvConsumer = RingConsumer<SysvSegment, SysvSemaphores>;

/// Producer поверх файла и внутрипроцессных счётчиков.
pub type MappedProducer = RingProducer<MappedRegion, ChannelCounters>;

/// Consumer поверх файла и внутрипроцессных счётчиков.
pub type MappedConsumer = RingConsumer<MappedRegion, ChannelCounters>;
