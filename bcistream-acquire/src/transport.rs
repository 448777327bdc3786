//! Открытие транспорта по конфигурации.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};

use bcistream_transport::{
    AppendOutcome, ChannelCounters, MappedConsumer, MappedProducer, MappedRegion, SampleSink,
};
use bcistream_types::{SampleVector, TransportResult};

#[cfg(target_os = "linux")]
use bcistream_transport::{SysvProducer, SysvSegment, SysvSemaphores};

use crate::{drain::drain_pages, AcquireConfig, AcquireError, AcquireResult, DrainStats, TransportKind};

/// Таймаут ожидания страницы внутрипроцессным consumer
const LOCAL_POLL: Duration = Duration::from_millis(50);

/// Consumer файлового транспорта, работающий в отдельном потоке.
pub struct LocalDrain {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<AcquireResult<DrainStats>>,
}

impl LocalDrain {
    fn spawn(mut consumer: MappedConsumer) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();

        let handle = thread::spawn(move || {
            drain_pages(&mut consumer, &stop_thread, LOCAL_POLL, |page, stats| {
                if let Some(first) = page.first() {
                    debug!("Page {} drained, first sample {:?}", stats.pages, first.0);
                }
            })
        });

        Self { stop, handle }
    }

    /// Останавливает consumer и дожидается его.
    pub fn finish(self) -> AcquireResult<DrainStats> {
        self.stop.store(true, Ordering::Release);
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(AcquireError::Pipeline("drain thread panicked".to_string())),
        }
    }
}

/// Producer сессии вместе с ресурсами, которые надо закрыть в конце.
pub enum RingSink {
    #[cfg(target_os = "linux")]
    Sysv {
        producer: SysvProducer,
        remove_on_exit: bool,
    },
    File {
        producer: MappedProducer,
        drain: LocalDrain,
    },
}

impl RingSink {
    pub fn open(config: &AcquireConfig) -> AcquireResult<Self> {
        let layout = config.layout()?;

        match &config.transport {
            #[cfg(target_os = "linux")]
            TransportKind::Sysv => {
                let segment = SysvSegment::open_or_create(config.shm_key, layout.segment_size())?;
                let sems = SysvSemaphores::open_or_create(config.sem_key, layout.page_count())?;

                info!(
                    "SysV transport: shm=0x{:08X} sem=0x{:08X}, {} pages × {} samples",
                    config.shm_key,
                    config.sem_key,
                    layout.page_count(),
                    layout.samples_per_page()
                );

                Ok(RingSink::Sysv {
                    producer: SysvProducer::new(segment, sems, layout)?,
                    remove_on_exit: config.remove_on_exit,
                })
            }
            #[cfg(not(target_os = "linux"))]
            TransportKind::Sysv => Err(AcquireError::Config(
                "SysV transport is only available on Linux; use file:<path>".to_string(),
            )),
            TransportKind::File(path) => {
                let counters = ChannelCounters::new(layout.page_count());
                let region = MappedRegion::create(path, layout.segment_size())?;
                let producer = MappedProducer::new(region, counters.clone(), layout)?;

                let consumer = MappedConsumer::new(
                    MappedRegion::open(path, layout.segment_size())?,
                    counters,
                    layout,
                )?;

                info!(
                    "File transport: {}, {} pages × {} samples, in-process consumer",
                    path.display(),
                    layout.page_count(),
                    layout.samples_per_page()
                );

                Ok(RingSink::File {
                    producer,
                    drain: LocalDrain::spawn(consumer),
                })
            }
        }
    }

    fn producer(&mut self) -> &mut dyn SampleSink {
        match self {
            #[cfg(target_os = "linux")]
            RingSink::Sysv { producer, .. } => producer,
            RingSink::File { producer, .. } => producer,
        }
    }

    fn producer_ref(&self) -> &dyn SampleSink {
        match self {
            #[cfg(target_os = "linux")]
            RingSink::Sysv { producer, .. } => producer,
            RingSink::File { producer, .. } => producer,
        }
    }

    /// Закрывает транспорт. Занятая producer страница возвращается в
    /// пул; SysV сегмент отсоединяется и удаляется только по
    /// `remove_on_exit`.
    pub fn close(self) -> AcquireResult<Option<DrainStats>> {
        match self {
            #[cfg(target_os = "linux")]
            RingSink::Sysv {
                producer,
                remove_on_exit,
            } => {
                let (segment, sems) = producer.into_parts();
                if remove_on_exit {
                    if let Err(e) = sems.remove() {
                        warn!("Failed to remove semaphore set: {e}");
                    }
                    segment.remove()?;
                    info!("SysV segment and semaphores removed");
                }
                Ok(None)
            }
            RingSink::File {
                mut producer,
                drain,
            } => {
                // заполненная страница уходит consumer до его остановки
                if let Err(e) = producer.close() {
                    warn!("Failed to release open page: {e}");
                }
                let stats = drain.finish()?;
                info!(
                    "In-process consumer drained {} pages ({} samples)",
                    stats.pages, stats.samples
                );
                Ok(Some(stats))
            }
        }
    }
}

impl SampleSink for RingSink {
    fn append(
        &mut self,
        sample: &SampleVector,
    ) -> TransportResult<AppendOutcome> {
        self.producer().append(sample)
    }

    fn dropped(&self) -> u64 {
        self.producer_ref().dropped()
    }

    fn posted(&self) -> u64 {
        self.producer_ref().posted()
    }
}
