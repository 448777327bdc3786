//! Цикл consumer: общий для `bcistream-drain` и внутрипроцессного
//! consumer файлового транспорта.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use bcistream_transport::{PageCounters, RingConsumer, SharedRegion};
use bcistream_types::SampleVector;

use crate::AcquireResult;

/// Итог работы consumer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub pages: u64,
    pub samples: u64,
    /// Сколько сэмплов отбросил producer (по трейлеру сегмента)
    pub producer_dropped: u64,
}

/// Вычитывает страницы до установки `stop`, передавая каждую в `on_page`.
///
/// После остановки забирает уже отправленные страницы без ожидания.
pub fn drain_pages<R, C, F>(
    consumer: &mut RingConsumer<R, C>,
    stop: &AtomicBool,
    poll: Duration,
    mut on_page: F,
) -> AcquireResult<DrainStats>
where
    R: SharedRegion,
    C: PageCounters,
    F: FnMut(&[SampleVector], &DrainStats),
{
    let mut stats = DrainStats::default();

    while !stop.load(Ordering::Acquire) {
        if let Some(page) = consumer.next_page(Some(poll))? {
            record(&mut stats, consumer, &page);
            on_page(&page, &stats);
        }
    }

    while let Some(page) = consumer.next_page(Some(Duration::ZERO))? {
        record(&mut stats, consumer, &page);
        on_page(&page, &stats);
    }

    stats.producer_dropped = consumer.producer_dropped();
    Ok(stats)
}

fn record<R: SharedRegion, C: PageCounters>(
    stats: &mut DrainStats,
    consumer: &RingConsumer<R, C>,
    page: &[SampleVector],
) {
    stats.pages += 1;
    stats.samples += page.len() as u64;
    stats.producer_dropped = consumer.producer_dropped();
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use bcistream_transport::{
        ChannelCounters, MappedConsumer, MappedProducer, MappedRegion, RingLayout, SampleSink,
    };

    use super::*;

    #[test]
    fn test_drains_pages_posted_before_stop() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let layout = RingLayout::new(4, 2).unwrap();
        let counters = ChannelCounters::new(4);

        let mut producer = MappedProducer::new(
            MappedRegion::create(tmp.path(), layout.segment_size()).unwrap(),
            counters.clone(),
            layout,
        )
        .unwrap();
        let mut consumer = MappedConsumer::new(
            MappedRegion::open(tmp.path(), layout.segment_size()).unwrap(),
            counters,
            layout,
        )
        .unwrap();

        // 10 сэмплов: 4 страницы по 2, остальные 2 отброшены
        for v in 0..10 {
            producer.append(&SampleVector::new([v; 4])).unwrap();
        }

        let stop = Arc::new(AtomicBool::new(true));
        let mut seen = Vec::new();
        let stats = drain_pages(&mut consumer, &stop, Duration::from_millis(5), |page, _| {
            seen.extend(page.iter().map(|s| s.0[0]))
        })
        .unwrap();

        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(
            stats,
            DrainStats {
                pages: 4,
                samples: 8,
                producer_dropped: 2
            }
        );
    }

    #[test]
    fn test_stops_on_flag() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let layout = RingLayout::new(2, 2).unwrap();
        MappedRegion::create(tmp.path(), layout.segment_size()).unwrap();

        let mut consumer = MappedConsumer::new(
            MappedRegion::open(tmp.path(), layout.segment_size()).unwrap(),
            ChannelCounters::new(2),
            layout,
        )
        .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            stop_clone.store(true, Ordering::Relaxed);
        });

        let stats =
            drain_pages(&mut consumer, &stop, Duration::from_millis(5), |_, _| {}).unwrap();
        assert_eq!(stats.pages, 0);
    }
}
