use std::{
    thread,
    time::{Duration, Instant},
};

use bcistream_transport::{
    AppendOutcome, ChannelCounters, MappedConsumer, MappedProducer, MappedRegion, PageCounters,
    RingLayout, SampleSink,
};
use bcistream_types::SampleVector;

// ===========================================================================
// Helpers
// ===========================================================================

fn ring(
    pages: usize,
    per_page: usize,
) -> (MappedProducer, MappedConsumer, tempfile::NamedTempFile) {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let layout = RingLayout::new(pages, per_page).unwrap();
    let counters = ChannelCounters::new(pages);

    let producer = MappedProducer::new(
        MappedRegion::create(tmp.path(), layout.segment_size()).unwrap(),
        counters.clone(),
        layout,
    )
    .unwrap();
    let consumer = MappedConsumer::new(
        MappedRegion::open(tmp.path(), layout.segment_size()).unwrap(),
        counters,
        layout,
    )
    .unwrap();

    (producer, consumer, tmp)
}

fn sample(n: i32) -> SampleVector {
    SampleVector::new([n, -n, n * 2, n.wrapping_mul(1000)])
}

// ===========================================================================
// Сценарии
// ===========================================================================

#[test]
fn test_overflow_drops_exactly_the_excess() {
    let (mut producer, mut consumer, _tmp) = ring(3, 16);
    let capacity = producer.layout().capacity();
    let excess = 37;

    let mut dropped = 0;
    for n in 0..(capacity + excess) as i32 {
        if producer.append(&sample(n)).unwrap() == AppendOutcome::Dropped {
            dropped += 1;
        }
    }

    assert_eq!(dropped, excess);
    assert_eq!(producer.dropped(), excess as u64);
    assert_eq!(consumer.producer_dropped(), excess as u64);

    // в кольце лежат первые capacity сэмплов
    let mut n = 0;
    while let Some(page) = consumer.next_page(Some(Duration::ZERO)).unwrap() {
        for s in page {
            assert_eq!(s, sample(n));
            n += 1;
        }
    }
    assert_eq!(n as usize, capacity);
}

#[test]
fn test_append_is_prompt_while_consumer_paused() {
    let (mut producer, _consumer, _tmp) = ring(2, 8);

    let start = Instant::now();
    for n in 0..100_000 {
        producer.append(&sample(n)).unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(producer.dropped(), 100_000 - 16);
}

#[test]
fn test_recycled_pages_are_reused_in_order() {
    let (mut producer, mut consumer, _tmp) = ring(2, 4);

    let mut expected = 0;
    for n in 0..64 {
        assert_ne!(producer.append(&sample(n)).unwrap(), AppendOutcome::Dropped);
        if let Some(page) = consumer.next_page(Some(Duration::ZERO)).unwrap() {
            for s in page {
                assert_eq!(s, sample(expected));
                expected += 1;
            }
        }
    }

    assert_eq!(expected, 64);
    assert_eq!(producer.dropped(), 0);
    assert_eq!(consumer.drained(), 16);
}

#[test]
fn test_consumer_thread_sees_every_posted_page() {
    let (mut producer, mut consumer, _tmp) = ring(4, 32);
    let total_pages = 50u64;

    let handle = thread::spawn(move || {
        let mut next = 0;
        for _ in 0..total_pages {
            let page = consumer
                .next_page(Some(Duration::from_secs(5)))
                .unwrap()
                .expect("page expected");
            for s in page {
                assert_eq!(s, sample(next));
                next += 1;
            }
        }
        consumer.producer_dropped()
    });

    // producer не ждёт: при переполнении сэмпл повторяется позже
    let mut n = 0;
    while (n as u64) < total_pages * 32 {
        match producer.append(&sample(n)).unwrap() {
            AppendOutcome::Dropped => thread::sleep(Duration::from_micros(50)),
            _ => n += 1,
        }
    }

    let dropped = handle.join().unwrap();
    assert_eq!(dropped, producer.dropped());
    assert_eq!(producer.counters().snapshot().unwrap().filled, 0);
}

#[cfg(target_os = "linux")]
#[test]
fn test_sysv_ring_between_two_attachments() {
    use bcistream_transport::{SysvConsumer, SysvProducer, SysvSegment, SysvSemaphores};

    let base = 0x5200_0000 | ((std::process::id() as i32 & 0x7FFF) << 8);
    let layout = RingLayout::new(2, 4).unwrap();

    let segment = match SysvSegment::open_or_create(base, layout.segment_size()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("SysV IPC unavailable, skipping: {e}");
            return;
        }
    };
    let sems = SysvSemaphores::open_or_create(base + 1, layout.page_count()).unwrap();
    let mut producer = SysvProducer::new(segment, sems, layout).unwrap();

    let mut consumer = SysvConsumer::new(
        SysvSegment::attach(base, layout.segment_size()).unwrap(),
        SysvSemaphores::attach(base + 1).unwrap(),
        layout,
    )
    .unwrap();

    for n in 0..10 {
        producer.append(&sample(n)).unwrap();
    }
    assert_eq!(producer.dropped(), 2);

    let page = consumer
        .next_page(Some(Duration::from_millis(100)))
        .unwrap()
        .unwrap();
    assert_eq!(page, (0..4).map(sample).collect::<Vec<_>>());
    assert_eq!(consumer.producer_dropped(), 2);
    assert_eq!(consumer.producer_posted(), 2);

    drop(consumer);
    let (segment, sems) = producer.into_parts();
    sems.remove().unwrap();
    segment.remove().unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_sysv_consumer_restart_resumes_at_next_posted_page() {
    use bcistream_transport::{SysvConsumer, SysvProducer, SysvSegment, SysvSemaphores};

    let base = 0x5200_0000 | ((std::process::id() as i32 & 0x7FFF) << 8) | 0x10;
    let layout = RingLayout::new(2, 4).unwrap();

    let segment = match SysvSegment::open_or_create(base, layout.segment_size()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("SysV IPC unavailable, skipping: {e}");
            return;
        }
    };
    let sems = SysvSemaphores::open_or_create(base + 1, layout.page_count()).unwrap();
    let mut producer = SysvProducer::new(segment, sems, layout).unwrap();

    let attach = || {
        SysvConsumer::new(
            SysvSegment::attach(base, layout.segment_size()).unwrap(),
            SysvSemaphores::attach(base + 1).unwrap(),
            layout,
        )
        .unwrap()
    };
    let timeout = Some(Duration::from_millis(100));

    for n in 0..8 {
        producer.append(&sample(n)).unwrap();
    }

    let mut first = attach();
    assert_eq!(
        first.next_page(timeout).unwrap().unwrap(),
        (0..4).map(sample).collect::<Vec<_>>()
    );
    drop(first);

    // страница 0 снова у producer
    producer.append(&sample(100)).unwrap();

    let mut second = attach();
    assert_eq!(
        second.next_page(timeout).unwrap().unwrap(),
        (4..8).map(sample).collect::<Vec<_>>()
    );
    assert!(second.next_page(Some(Duration::from_millis(5))).unwrap().is_none());

    drop(second);
    let (segment, sems) = producer.into_parts();
    sems.remove().unwrap();
    segment.remove().unwrap();
}
