//! Сторона чтения кольца: ждёт заполненную страницу, читает её целиком и
//! возвращает в пул свободных.
//!
//! Число прочитанных страниц хранится в трейлере сегмента, поэтому
//! перезапущенный consumer продолжает с той страницы, которую producer
//! отправил следующей, а не с нулевой.

use std::time::Duration;

use log::info;

use bcistream_types::{SampleVector, TransportResult};

use crate::{counters::PageCounters, layout::RingLayout, region::SharedRegion};

pub struct RingConsumer<R: SharedRegion, C: PageCounters> {
    region: R,
    counters: C,
    layout: RingLayout,
    page: usize,
    /// Прочитано страниц за всё время жизни сегмента
    consumed: u64,
    /// Прочитано этим consumer
    drained: u64,
}

impl<R: SharedRegion, C: PageCounters> RingConsumer<R, C> {
    pub fn new(
        region: R,
        counters: C,
        layout: RingLayout,
    ) -> TransportResult<Self> {
        layout.check_region(region.len())?;

        let trailer = layout.read_trailer(region.as_slice());
        let page = trailer.consumer_page(layout.page_count());
        if trailer.consumed > 0 {
            info!(
                "Resuming ring at page {page} ({} pages consumed, {} posted)",
                trailer.consumed, trailer.posted
            );
        }

        Ok(Self {
            region,
            counters,
            layout,
            page,
            consumed: trailer.consumed,
            drained: 0,
        })
    }

    /// Следующая заполненная страница. `None` - таймаут без данных.
    pub fn next_page(
        &mut self,
        timeout: Option<Duration>,
    ) -> TransportResult<Option<Vec<SampleVector>>> {
        if !self.counters.await_filled_page(timeout)? {
            return Ok(None);
        }

        let mut samples = Vec::with_capacity(self.layout.samples_per_page());
        self.read_page_into(&mut samples);
        self.counters.recycle_page()?;

        self.page = self.layout.next_page(self.page);
        self.consumed += 1;
        self.drained += 1;
        self.layout
            .write_consumed(self.region.as_mut_slice(), self.consumed);

        Ok(Some(samples))
    }

    fn read_page_into(
        &self,
        out: &mut Vec<SampleVector>,
    ) {
        let bytes = self.region.as_slice();
        for i in 0..self.layout.samples_per_page() {
            let off = self.layout.sample_offset(self.page, i);
            out.push(SampleVector::read_ne(&bytes[off..]));
        }
    }

    /// Сколько сэмплов отбросил producer (из трейлера сегмента).
    pub fn producer_dropped(&self) -> u64 {
        self.layout.read_trailer(self.region.as_slice()).dropped
    }

    /// Сколько страниц отправил producer (из трейлера сегмента).
    pub fn producer_posted(&self) -> u64 {
        self.layout.read_trailer(self.region.as_slice()).posted
    }

    /// Индекс страницы, которая будет прочитана следующей.
    pub fn current_page(&self) -> usize {
        self.page
    }

    pub fn drained(&self) -> u64 {
        self.drained
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }
}
