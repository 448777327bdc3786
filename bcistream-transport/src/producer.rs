//! Сторона записи кольца.

use std::{mem::ManuallyDrop, ptr};

use log::{info, warn};

use bcistream_types::{SampleVector, TransportError, TransportResult};

use crate::{
    counters::PageCounters,
    layout::{RingLayout, TrailerCounts},
    region::SharedRegion,
};

/// Результат одного `append`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Сэмпл записан в открытую страницу.
    Written,
    /// Сэмпл записан и закрыл страницу; consumer уведомлён.
    Posted,
    /// Свободной страницы нет; сэмпл отброшен и учтён.
    Dropped,
}

/// Приёмник восстановленных сэмплов.
///
/// Реализация не должна блокироваться: поток чтения радио не ждёт
/// consumer.
pub trait SampleSink {
    fn append(
        &mut self,
        sample: &SampleVector,
    ) -> TransportResult<AppendOutcome>;

    /// Отброшено сэмплов с начала сессии.
    fn dropped(&self) -> u64;

    /// Отправлено заполненных страниц.
    fn posted(&self) -> u64;
}

/// Producer кольца страниц.
///
/// Страница занимается неблокирующим down на счётчике свободных при
/// записи первого сэмпла; после заполнения отдаётся consumer. Открытая
/// страница возвращается в пул в [`RingProducer::close`] и при drop.
pub struct RingProducer<R: SharedRegion, C: PageCounters> {
    region: R,
    counters: C,
    layout: RingLayout,
    page: usize,
    cursor: usize,
    page_open: bool,
    dropped: u64,
    posted: u64,
}

impl<R: SharedRegion, C: PageCounters> RingProducer<R, C> {
    /// Подключает producer к сегменту.
    ///
    /// Позиция и счётчики берутся из трейлера, так что после перезапуска
    /// запись продолжается со следующей по кругу страницы. Страницы,
    /// которые не свободны, не ждут consumer и не у него, считаются
    /// брошенными прежним producer и возвращаются в пул.
    pub fn new(
        mut region: R,
        counters: C,
        layout: RingLayout,
    ) -> TransportResult<Self> {
        layout.check_region(region.len())?;

        let page_count = layout.page_count();
        let mut trailer = layout.read_trailer(region.as_slice());
        let outstanding = match trailer.outstanding(page_count) {
            Some(n) => n,
            None => {
                warn!("Segment trailer {trailer:?} does not fit a {page_count}-page ring, resetting");
                layout.reset_trailer(region.as_mut_slice());
                trailer = TrailerCounts::default();
                0
            }
        };

        // трейлер читается раньше счётчиков: recycle между чтениями
        // только завышает сумму
        let snap = counters.snapshot()?;
        if snap.available + snap.filled > page_count {
            return Err(TransportError::counter(format!(
                "counters {snap:?} exceed page count {page_count}"
            )));
        }

        let lost = page_count.saturating_sub(snap.available + outstanding.max(snap.filled));
        if lost > 0 {
            warn!("Reclaiming {lost} page(s) held by a previous producer");
            counters.reclaim_pages(lost)?;
        }

        if trailer.posted > 0 {
            info!(
                "Resuming ring at page {} ({} pages posted, {} consumed)",
                trailer.producer_page(page_count),
                trailer.posted,
                trailer.consumed
            );
        }

        Ok(Self {
            region,
            counters,
            layout,
            page: trailer.producer_page(page_count),
            cursor: 0,
            page_open: false,
            dropped: trailer.dropped,
            posted: trailer.posted,
        })
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    pub fn counters(&self) -> &C {
        &self.counters
    }

    /// Индекс страницы, в которую пойдёт следующий сэмпл.
    pub fn current_page(&self) -> usize {
        self.page
    }

    /// Сэмплов в открытой странице.
    pub fn pending(&self) -> usize {
        self.cursor
    }

    /// Завершает запись: заполненную, но не отправленную страницу ещё
    /// раз пытается отправить, недописанную возвращает в пул свободных.
    /// Сэмплы недописанной страницы до consumer не доходят.
    pub fn close(&mut self) -> TransportResult<()> {
        if !self.page_open {
            return Ok(());
        }

        if self.cursor == self.layout.samples_per_page() {
            match self.post_page() {
                Ok(()) => return Ok(()),
                Err(e) => warn!("Failed to post page {} on close: {e}", self.page),
            }
        }

        if self.cursor > 0 {
            info!(
                "Releasing page {} with {} unsent sample(s)",
                self.page, self.cursor
            );
        }
        self.counters.release_page()?;
        self.page_open = false;
        self.cursor = 0;
        Ok(())
    }

    /// Закрывает producer и отдаёт регион и счётчики (например, для
    /// удаления SysV объектов).
    pub fn into_parts(self) -> (R, C) {
        let mut this = ManuallyDrop::new(self);
        if let Err(e) = this.close() {
            warn!("Failed to release open page: {e}");
        }
        // SAFETY: `this` не используется и не дропается после чтения
        // полей; остальные поля не владеют ресурсами.
        unsafe { (ptr::read(&this.region), ptr::read(&this.counters)) }
    }

    fn sync_trailer(&mut self) {
        self.layout
            .write_producer_counts(self.region.as_mut_slice(), self.dropped, self.posted);
    }

    fn count_drop(&mut self) {
        self.dropped += 1;
        self.sync_trailer();
    }

    /// Отправляет заполненную страницу. При ошибке страница остаётся
    /// занятой и заполненной: post повторяется при следующем `append`.
    fn post_page(&mut self) -> TransportResult<()> {
        // трейлер до post, чтобы consumer видел счётчик не меньше числа
        // полученных страниц
        self.posted += 1;
        self.sync_trailer();

        if let Err(e) = self.counters.post_filled_page() {
            self.posted -= 1;
            self.sync_trailer();
            return Err(e);
        }

        self.page = self.layout.next_page(self.page);
        self.cursor = 0;
        self.page_open = false;
        Ok(())
    }
}

impl<R: SharedRegion, C: PageCounters> SampleSink for RingProducer<R, C> {
    fn append(
        &mut self,
        sample: &SampleVector,
    ) -> TransportResult<AppendOutcome> {
        if self.page_open && self.cursor == self.layout.samples_per_page() {
            if let Err(e) = self.post_page() {
                warn!("Retry of post for page {} failed: {e}", self.page);
                self.count_drop();
                return Err(e);
            }
        }

        if !self.page_open {
            match self.counters.try_reserve_page() {
                Ok(true) => self.page_open = true,
                Ok(false) => {
                    self.count_drop();
                    return Ok(AppendOutcome::Dropped);
                }
                Err(e) => {
                    self.count_drop();
                    return Err(e);
                }
            }
        }

        let off = self.layout.sample_offset(self.page, self.cursor);
        sample.write_ne(&mut self.region.as_mut_slice()[off..]);
        self.cursor += 1;

        if self.cursor < self.layout.samples_per_page() {
            return Ok(AppendOutcome::Written);
        }

        if let Err(e) = self.post_page() {
            warn!("Failed to post page {}: {e}", self.page);
            return Err(e);
        }

        Ok(AppendOutcome::Posted)
    }

    fn dropped(&self) -> u64 {
        self.dropped
    }

    fn posted(&self) -> u64 {
        self.posted
    }
}

impl<R: SharedRegion, C: PageCounters> Drop for RingProducer<R, C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to release open page: {e}");
        }
    }
}
