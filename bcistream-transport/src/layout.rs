//! Геометрия сегмента.
//!
//! ```text
//! [page 0][page 1]...[page N-1][trailer 24 B]
//!
//! page    = samples_per_page × SAMPLE_SIZE (4 канала × i32, native-endian)
//! trailer = [0:8]   dropped samples (u64, native-endian, пишет producer)
//!           [8:16]  posted pages    (u64, native-endian, пишет producer)
//!           [16:24] consumed pages  (u64, native-endian, пишет consumer)
//! ```
//!
//! Страницы отправляются и читаются строго по кругу, поэтому k-я
//! отправленная страница имеет индекс `k % page_count`. По `posted`
//! перезапущенный producer продолжает с нужной страницы, по `consumed`
//! перезапущенный consumer.

use bcistream_types::{TransportError, TransportResult, SAMPLE_SIZE};

pub const MIN_PAGES: usize = 2;
pub const MAX_PAGES: usize = 4;

/// Размер трейлера со счётчиками producer и consumer
pub const TRAILER_SIZE: usize = 24;

/// Счётчики из трейлера сегмента.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrailerCounts {
    pub dropped: u64,
    pub posted: u64,
    pub consumed: u64,
}

impl TrailerCounts {
    /// Страниц отправлено, но ещё не возвращено consumer.
    /// `None` - счётчики не согласованы с кольцом из `page_count` страниц.
    pub fn outstanding(
        &self,
        page_count: usize,
    ) -> Option<usize> {
        let n = self.posted.checked_sub(self.consumed)?;
        (n <= page_count as u64).then_some(n as usize)
    }

    /// Страница, в которую producer пишет следующей.
    pub fn producer_page(
        &self,
        page_count: usize,
    ) -> usize {
        (self.posted % page_count as u64) as usize
    }

    /// Страница, которую consumer читает следующей.
    pub fn consumer_page(
        &self,
        page_count: usize,
    ) -> usize {
        (self.consumed % page_count as u64) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    page_count: usize,
    samples_per_page: usize,
}

impl RingLayout {
    pub fn new(
        page_count: usize,
        samples_per_page: usize,
    ) -> TransportResult<Self> {
        if !(MIN_PAGES..=MAX_PAGES).contains(&page_count) {
            return Err(TransportError::layout(format!(
                "page count {page_count} outside {MIN_PAGES}..={MAX_PAGES}"
            )));
        }
        if samples_per_page == 0 {
            return Err(TransportError::layout("samples per page must be > 0"));
        }
        Ok(Self {
            page_count,
            samples_per_page,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn samples_per_page(&self) -> usize {
        self.samples_per_page
    }

    /// Ёмкость кольца в сэмплах.
    pub fn capacity(&self) -> usize {
        self.page_count * self.samples_per_page
    }

    pub fn page_size(&self) -> usize {
        self.samples_per_page * SAMPLE_SIZE
    }

    /// Размер области страниц (без трейлера).
    pub fn pages_size(&self) -> usize {
        self.page_count * self.page_size()
    }

    /// Полный размер сегмента.
    pub fn segment_size(&self) -> usize {
        self.pages_size() + TRAILER_SIZE
    }

    pub fn page_offset(
        &self,
        page: usize,
    ) -> usize {
        page * self.page_size()
    }

    pub fn sample_offset(
        &self,
        page: usize,
        index: usize,
    ) -> usize {
        self.page_offset(page) + index * SAMPLE_SIZE
    }

    pub fn next_page(
        &self,
        page: usize,
    ) -> usize {
        (page + 1) % self.page_count
    }

    /// Проверяет, что регион вмещает сегмент.
    pub fn check_region(
        &self,
        len: usize,
    ) -> TransportResult<()> {
        if len < self.segment_size() {
            return Err(TransportError::layout(format!(
                "region of {len} bytes is smaller than segment of {} bytes",
                self.segment_size()
            )));
        }
        Ok(())
    }

    /// Пишет счётчики producer, не трогая `consumed`.
    pub fn write_producer_counts(
        &self,
        region: &mut [u8],
        dropped: u64,
        posted: u64,
    ) {
        let off = self.pages_size();
        region[off..off + 8].copy_from_slice(&dropped.to_ne_bytes());
        region[off + 8..off + 16].copy_from_slice(&posted.to_ne_bytes());
    }

    pub fn write_consumed(
        &self,
        region: &mut [u8],
        consumed: u64,
    ) {
        let off = self.pages_size() + 16;
        region[off..off + 8].copy_from_slice(&consumed.to_ne_bytes());
    }

    /// Обнуляет трейлер целиком.
    pub fn reset_trailer(
        &self,
        region: &mut [u8],
    ) {
        let off = self.pages_size();
        region[off..off + TRAILER_SIZE].fill(0);
    }

    pub fn read_trailer(
        &self,
        region: &[u8],
    ) -> TrailerCounts {
        let off = self.pages_size();
        let word = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&region[off + at..off + at + 8]);
            u64::from_ne_bytes(b)
        };
        TrailerCounts {
            dropped: word(0),
            posted: word(8),
            consumed: word(16),
        }
    }
}
