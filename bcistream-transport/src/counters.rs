//! Пара счётчиков страниц.
//!
//! Индекс 0 - "страниц свободно для записи" (начально = число страниц),
//! индекс 1 - "страниц заполнено" (начально 0). Producer уменьшает первый
//! только неблокирующе; consumer ждёт второй блокирующе.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use bcistream_types::{TransportError, TransportResult};

/// Значения счётчиков в момент запроса.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub available: usize,
    pub filled: usize,
}

/// Семафорная пара, разделяемая producer и consumer.
pub trait PageCounters: Send {
    /// Неблокирующе занимает свободную страницу. `false` - свободных нет.
    fn try_reserve_page(&self) -> TransportResult<bool>;

    /// Сообщает consumer о заполненной странице.
    fn post_filled_page(&self) -> TransportResult<()>;

    /// Ждёт заполненную страницу. `None` - без таймаута.
    /// `false` - таймаут истёк.
    fn await_filled_page(
        &self,
        timeout: Option<Duration>,
    ) -> TransportResult<bool>;

    /// Возвращает прочитанную страницу в пул свободных.
    fn recycle_page(&self) -> TransportResult<()>;

    /// Возвращает занятую producer, но не отправленную страницу в пул
    /// свободных.
    fn release_page(&self) -> TransportResult<()>;

    /// Возвращает в пул `count` страниц, которые прежний producer занял и
    /// не вернул.
    fn reclaim_pages(
        &self,
        count: usize,
    ) -> TransportResult<()> {
        for _ in 0..count {
            self.recycle_page()?;
        }
        Ok(())
    }

    fn snapshot(&self) -> TransportResult<CounterSnapshot>;
}

/// Счётчики внутри одного процесса на bounded-каналах.
///
/// Канал ёмкостью N с N токенами ведёт себя как счётчик семафора:
/// `try_recv` - неблокирующий down, `recv` - блокирующий down, `send` - up.
#[derive(Debug, Clone)]
pub struct ChannelCounters {
    available_tx: Sender<()>,
    available_rx: Receiver<()>,
    filled_tx: Sender<()>,
    filled_rx: Receiver<()>,
}

impl ChannelCounters {
    pub fn new(page_count: usize) -> Self {
        let (available_tx, available_rx) = bounded(page_count);
        let (filled_tx, filled_rx) = bounded(page_count);

        for _ in 0..page_count {
            // ёмкость = page_count, переполнение невозможно
            let _ = available_tx.try_send(());
        }

        Self {
            available_tx,
            available_rx,
            filled_tx,
            filled_rx,
        }
    }

    fn up(
        tx: &Sender<()>,
        name: &str,
    ) -> TransportResult<()> {
        match tx.try_send(()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(())) => Err(TransportError::counter(format!(
                "{name} counter already at page count"
            ))),
            Err(TrySendError::Disconnected(())) => {
                Err(TransportError::counter(format!("{name} counter disconnected")))
            }
        }
    }
}

impl PageCounters for ChannelCounters {
    fn try_reserve_page(&self) -> TransportResult<bool> {
        match self.available_rx.try_recv() {
            Ok(()) => Ok(true),
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => {
                Err(TransportError::counter("available counter disconnected"))
            }
        }
    }

    fn post_filled_page(&self) -> TransportResult<()> {
        Self::up(&self.filled_tx, "filled")
    }

    fn await_filled_page(
        &self,
        timeout: Option<Duration>,
    ) -> TransportResult<bool> {
        match timeout {
            None => self
                .filled_rx
                .recv()
                .map(|()| true)
                .map_err(|_| TransportError::counter("filled counter disconnected")),
            Some(t) => match self.filled_rx.recv_timeout(t) {
                Ok(()) => Ok(true),
                Err(RecvTimeoutError::Timeout) => Ok(false),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(TransportError::counter("filled counter disconnected"))
                }
            },
        }
    }

    fn recycle_page(&self) -> TransportResult<()> {
        Self::up(&self.available_tx, "available")
    }

    fn release_page(&self) -> TransportResult<()> {
        Self::up(&self.available_tx, "available")
    }

    fn snapshot(&self) -> TransportResult<CounterSnapshot> {
        Ok(CounterSnapshot {
            available: self.available_rx.len(),
            filled: self.filled_rx.len(),
        })
    }
}
