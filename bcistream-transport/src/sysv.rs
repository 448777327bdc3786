//! System V shared memory и семафоры, адресуемые целочисленным ключом.
//!
//! Producer и consumer - разные процессы; каждый подключается к
//! сегменту и набору из двух семафоров по заранее известным ключам.
//! При завершении сегмент только отсоединяется (`shmdt`), но не
//! удаляется: владелец памяти может быть другим процессом.
//!
//! Страницу, которую процесс взял и ещё не передал дальше, ядро
//! возвращает при его завершении (в том числе аварийном) через
//! `SEM_UNDO`: занятие страницы producer и ожидание страницы consumer
//! идут с этим флагом, а передача (post и recycle) в том же атомарном
//! `semop` гасит накопленную поправку. Так перезапуск любой стороны не
//! уменьшает число страниц в кольце.

use std::{io, ptr::NonNull, thread, time::Duration, time::Instant};

use log::{info, warn};

use bcistream_types::{TransportError, TransportResult};

use crate::{
    counters::{CounterSnapshot, PageCounters},
    region::SharedRegion,
};

const PERMISSIONS: libc::c_int = 0o666;

const SEM_AVAILABLE: u16 = 0;
const SEM_FILLED: u16 = 1;

/// Шаг опроса при ожидании с таймаутом
const POLL_STEP: Duration = Duration::from_millis(1);

/// Набор из двух SysV семафоров.
#[derive(Debug)]
pub struct SysvSemaphores {
    key: libc::key_t,
    id: libc::c_int,
}

impl SysvSemaphores {
    /// Создаёт набор с начальными значениями (page_count, 0) или
    /// подключается к существующему, не трогая его значения.
    pub fn open_or_create(
        key: i32,
        page_count: usize,
    ) -> TransportResult<Self> {
        // SAFETY: вызовы libc без указателей.
        let id = unsafe { libc::semget(key, 2, libc::IPC_CREAT | libc::IPC_EXCL | PERMISSIONS) };

        if id >= 0 {
            let sems = Self { key, id };
            sems.set_value(SEM_AVAILABLE, page_count as libc::c_int)?;
            sems.set_value(SEM_FILLED, 0)?;
            info!("Created semaphore set key=0x{key:08X} ({page_count} pages)");
            return Ok(sems);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(TransportError::unavailable(format!(
                "semget(0x{key:08X}) failed: {err}"
            )));
        }

        Self::attach(key)
    }

    /// Подключается к существующему набору.
    pub fn attach(key: i32) -> TransportResult<Self> {
        // SAFETY: вызов libc без указателей.
        let id = unsafe { libc::semget(key, 2, PERMISSIONS) };
        if id < 0 {
            return Err(TransportError::unavailable(format!(
                "semget(0x{key:08X}) failed: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(Self { key, id })
    }

    pub fn key(&self) -> i32 {
        self.key
    }

    /// Удаляет набор из системы.
    pub fn remove(self) -> TransportResult<()> {
        // SAFETY: IPC_RMID игнорирует четвёртый аргумент.
        if unsafe { libc::semctl(self.id, 0, libc::IPC_RMID) } < 0 {
            return Err(TransportError::counter(format!(
                "semctl(IPC_RMID) failed: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn set_value(
        &self,
        num: u16,
        value: libc::c_int,
    ) -> TransportResult<()> {
        // SAFETY: для SETVAL четвёртый аргумент - int.
        if unsafe { libc::semctl(self.id, num as libc::c_int, libc::SETVAL, value) } < 0 {
            return Err(TransportError::unavailable(format!(
                "semctl(SETVAL) failed: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn value(
        &self,
        num: u16,
    ) -> TransportResult<usize> {
        // SAFETY: GETVAL не использует четвёртый аргумент.
        let v = unsafe { libc::semctl(self.id, num as libc::c_int, libc::GETVAL) };
        if v < 0 {
            return Err(TransportError::counter(format!(
                "semctl(GETVAL) failed: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(v as usize)
    }

    /// Атомарный `semop` над набором операций. `Ok(false)` - операция с
    /// `IPC_NOWAIT` заблокировала бы.
    fn apply(
        &self,
        ops: &mut [libc::sembuf],
    ) -> TransportResult<bool> {
        let nowait = ops
            .iter()
            .any(|o| (o.sem_flg & libc::IPC_NOWAIT as libc::c_short) != 0);

        loop {
            // SAFETY: ops живёт до конца вызова, nsops = ops.len().
            if unsafe { libc::semop(self.id, ops.as_mut_ptr(), ops.len()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) if nowait => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => {
                    return Err(TransportError::counter(format!(
                        "semop({} ops on sem=0x{:08X}) failed: {err}",
                        ops.len(),
                        self.key
                    )))
                }
            }
        }
    }

    fn take_filled(
        &self,
        nowait: bool,
    ) -> TransportResult<bool> {
        let flags = if nowait { libc::SEM_UNDO | libc::IPC_NOWAIT } else { libc::SEM_UNDO };
        self.apply(&mut [sembuf(SEM_FILLED, -1, flags)])
    }
}

fn sembuf(
    num: u16,
    delta: i16,
    flags: libc::c_int,
) -> libc::sembuf {
    libc::sembuf {
        sem_num: num,
        sem_op: delta,
        sem_flg: flags as libc::c_short,
    }
}

impl PageCounters for SysvSemaphores {
    fn try_reserve_page(&self) -> TransportResult<bool> {
        self.apply(&mut [sembuf(SEM_AVAILABLE, -1, libc::SEM_UNDO | libc::IPC_NOWAIT)])
    }

    /// Отдаёт страницу consumer и гасит поправку занятия.
    fn post_filled_page(&self) -> TransportResult<()> {
        self.apply(&mut [
            sembuf(SEM_FILLED, 1, 0),
            sembuf(SEM_AVAILABLE, 1, libc::SEM_UNDO),
            sembuf(SEM_AVAILABLE, -1, 0),
        ])
        .map(|_| ())
    }

    fn await_filled_page(
        &self,
        timeout: Option<Duration>,
    ) -> TransportResult<bool> {
        let Some(timeout) = timeout else {
            return self.take_filled(false);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if self.take_filled(true)? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(POLL_STEP);
        }
    }

    /// Возвращает страницу producer и гасит поправку ожидания.
    fn recycle_page(&self) -> TransportResult<()> {
        self.apply(&mut [
            sembuf(SEM_AVAILABLE, 1, 0),
            sembuf(SEM_FILLED, 1, libc::SEM_UNDO),
            sembuf(SEM_FILLED, -1, 0),
        ])
        .map(|_| ())
    }

    fn release_page(&self) -> TransportResult<()> {
        self.apply(&mut [sembuf(SEM_AVAILABLE, 1, libc::SEM_UNDO)]).map(|_| ())
    }

    fn reclaim_pages(
        &self,
        count: usize,
    ) -> TransportResult<()> {
        if count == 0 {
            return Ok(());
        }
        let delta = i16::try_from(count)
            .map_err(|_| TransportError::counter(format!("cannot reclaim {count} pages")))?;
        self.apply(&mut [sembuf(SEM_AVAILABLE, delta, 0)]).map(|_| ())
    }

    fn snapshot(&self) -> TransportResult<CounterSnapshot> {
        Ok(CounterSnapshot {
            available: self.value(SEM_AVAILABLE)?,
            filled: self.value(SEM_FILLED)?,
        })
    }
}

/// Сегмент SysV shared memory, подключённый в адресное пространство.
#[derive(Debug)]
pub struct SysvSegment {
    key: libc::key_t,
    id: libc::c_int,
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: сегмент - обычная память процесса; доступ к страницам
// упорядочен протоколом счётчиков.
unsafe impl Send for SysvSegment {}

impl SysvSegment {
    /// Создаёт сегмент (если его нет) и подключается к нему.
    pub fn open_or_create(
        key: i32,
        len: usize,
    ) -> TransportResult<Self> {
        Self::get(key, len, libc::IPC_CREAT | PERMISSIONS)
    }

    /// Подключается к существующему сегменту не меньше `len` байт.
    pub fn attach(
        key: i32,
        len: usize,
    ) -> TransportResult<Self> {
        Self::get(key, len, PERMISSIONS)
    }

    fn get(
        key: i32,
        len: usize,
        flags: libc::c_int,
    ) -> TransportResult<Self> {
        // SAFETY: вызов libc без указателей.
        let id = unsafe { libc::shmget(key, len, flags) };
        if id < 0 {
            return Err(TransportError::unavailable(format!(
                "shmget(0x{key:08X}, {len}) failed: {}",
                io::Error::last_os_error()
            )));
        }

        // SAFETY: адрес выбирает ядро; результат проверяется ниже.
        let addr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(TransportError::unavailable(format!(
                "shmat(0x{key:08X}) failed: {}",
                io::Error::last_os_error()
            )));
        }

        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| TransportError::unavailable("shmat returned null"))?;

        info!("Attached SysV segment key=0x{key:08X} ({len} bytes)");

        Ok(Self { key, id, ptr, len })
    }

    pub fn key(&self) -> i32 {
        self.key
    }

    /// Помечает сегмент на удаление; память освобождается после
    /// отсоединения всех процессов.
    pub fn remove(self) -> TransportResult<()> {
        // SAFETY: IPC_RMID не читает buf.
        if unsafe { libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) } < 0 {
            return Err(TransportError::unavailable(format!(
                "shmctl(IPC_RMID) failed: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

impl SharedRegion for SysvSegment {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+len подключён shmat и живёт до shmdt в Drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: см. as_slice; &mut self исключает алиасинг в этом процессе.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for SysvSegment {
    fn drop(&mut self) {
        // SAFETY: ptr получен от shmat и отсоединяется один раз.
        if unsafe { libc::shmdt(self.ptr.as_ptr() as *const libc::c_void) } < 0 {
            warn!(
                "shmdt(0x{:08X}) failed: {}",
                self.key,
                io::Error::last_os_error()
            );
        }
    }
}
