//! Байты разделяемого сегмента.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use log::info;
use memmap2::MmapMut;

use bcistream_types::{TransportError, TransportResult};

/// Отображённая в память область, видимая producer и consumer.
///
/// Каждая сторона обращается только к страницам, которыми владеет по
/// протоколу счётчиков; других гарантий регион не даёт.
pub trait SharedRegion: Send {
    fn as_slice(&self) -> &[u8];

    fn as_mut_slice(&mut self) -> &mut [u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Сегмент поверх файла (например, в `/dev/shm`), отображённый через mmap.
pub struct MappedRegion {
    path: PathBuf,
    mmap: MmapMut,
}

impl MappedRegion {
    /// Создаёт (или обнуляет) файл размером `len` и отображает его.
    pub fn create(
        path: &Path,
        len: usize,
    ) -> TransportResult<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);

        let file = opts.open(path).map_err(|e| {
            TransportError::unavailable(format!("cannot create {}: {e}", path.display()))
        })?;
        file.set_len(len as u64)?;

        // SAFETY: файл принадлежит кольцу; содержимое меняется только по
        // протоколу страниц, а размер фиксирован после set_len.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        info!("Created mapped segment {} ({len} bytes)", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    /// Открывает существующий файл; он должен быть не меньше `len`.
    pub fn open(
        path: &Path,
        len: usize,
    ) -> TransportResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                TransportError::unavailable(format!("cannot open {}: {e}", path.display()))
            })?;

        let actual = file.metadata()?.len();
        if actual < len as u64 {
            return Err(TransportError::unavailable(format!(
                "{} is {actual} bytes, expected at least {len}",
                path.display()
            )));
        }

        // SAFETY: см. `create`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SharedRegion for MappedRegion {
    fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}
