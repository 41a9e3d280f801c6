use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const PAGE_SIZE: usize = 4096;

/// File-backed page store. Pages live at `page_id * PAGE_SIZE`; the file
/// grows on demand when a page past the current end is written.
pub struct DiskManager {
    file: File,
}

impl DiskManager {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self { file })
    }

    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self { file })
    }

    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> StorageResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::BufferSizeMismatch {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let offset = Self::page_offset(page_id)?;
        let file_size = self.file.metadata()?.len();

        if offset >= file_size {
            return Err(StorageError::PageNotFound(page_id));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;

        Ok(())
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::BufferSizeMismatch {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }

        let offset = Self::page_offset(page_id)?;
        let file_size = self.file.metadata()?.len();

        // Extend file if necessary
        if offset >= file_size {
            let new_size = offset + PAGE_SIZE as u64;
            self.file.set_len(new_size)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;

        Ok(())
    }

    /// Mark a page free on disk. Page ids are never reused, so this only
    /// zeroes the stored bytes; a page past the end of file needs no work.
    pub fn deallocate_page(&mut self, page_id: PageId) -> StorageResult<()> {
        let offset = Self::page_offset(page_id)?;
        let file_size = self.file.metadata()?.len();

        if offset >= file_size {
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.file.sync_all()?;

        Ok(())
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    fn page_offset(page_id: PageId) -> StorageResult<u64> {
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId(page_id));
        }
        Ok(page_id.0 as u64 * PAGE_SIZE as u64)
    }
}
