//! Movable read-only window over an image file.
//!
//! Firmware files can be larger than the host wants to hold in memory, so
//! only one window (one device object's worth) is loaded at a time.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};

use crate::buffer::{BufferError, BytesBuffer};

const READ_CHUNK: usize = 1024;

#[derive(Error, Debug)]
pub enum FileViewError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Offset {offset} is past the end of a {size}-byte file")]
    OffsetPastEnd { offset: u64, size: u64 },

    #[error("File ended early at {at} bytes, expected {expected}")]
    Truncated { at: u64, expected: u64 },

    #[error("No window loaded")]
    NoWindow,

    #[error("Window buffer: {0}")]
    Buffer(#[from] BufferError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A window of at most `window_size` bytes into a read-only file.
#[derive(Debug)]
pub struct FileView {
    path: PathBuf,
    file: File,
    window: BytesBuffer,
    file_offset: Option<u64>,
    file_size: u64,
}

impl FileView {
    /// Open `path` without loading any data.
    pub fn open(path: impl AsRef<Path>, window_size: usize) -> Result<Self, FileViewError> {
        let path = path.as_ref().to_path_buf();
        let window = BytesBuffer::with_capacity(window_size)?;
        let mut file = File::open(&path).map_err(|source| FileViewError::Open {
            path: path.clone(),
            source,
        })?;
        let file_size = file.seek(SeekFrom::End(0))?;

        debug!(path = %path.display(), size = file_size, window_size, "Opened file view");
        Ok(Self {
            path,
            file,
            window,
            file_offset: None,
            file_size,
        })
    }

    /// Load the window starting at `offset`.
    ///
    /// Reads `min(window_size, file_size - offset)` bytes. On failure the
    /// view has no valid window.
    pub fn move_window(&mut self, offset: u64) -> Result<(), FileViewError> {
        self.file_offset = None;
        self.window.reset();

        if offset > self.file_size {
            return Err(FileViewError::OffsetPastEnd {
                offset,
                size: self.file_size,
            });
        }
        self.file.seek(SeekFrom::Start(offset))?;

        let want = (self.file_size - offset).min(self.window.capacity() as u64) as usize;
        let mut chunk = [0u8; READ_CHUNK];
        while self.window.len() < want {
            let n = (want - self.window.len()).min(READ_CHUNK);
            match self.file.read(&mut chunk[..n]) {
                Ok(0) => {
                    error!(path = %self.path.display(), offset, "Short read");
                    return Err(FileViewError::Truncated {
                        at: offset + self.window.len() as u64,
                        expected: offset + want as u64,
                    });
                }
                Ok(read) => self.window.append_slice(&chunk[..read])?,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(path = %self.path.display(), offset, error = %e, "Read failed");
                    return Err(e.into());
                }
            }
        }

        self.file_offset = Some(offset);
        Ok(())
    }

    /// Bytes of the current window.
    pub fn window(&self) -> Result<&[u8], FileViewError> {
        match self.file_offset {
            Some(_) => Ok(self.window.as_slice()),
            None => Err(FileViewError::NoWindow),
        }
    }

    /// Number of bytes in the current window (zero when none is loaded).
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_size(&self) -> usize {
        self.window.capacity()
    }

    /// File offset of the first window byte, if a window is loaded.
    pub fn file_offset(&self) -> Option<u64> {
        self.file_offset
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// File offset just past the current window.
    pub fn window_end(&self) -> Option<u64> {
        self.file_offset.map(|o| o + self.window.len() as u64)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(len: usize) -> (NamedTempFile, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        (file, data)
    }

    #[test]
    fn test_open_has_no_window() {
        let (file, _) = temp_file(100);
        let view = FileView::open(file.path(), 32).unwrap();
        assert_eq!(view.file_size(), 100);
        assert_eq!(view.file_offset(), None);
        assert!(matches!(view.window(), Err(FileViewError::NoWindow)));
    }

    #[test]
    fn test_window_law() {
        let (file, data) = temp_file(5000);
        let mut view = FileView::open(file.path(), 4096).unwrap();

        for offset in [0u64, 1, 903, 4096, 4999, 5000] {
            view.move_window(offset).unwrap();
            let expected_len = (view.file_size() - offset).min(4096) as usize;
            assert_eq!(view.window_len(), expected_len, "offset {}", offset);
            let start = offset as usize;
            assert_eq!(view.window().unwrap(), &data[start..start + expected_len]);
            assert_eq!(view.file_offset(), Some(offset));
            assert_eq!(view.window_end(), Some(offset + expected_len as u64));
        }
    }

    #[test]
    fn test_window_larger_than_file() {
        let (file, data) = temp_file(512);
        let mut view = FileView::open(file.path(), 4096).unwrap();
        view.move_window(0).unwrap();
        assert_eq!(view.window().unwrap(), &data[..]);
    }

    #[test]
    fn test_offset_past_end_rejected() {
        let (file, _) = temp_file(10);
        let mut view = FileView::open(file.path(), 8).unwrap();
        assert!(matches!(
            view.move_window(11),
            Err(FileViewError::OffsetPastEnd { offset: 11, size: 10 })
        ));
        assert_eq!(view.file_offset(), None);
    }

    #[test]
    fn test_missing_file() {
        let err = FileView::open("/definitely/not/here.bin", 16).unwrap_err();
        assert!(matches!(err, FileViewError::Open { .. }));
    }
}
