//! Segment files: numbered append-only logs of frames.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{self, Frame};

const EXTENSION: &str = "seg";
const TEMP_SUFFIX: &str = ".seg.tmp";

/// Where a frame lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub segment: u64,
    pub offset: u64,
    pub len: u32,
}

/// An open segment file.
#[derive(Debug)]
pub struct Segment {
    pub id: u64,
    pub path: PathBuf,
    pub file: File,
    pub len: u64,
}

impl Segment {
    /// Creates an empty segment for appending.
    pub fn create(dir: &Path, id: u64) -> io::Result<Self> {
        let path = segment_path(dir, id);
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self {
            id,
            path,
            file,
            len: 0,
        })
    }

    /// Opens an existing segment. Appending is only allowed when `writable`.
    pub fn open(dir: &Path, id: u64, writable: bool) -> io::Result<Self> {
        let path = segment_path(dir, id);
        let file = OpenOptions::new().read(true).append(writable).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            id,
            path,
            file,
            len,
        })
    }

    /// Appends a frame and returns its location.
    ///
    /// On a failed write the file is cut back to its previous length so a
    /// half-written frame never stays in the log.
    pub fn append(&mut self, frame: &[u8], sync: bool) -> io::Result<Location> {
        let len = u32::try_from(frame.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        let offset = self.len;

        let written = self.file.write_all(frame).and_then(|()| {
            if sync {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(err) = written {
            if let Err(truncate_err) = self.file.set_len(offset) {
                tracing::error!(
                    segment = self.id,
                    error = %truncate_err,
                    "failed to roll back partial frame"
                );
            }
            return Err(err);
        }

        self.len += u64::from(len);
        Ok(Location {
            segment: self.id,
            offset,
            len,
        })
    }

    /// Reads the raw frame at `location`.
    pub fn read(&self, location: Location) -> io::Result<Vec<u8>> {
        read_at(&self.file, location)
    }
}

/// Reads `location.len` bytes at `location.offset` from `file`.
pub fn read_at(file: &File, location: Location) -> io::Result<Vec<u8>> {
    let mut file = file;
    file.seek(SeekFrom::Start(location.offset))?;
    let mut frame = vec![0u8; location.len as usize];
    file.read_exact(&mut frame)?;
    Ok(frame)
}

pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{id:010}.{EXTENSION}"))
}

pub fn temp_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{id:010}{TEMP_SUFFIX}"))
}

/// Segment ids present in `dir`, ascending.
pub fn list_segments(dir: &Path) -> io::Result<Vec<u64>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(id) = name
            .strip_suffix(&format!(".{EXTENSION}"))
            .and_then(|stem| stem.parse::<u64>().ok())
        {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Deletes compaction output left behind by an interrupted run.
pub fn remove_temp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(TEMP_SUFFIX))
        {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Result of reading a whole segment.
#[derive(Debug)]
pub struct Scan<'a> {
    /// Complete frames in file order, with their offsets and lengths.
    pub frames: Vec<(u64, u32, Frame<'a>)>,
    /// Byte length covered by complete frames.
    pub valid_len: u64,
    /// Bytes after the last complete frame.
    pub trailing: u64,
}

/// Splits a segment's contents into frames.
///
/// A trailing partial frame is reported through [`Scan::trailing`]; a
/// complete frame that does not parse is an error.
pub fn scan(bytes: &[u8]) -> Result<Scan<'_>, (u64, String)> {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        let Some(len) = codec::frame_len(rest) else {
            break;
        };
        let frame = codec::decode_frame(&rest[..len]).map_err(|msg| (offset as u64, msg))?;
        let len32 = u32::try_from(len).map_err(|_| (offset as u64, "frame too large".into()))?;
        frames.push((offset as u64, len32, frame));
        offset += len;
    }

    Ok(Scan {
        frames,
        valid_len: offset as u64,
        trailing: (bytes.len() - offset) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{KIND_DELETE, KIND_PUT, encode_frame};
    use tempfile::TempDir;

    #[test]
    fn append_then_read_back() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 1).unwrap();

        let first = encode_frame(KIND_PUT, b"a", b"1").unwrap();
        let second = encode_frame(KIND_DELETE, b"bb", b"").unwrap();
        let loc1 = segment.append(&first, true).unwrap();
        let loc2 = segment.append(&second, false).unwrap();

        assert_eq!(loc1.offset, 0);
        assert_eq!(loc2.offset, first.len() as u64);
        assert_eq!(segment.read(loc2).unwrap(), second);
        assert_eq!(segment.read(loc1).unwrap(), first);
        assert_eq!(segment.len, (first.len() + second.len()) as u64);
    }

    #[test]
    fn scan_reports_trailing_bytes() {
        let mut bytes = encode_frame(KIND_PUT, b"a", b"1").unwrap();
        let whole = bytes.len() as u64;
        let torn = encode_frame(KIND_PUT, b"b", b"2").unwrap();
        bytes.extend_from_slice(&torn[..torn.len() - 2]);

        let scan = scan(&bytes).unwrap();

        assert_eq!(scan.frames.len(), 1);
        assert_eq!(scan.valid_len, whole);
        assert_eq!(scan.trailing, torn.len() as u64 - 2);
    }

    #[test]
    fn scan_rejects_garbage_frames() {
        let mut bytes = encode_frame(KIND_PUT, b"a", b"1").unwrap();
        bytes[4] = 0xff;
        assert!(scan(&bytes).is_err());
    }

    #[test]
    fn lists_only_segment_files_in_order() {
        let dir = TempDir::new().unwrap();
        for id in [3, 1, 20] {
            Segment::create(dir.path(), id).unwrap();
        }
        fs::write(dir.path().join("LOCK"), b"").unwrap();
        fs::write(temp_path(dir.path(), 7), b"").unwrap();

        assert_eq!(list_segments(dir.path()).unwrap(), vec![1, 3, 20]);
        assert_eq!(remove_temp_files(dir.path()).unwrap(), 1);
        assert!(!temp_path(dir.path(), 7).exists());
    }
}
