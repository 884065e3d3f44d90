// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Memory-mapped access to recording files.
//!
//! [MappedFile] owns a single `mmap` over a recording file and hands out
//! the backing `&[u8]` to the chunk/metadata/event parsers, which are all
//! written against contiguous slices. A single mapping addresses the
//! entire file in virtual memory regardless of its size, so there is no
//! segment splicing to manage; the OS pages data in on demand.

use crate::error::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

enum Backing {
    Mmap(Mmap),
    /// In-memory fixture data, for tests that don't want a real file on
    /// disk. `mmap` refuses zero-length mappings, which real files never
    /// hit but synthetic empty fixtures do.
    Bytes(Vec<u8>),
}

/// An immutable view of a recording file, backed by a memory mapping.
pub struct MappedFile {
    backing: Backing,
}

impl MappedFile {
    /// Map a file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;

        Self::from_file(&file)
    }

    /// Construct an instance directly from an open file handle.
    pub fn from_file(file: &File) -> Result<Self> {
        // SAFETY: callers must not mutate the underlying file while the
        // mapping is alive, per the usual mmap caveats.
        let mmap = unsafe { Mmap::map(file)? };

        Ok(Self {
            backing: Backing::Mmap(mmap),
        })
    }

    /// Construct an instance from an in-memory byte slice, bypassing the
    /// filesystem entirely. Intended for tests and fixtures.
    #[cfg(any(test, feature = "test-support"))]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            backing: Backing::Bytes(bytes.to_vec()),
        })
    }

    /// The full contents of the mapped file.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Mmap(mmap) => mmap,
            Backing::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_file_contents() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello chunk").unwrap();

        let mapped = MappedFile::open(f.path()).unwrap();

        assert_eq!(mapped.as_slice(), b"hello chunk");
        assert_eq!(mapped.len(), 11);
    }
}
