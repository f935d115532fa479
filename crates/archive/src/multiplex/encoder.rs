// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Raw ZIP framing: local header, entry data, data descriptor, then the
//! central directory on finish.
//!
//! Names are written as given. Two entries may carry the same path; readers
//! that index by name will only see one of them, extractors see both.

use std::io::{self, Read, Write};

use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use jiff::civil;

const LOCAL_HEADER: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR: u32 = 0x0807_4b50;
const CENTRAL_HEADER: u32 = 0x0201_4b50;
const ZIP64_END: u32 = 0x0606_4b50;
const ZIP64_LOCATOR: u32 = 0x0706_4b50;
const END_OF_DIRECTORY: u32 = 0x0605_4b50;

const ZIP64_EXTRA: u16 = 0x0001;
/// Bit 3 (sizes follow the data) and bit 11 (UTF-8 names).
const FLAGS: u16 = 0x0808;
const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;
const MADE_BY_UNIX: u16 = 3 << 8;
const FILE_MODE: u32 = 0o100_644;

const U16_MARK: u16 = u16::MAX;
const U32_MARK: u32 = u32::MAX;

/// Entries at least this large get zip64 sizes up front. The margin leaves
/// room for deflate growing incompressible input.
const ZIP64_ENTRY_THRESHOLD: u64 = u32::MAX as u64 - (16 << 20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated { level: u32 },
}

impl Method {
    const fn code(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated { .. } => 8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DosTime {
    time: u16,
    date: u16,
}

impl From<civil::DateTime> for DosTime {
    fn from(at: civil::DateTime) -> Self {
        let field = |v: i8| u16::try_from(v).unwrap_or_default();
        if at.year() < 1980 {
            return Self {
                time: 0,
                date: (1 << 5) | 1,
            };
        }
        let year = u16::try_from(at.year().min(2107) - 1980).unwrap_or_default();
        Self {
            time: (field(at.hour()) << 11) | (field(at.minute()) << 5) | (field(at.second()) / 2),
            date: (year << 9) | (field(at.month()) << 5) | field(at.day()),
        }
    }
}

/// Little-endian field buffer for one header.
#[derive(Default)]
struct Fields(Vec<u8>);

impl Fields {
    fn u16(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.0.extend_from_slice(v);
        self
    }

    fn size(&self) -> io::Result<u16> { fit_u16(self.0.len(), "extra field") }
}

fn fit_u16(len: usize, what: &str) -> io::Result<u16> {
    u16::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("{what} too long: {len} bytes")))
}

fn clamp_u32(v: u64) -> u32 { u32::try_from(v).unwrap_or(U32_MARK) }

struct Counted<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for Counted<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> { self.inner.flush() }
}

/// Hashes and counts everything read through it.
struct Checksummed<R> {
    inner:  R,
    hasher: Hasher,
    count:  u64,
}

impl<R: Read> Read for Checksummed<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

struct Record {
    name:         Vec<u8>,
    method:       Method,
    modified:     DosTime,
    crc:          u32,
    compressed:   u64,
    uncompressed: u64,
    offset:       u64,
    zip64:        bool,
}

pub struct Encoder<W: Write> {
    out:     Counted<W>,
    records: Vec<Record>,
}

impl<W: Write> Encoder<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out:     Counted { inner: out, count: 0 },
            records: Vec::new(),
        }
    }

    pub fn entries(&self) -> usize { self.records.len() }

    /// Writes one complete entry. `size` is the exact content length and
    /// decides whether the entry needs zip64 sizes. Returns the number of
    /// content bytes consumed.
    pub fn append(
        &mut self,
        name: &str,
        size: u64,
        method: Method,
        modified: civil::DateTime,
        content: impl Read,
    ) -> io::Result<u64> {
        let name_len = fit_u16(name.len(), "entry name")?;
        let zip64 = size >= ZIP64_ENTRY_THRESHOLD;
        let modified = DosTime::from(modified);
        let offset = self.out.count;

        let mut extra = Fields::default();
        if zip64 {
            extra.u16(ZIP64_EXTRA).u16(16).u64(0).u64(0);
        }
        let sizes = if zip64 { U32_MARK } else { 0 };
        let mut header = Fields::default();
        header
            .u32(LOCAL_HEADER)
            .u16(if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT })
            .u16(FLAGS)
            .u16(method.code())
            .u16(modified.time)
            .u16(modified.date)
            .u32(0)
            .u32(sizes)
            .u32(sizes)
            .u16(name_len)
            .u16(extra.size()?)
            .bytes(name.as_bytes())
            .bytes(&extra.0);
        self.out.write_all(&header.0)?;

        let data_start = self.out.count;
        let mut reader = Checksummed {
            inner:  content,
            hasher: Hasher::new(),
            count:  0,
        };
        match method {
            Method::Stored => {
                io::copy(&mut reader, &mut self.out)?;
            }
            Method::Deflated { level } => {
                let mut deflate = DeflateEncoder::new(&mut self.out, flate2::Compression::new(level));
                io::copy(&mut reader, &mut deflate)?;
                deflate.finish()?;
            }
        }
        let compressed = self.out.count - data_start;
        let uncompressed = reader.count;
        let crc = reader.hasher.finalize();
        if !zip64 && (compressed >= u64::from(U32_MARK) || uncompressed >= u64::from(U32_MARK)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry {name} outgrew its declared size of {size} bytes"),
            ));
        }

        let mut descriptor = Fields::default();
        descriptor.u32(DATA_DESCRIPTOR).u32(crc);
        if zip64 {
            descriptor.u64(compressed).u64(uncompressed);
        } else {
            descriptor.u32(clamp_u32(compressed)).u32(clamp_u32(uncompressed));
        }
        self.out.write_all(&descriptor.0)?;

        self.records.push(Record {
            name: name.as_bytes().to_vec(),
            method,
            modified,
            crc,
            compressed,
            uncompressed,
            offset,
            zip64,
        });
        Ok(uncompressed)
    }

    /// Writes the central directory and the end records, flushes, and
    /// hands back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        let dir_start = self.out.count;
        for record in &self.records {
            let far = record.offset >= u64::from(U32_MARK);
            let mut extra = Fields::default();
            if record.zip64 || far {
                let mut body = Fields::default();
                if record.zip64 {
                    body.u64(record.uncompressed).u64(record.compressed);
                }
                if far {
                    body.u64(record.offset);
                }
                extra.u16(ZIP64_EXTRA).u16(body.size()?).bytes(&body.0);
            }
            let version = if record.zip64 || far { VERSION_ZIP64 } else { VERSION_DEFAULT };
            let (compressed, uncompressed) = if record.zip64 {
                (U32_MARK, U32_MARK)
            } else {
                (clamp_u32(record.compressed), clamp_u32(record.uncompressed))
            };
            let mut header = Fields::default();
            header
                .u32(CENTRAL_HEADER)
                .u16(MADE_BY_UNIX | version)
                .u16(version)
                .u16(FLAGS)
                .u16(record.method.code())
                .u16(record.modified.time)
                .u16(record.modified.date)
                .u32(record.crc)
                .u32(compressed)
                .u32(uncompressed)
                .u16(fit_u16(record.name.len(), "entry name")?)
                .u16(extra.size()?)
                .u16(0)
                .u16(0)
                .u16(0)
                .u32(FILE_MODE << 16)
                .u32(if far { U32_MARK } else { clamp_u32(record.offset) })
                .bytes(&record.name)
                .bytes(&extra.0);
            self.out.write_all(&header.0)?;
        }
        let dir_size = self.out.count - dir_start;
        let entries = self.records.len() as u64;

        let mut end = Fields::default();
        if entries >= u64::from(U16_MARK) || dir_start >= u64::from(U32_MARK) || dir_size >= u64::from(U32_MARK) {
            let zip64_end = self.out.count;
            end.u32(ZIP64_END)
                .u64(44)
                .u16(MADE_BY_UNIX | VERSION_ZIP64)
                .u16(VERSION_ZIP64)
                .u32(0)
                .u32(0)
                .u64(entries)
                .u64(entries)
                .u64(dir_size)
                .u64(dir_start)
                .u32(ZIP64_LOCATOR)
                .u32(0)
                .u64(zip64_end)
                .u32(1);
        }
        let short_entries = u16::try_from(entries).unwrap_or(U16_MARK);
        end.u32(END_OF_DIRECTORY)
            .u16(0)
            .u16(0)
            .u16(short_entries)
            .u16(short_entries)
            .u32(clamp_u32(dir_size))
            .u32(clamp_u32(dir_start))
            .u16(0);
        self.out.write_all(&end.0)?;
        self.out.flush()?;
        Ok(self.out.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use zip::{CompressionMethod, ZipArchive};

    use super::*;

    fn at(year: i16, month: i8, day: i8, hour: i8, minute: i8, second: i8) -> civil::DateTime {
        civil::date(year, month, day).at(hour, minute, second, 0)
    }

    fn encode(entries: &[(&str, &[u8])], method: Method) -> Vec<u8> {
        let mut encoder = Encoder::new(Vec::new());
        for (name, content) in entries {
            let written = encoder
                .append(name, content.len() as u64, method, at(2024, 5, 17, 13, 45, 31), *content)
                .unwrap();
            assert_eq!(written, content.len() as u64);
        }
        assert_eq!(encoder.entries(), entries.len());
        encoder.finish().unwrap()
    }

    #[test]
    fn dos_time_packs_fields() {
        let dos = DosTime::from(at(2024, 5, 17, 13, 45, 31));
        assert_eq!(dos.date, (44 << 9) | (5 << 5) | 17);
        assert_eq!(dos.time, (13 << 11) | (45 << 5) | 15);
        let early = DosTime::from(at(1970, 1, 1, 0, 0, 0));
        assert_eq!((early.date, early.time), ((1 << 5) | 1, 0));
    }

    #[test]
    fn stock_reader_accepts_the_output() {
        for method in [Method::Stored, Method::Deflated { level: 6 }] {
            let bytes = encode(&[("a.txt", &b"0123456789"[..]), ("dir/empty", &b""[..])], method);
            let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
            assert_eq!(archive.len(), 2);
            let mut first = archive.by_index(0).unwrap();
            assert_eq!(first.name(), "a.txt");
            let expected = if method == Method::Stored {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            assert_eq!(first.compression(), expected);
            assert_eq!(first.unix_mode(), Some(FILE_MODE));
            let mut content = Vec::new();
            first.read_to_end(&mut content).unwrap();
            assert_eq!(content, b"0123456789");
        }
    }

    #[test]
    fn directory_records_point_at_each_entry() {
        let bytes = encode(&[("same.txt", &b"first"[..]), ("same.txt", &b"second"[..])], Method::Stored);
        let tail = &bytes[bytes.len() - 22..];
        assert_eq!(u32::from_le_bytes(tail[..4].try_into().unwrap()), END_OF_DIRECTORY);
        assert_eq!(u16::from_le_bytes(tail[10..12].try_into().unwrap()), 2);

        let dir_start = u32::from_le_bytes(tail[16..20].try_into().unwrap()) as usize;
        let mut cursor = dir_start;
        let mut found = Vec::new();
        for _ in 0..2 {
            let header = &bytes[cursor..];
            assert_eq!(u32::from_le_bytes(header[..4].try_into().unwrap()), CENTRAL_HEADER);
            let size = u32::from_le_bytes(header[20..24].try_into().unwrap()) as usize;
            let name_len = u16::from_le_bytes(header[28..30].try_into().unwrap()) as usize;
            let offset = u32::from_le_bytes(header[42..46].try_into().unwrap()) as usize;
            let local_name_len = u16::from_le_bytes(bytes[offset + 26..offset + 28].try_into().unwrap()) as usize;
            let data = offset + 30 + local_name_len;
            found.push((
                String::from_utf8(header[46..46 + name_len].to_vec()).unwrap(),
                bytes[data..data + size].to_vec(),
            ));
            cursor += 46 + name_len;
        }
        assert_eq!(
            found,
            [
                ("same.txt".to_string(), b"first".to_vec()),
                ("same.txt".to_string(), b"second".to_vec())
            ]
        );
    }

    #[test]
    fn overlong_name_is_rejected() {
        let mut encoder = Encoder::new(Vec::new());
        let name = "x".repeat(usize::from(u16::MAX) + 1);
        let err = encoder
            .append(&name, 1, Method::Stored, at(2024, 1, 1, 0, 0, 0), &b"x"[..])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(encoder.entries(), 0);
    }

    #[test]
    fn large_entries_carry_zip64_sizes() {
        let mut encoder = Encoder::new(Vec::new());
        // Declared size alone decides the layout; the content stays tiny.
        encoder
            .append("big.bin", ZIP64_ENTRY_THRESHOLD, Method::Stored, at(2024, 1, 1, 0, 0, 0), &b"abc"[..])
            .unwrap();
        let bytes = encoder.finish().unwrap();
        assert_eq!(u16::from_le_bytes(bytes[4..6].try_into().unwrap()), VERSION_ZIP64);
        assert_eq!(u32::from_le_bytes(bytes[18..22].try_into().unwrap()), U32_MARK);

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.size(), 3);
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"abc");
    }
}
