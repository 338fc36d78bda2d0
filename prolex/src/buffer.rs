//! Character stream buffers.
//!
//! Two reading forms: [`StringSource`] holds the whole text in memory;
//! [`FileSource`] keeps a fixed-size window of decoded characters over a
//! file, refilled on miss, with the encoding detected from a byte-order
//! marker. Both give random access by character offset, which is what the
//! rewind machinery needs. [`ListingWriter`] is the writing counterpart
//! used for generated output: it tracks indentation and wraps words at a
//! right margin, independent of the reading path.

use crate::error::ScanError;
use anyhow::Result;
use smartstring::alias::String;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Random access to source text by character offset.
///
/// `char_at` past the end returns `Ok(None)`; unreadable input surfaces as
/// [`ScanError::Io`], never as a syntax error.
pub trait TextSource {
    fn source_name(&self) -> &str;

    fn char_at(&mut self, offset: usize) -> Result<Option<char>>;

    /// The text of `[start, end)`, by character offsets.
    fn substring(&mut self, start: usize, end: usize) -> Result<String> {
        let mut s = String::new();
        for i in start..end {
            match self.char_at(i)? {
                Some(c) => s.push(c),
                None => break,
            }
        }
        Ok(s)
    }
}

/// Fully in-memory source.
#[derive(Debug, Clone)]
pub struct StringSource {
    name: String,
    chars: Vec<char>,
}

impl StringSource {
    pub fn new(name: &str, text: &str) -> Self {
        Self {
            name: name.into(),
            chars: text.chars().collect(),
        }
    }
}

impl TextSource for StringSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn char_at(&mut self, offset: usize) -> Result<Option<char>> {
        Ok(self.chars.get(offset).copied())
    }
}

/// Source encoding, detected from the byte-order marker.
///
/// Without a BOM the source is read as UTF-8; bytes that do not form valid
/// UTF-8 are taken as single Latin-1 characters, which covers plain
/// single-byte files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

const CACHE_CHARS: usize = 4096;

/// Block-cached file-backed source.
///
/// The cache holds one block of `CACHE_CHARS` decoded characters;
/// `checkpoints[b]` records the byte offset where block `b` starts, so a
/// rewind to any previously visited position refills without re-decoding
/// the whole file.
#[derive(Debug)]
pub struct FileSource {
    name: String,
    file: File,
    encoding: Encoding,
    cache: Vec<char>,
    cache_start: usize,
    checkpoints: Vec<u64>,
    end: Option<usize>,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let name: String = path.to_string_lossy().as_ref().into();
        let mut file = File::open(path).map_err(|e| ScanError::Io {
            source_name: name.clone(),
            source: e,
        })?;
        let mut bom = [0u8; 3];
        let got = read_up_to(&mut file, &mut bom).map_err(|e| ScanError::Io {
            source_name: name.clone(),
            source: e,
        })?;
        let (encoding, bom_len) = match &bom[..got] {
            [0xEF, 0xBB, 0xBF] => (Encoding::Utf8, 3u64),
            [0xFF, 0xFE, ..] => (Encoding::Utf16Le, 2),
            [0xFE, 0xFF, ..] => (Encoding::Utf16Be, 2),
            _ => (Encoding::Utf8, 0),
        };
        Ok(Self {
            name,
            file,
            encoding,
            cache: Vec::new(),
            cache_start: 0,
            checkpoints: vec![bom_len],
            end: None,
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Load the cache with block `b`, extending `checkpoints` as needed.
    fn fill_block(&mut self, block: usize) -> Result<()> {
        // Decode forward until the start of the requested block is known.
        while self.checkpoints.len() <= block {
            let last = self.checkpoints.len() - 1;
            self.decode_block(last)?;
            if self.end.is_some() {
                return Ok(());
            }
        }
        self.decode_block(block)
    }

    fn decode_block(&mut self, block: usize) -> Result<()> {
        let byte_start = self.checkpoints[block];
        self.file
            .seek(SeekFrom::Start(byte_start))
            .map_err(|e| ScanError::Io {
                source_name: self.name.clone(),
                source: e,
            })?;
        // Worst case four bytes per character, plus one partial sequence.
        let mut raw = vec![0u8; CACHE_CHARS * 4 + 4];
        let got = read_up_to(&mut self.file, &mut raw).map_err(|e| ScanError::Io {
            source_name: self.name.clone(),
            source: e,
        })?;
        raw.truncate(got);

        let (chars, consumed) = match self.encoding {
            Encoding::Utf8 => decode_utf8(&raw, CACHE_CHARS),
            Encoding::Utf16Le => decode_utf16(&raw, CACHE_CHARS, true),
            Encoding::Utf16Be => decode_utf16(&raw, CACHE_CHARS, false),
        };

        let n = chars.len();
        self.cache = chars;
        self.cache_start = block * CACHE_CHARS;
        if n < CACHE_CHARS {
            self.end = Some(self.cache_start + n);
        } else if self.checkpoints.len() == block + 1 {
            self.checkpoints.push(byte_start + consumed as u64);
        }
        Ok(())
    }
}

impl TextSource for FileSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn char_at(&mut self, offset: usize) -> Result<Option<char>> {
        if let Some(end) = self.end
            && offset >= end
        {
            return Ok(None);
        }
        let in_cache =
            !self.cache.is_empty() && offset >= self.cache_start && offset < self.cache_start + self.cache.len();
        if !in_cache {
            self.fill_block(offset / CACHE_CHARS)?;
        }
        Ok(self.cache.get(offset.wrapping_sub(self.cache_start)).copied())
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Decode up to `max_chars` characters; invalid sequences fall back to
/// Latin-1, one byte per character. Returns the characters and the number
/// of bytes consumed.
fn decode_utf8(bytes: &[u8], max_chars: usize) -> (Vec<char>, usize) {
    let mut chars = Vec::with_capacity(max_chars.min(bytes.len()));
    let mut pos = 0;
    while chars.len() < max_chars && pos < bytes.len() {
        let b = bytes[pos];
        let width = match b {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 0,
        };
        if width == 0 || pos + width > bytes.len() {
            if width != 0 && pos + width > bytes.len() && bytes.len() - pos < 4 {
                // Partial sequence at the end of the read window.
                break;
            }
            chars.push(bytes[pos] as char);
            pos += 1;
            continue;
        }
        match str::from_utf8(&bytes[pos..pos + width]) {
            Ok(s) => {
                chars.push(s.chars().next().unwrap());
                pos += width;
            }
            Err(_) => {
                chars.push(bytes[pos] as char);
                pos += 1;
            }
        }
    }
    (chars, pos)
}

fn decode_utf16(bytes: &[u8], max_chars: usize, little_endian: bool) -> (Vec<char>, usize) {
    let unit = |i: usize| -> u16 {
        if little_endian {
            u16::from_le_bytes([bytes[i], bytes[i + 1]])
        } else {
            u16::from_be_bytes([bytes[i], bytes[i + 1]])
        }
    };
    let mut chars = Vec::new();
    let mut pos = 0;
    while chars.len() < max_chars && pos + 2 <= bytes.len() {
        let u = unit(pos);
        if (0xD800..0xDC00).contains(&u) {
            if pos + 4 > bytes.len() {
                break;
            }
            let lo = unit(pos + 2);
            let c = char::decode_utf16([u, lo].into_iter())
                .next()
                .and_then(|r| r.ok())
                .unwrap_or('\u{FFFD}');
            chars.push(c);
            pos += 4;
        } else {
            chars.push(char::from_u32(u as u32).unwrap_or('\u{FFFD}'));
            pos += 2;
        }
    }
    (chars, pos)
}

/// Indenting, word-wrapping writer for generated listings.
#[derive(Debug, Clone)]
pub struct ListingWriter {
    out: std::string::String,
    margin: usize,
    indent_unit: usize,
    level: usize,
    col: usize,
    need_space: bool,
}

impl ListingWriter {
    pub fn new(margin: usize) -> Self {
        Self {
            out: std::string::String::new(),
            margin,
            indent_unit: 4,
            level: 0,
            col: 0,
            need_space: false,
        }
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn outdent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    fn start_line_if_needed(&mut self) {
        if self.col == 0 {
            let pad = self.level * self.indent_unit;
            self.out.extend(std::iter::repeat_n(' ', pad));
            self.col = pad;
            self.need_space = false;
        }
    }

    /// Append one word, wrapping to a fresh indented line when it would
    /// cross the right margin.
    pub fn word(&mut self, w: &str) {
        let sep = if self.need_space { 1 } else { 0 };
        if self.col > 0 && self.col + sep + w.chars().count() > self.margin {
            self.newline();
        }
        self.start_line_if_needed();
        if self.need_space {
            self.out.push(' ');
            self.col += 1;
        }
        self.out.push_str(w);
        self.col += w.chars().count();
        self.need_space = true;
    }

    /// Append punctuation with no separating space and no wrap.
    pub fn punct(&mut self, p: &str) {
        self.start_line_if_needed();
        self.out.push_str(p);
        self.col += p.chars().count();
        self.need_space = true;
    }

    pub fn newline(&mut self) {
        self.out.push('\n');
        self.col = 0;
        self.need_space = false;
    }

    pub fn finish(mut self) -> std::string::String {
        if self.col > 0 {
            self.out.push('\n');
        }
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn string_source_random_access() {
        let mut s = StringSource::new("mem", "aβc");
        assert_eq!(s.char_at(1).unwrap(), Some('β'));
        assert_eq!(s.char_at(0).unwrap(), Some('a'));
        assert_eq!(s.char_at(3).unwrap(), None);
        assert_eq!(s.substring(0, 2).unwrap(), "aβ");
    }

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("prolex-buffer-{}-{}", std::process::id(), name));
        let mut f = File::create(&p).unwrap();
        f.write_all(bytes).unwrap();
        p
    }

    #[test]
    fn file_source_utf8_with_rewind() {
        let text: std::string::String = "x = 1\n".repeat(3000);
        let p = temp_file("utf8", text.as_bytes());
        let mut src = FileSource::open(&p).unwrap();
        assert_eq!(src.encoding(), Encoding::Utf8);
        // Walk forward past the first cache block, then rewind.
        let n = text.chars().count();
        for (i, c) in text.chars().enumerate() {
            assert_eq!(src.char_at(i).unwrap(), Some(c), "offset {}", i);
        }
        assert_eq!(src.char_at(n).unwrap(), None);
        assert_eq!(src.char_at(2).unwrap(), Some('='));
        assert_eq!(src.char_at(CACHE_CHARS + 1).unwrap(), text.chars().nth(CACHE_CHARS + 1));
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn file_source_detects_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for u in "ab\nc".encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        let p = temp_file("utf16", &bytes);
        let mut src = FileSource::open(&p).unwrap();
        assert_eq!(src.encoding(), Encoding::Utf16Le);
        assert_eq!(src.char_at(0).unwrap(), Some('a'));
        assert_eq!(src.char_at(2).unwrap(), Some('\n'));
        assert_eq!(src.char_at(4).unwrap(), None);
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn missing_file_is_io_failure() {
        let err = FileSource::open(Path::new("/nonexistent/prolex-test")).unwrap_err();
        assert!(err.downcast_ref::<ScanError>().is_some_and(|e| matches!(e, ScanError::Io { .. })));
    }

    #[test]
    fn listing_writer_wraps_and_indents() {
        let mut w = ListingWriter::new(16);
        w.word("head");
        w.punct(" :-");
        w.newline();
        w.indent();
        for g in ["first_goal,", "second_goal,", "third_goal."] {
            w.word(g);
        }
        let text = w.finish();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "head :-");
        assert!(lines[1].starts_with("    first_goal,"));
        // The margin forces each long goal onto its own line.
        assert!(lines.iter().skip(1).all(|l| l.starts_with("    ")));
        assert!(lines.len() >= 3);
    }
}
