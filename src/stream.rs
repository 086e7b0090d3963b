use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};

use crate::error::LispResult;

/// Growth step for streams whose size is not known up front.
const CHUNK: usize = 8192;

/// Appended to a bounded output buffer that ran out of room.
pub const OVERFLOW_MARKER: &str = "$$";

enum Source {
    /// Everything is in `buf`.
    Memory,
    /// Bytes still arrive from `reader`. `size` is known for regular files.
    Reader {
        reader: Box<dyn Read>,
        size: Option<usize>,
    },
}

/// A character source over either an in-memory buffer or a byte reader.
///
/// Reader-backed streams fill `buf` lazily and keep every byte read, so the reader
/// can always step back and slice tokens out of the buffer. Once the reader is
/// exhausted the stream turns into a memory stream.
pub struct Stream {
    source: Source,
    buf: Vec<u8>,
    pos: usize,
}

impl Stream {
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Stream {
            source: Source::Memory,
            buf: bytes,
            pos: 0,
        }
    }

    /// A stream over an open file. Regular files are buffered at their full size.
    pub fn from_file(file: File) -> io::Result<Self> {
        let meta = file.metadata()?;
        let size = if meta.is_file() {
            Some(meta.len() as usize)
        } else {
            None
        };
        Ok(Stream {
            source: Source::Reader {
                reader: Box::new(file),
                size,
            },
            buf: Vec::with_capacity(size.unwrap_or(CHUNK)),
            pos: 0,
        })
    }

    /// A stream over any reader (stdin, a pipe), buffered in fixed increments.
    pub fn from_reader(reader: impl Read + 'static) -> Self {
        Stream {
            source: Source::Reader {
                reader: Box::new(reader),
                size: None,
            },
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Next byte, or None at end of stream.
    pub fn get(&mut self) -> LispResult<Option<u8>> {
        if self.pos >= self.buf.len() && !self.fill()? {
            return Ok(None);
        }
        let ch = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(ch))
    }

    /// Next byte without consuming it.
    pub fn peek(&mut self) -> LispResult<Option<u8>> {
        let ch = self.get()?;
        if ch.is_some() {
            self.seek_back();
        }
        Ok(ch)
    }

    /// Step back one byte. Stops at the start of the stream.
    pub fn seek_back(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes between `start` and the current position.
    pub fn slice_from(&self, start: usize) -> &[u8] {
        &self.buf[start..self.pos]
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.source, Source::Memory)
    }

    /// Read more bytes until `pos` is inside the buffer. Returns false at end of stream.
    fn fill(&mut self) -> LispResult<bool> {
        while self.pos >= self.buf.len() {
            let Source::Reader { reader, size } = &mut self.source else {
                return Ok(false);
            };
            let start = self.buf.len();
            let want = match size {
                Some(total) if *total > start => *total - start,
                _ => CHUNK,
            };
            self.buf.resize(start + want, 0);
            let read = loop {
                match reader.read(&mut self.buf[start..]) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.buf.truncate(start);
                        return Err(e.into());
                    }
                }
            };
            self.buf.truncate(start + read);
            if read == 0 || Some(self.buf.len()) == *size {
                self.source = Source::Memory;
            }
        }
        Ok(true)
    }
}

/// Where printed output goes.
pub enum Output {
    /// Bounded in-memory buffer, used by the embedding entry points.
    Buffer(OutputBuffer),
    /// Unbounded writer (stdout for the REPL and batch modes).
    Writer(Box<dyn Write>),
}

impl Output {
    pub fn stdout() -> Self {
        Output::Writer(Box::new(io::stdout()))
    }

    pub fn write_str(&mut self, s: &str) {
        match self {
            Output::Buffer(buf) => buf.write_str(s),
            Output::Writer(w) => {
                let _ = w.write_all(s.as_bytes());
            }
        }
    }

    pub fn flush(&mut self) {
        if let Output::Writer(w) = self {
            let _ = w.flush();
        }
    }
}

/// A text buffer holding at most `capacity - 1` bytes.
///
/// On overflow the text is cut at the limit and its last two bytes become
/// `OVERFLOW_MARKER`; later writes are dropped.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    capacity: usize,
    overflow: bool,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        OutputBuffer {
            text: String::new(),
            capacity,
            overflow: false,
        }
    }

    pub fn write_str(&mut self, s: &str) {
        if self.overflow {
            return;
        }
        let limit = self.capacity.saturating_sub(1);
        let room = limit.saturating_sub(self.text.len());
        if s.len() <= room {
            self.text.push_str(s);
            return;
        }

        self.overflow = true;
        self.text.push_str(&s[..floor_char_boundary(s, room)]);
        let keep = limit.saturating_sub(OVERFLOW_MARKER.len());
        if limit >= OVERFLOW_MARKER.len() {
            let cut = floor_char_boundary(&self.text, keep);
            self.text.truncate(cut);
            self.text.push_str(OVERFLOW_MARKER);
        }
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
