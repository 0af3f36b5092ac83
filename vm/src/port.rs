//! Character ports over files, standard streams, and in-memory strings.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PortFlags(pub u8);

impl PortFlags {
    pub const NONE: Self = Self(0);
    pub const INPUT: Self = Self(1 << 0);
    pub const OUTPUT: Self = Self(1 << 1);
    pub const SAW_EOF: Self = Self(1 << 2);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline(always)]
    pub const fn without(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }
}

enum Backend {
    Reader(Box<dyn BufRead>),
    Writer(Box<dyn Write>),
    /// String input: characters and read position.
    Source { text: Vec<char>, pos: usize },
    /// String output accumulator.
    Sink(String),
    Closed,
}

pub struct Port {
    flags: PortFlags,
    backend: Backend,
    peeked: Option<char>,
    name: String,
    line: usize,
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("line", &self.line)
            .finish()
    }
}

fn not_open(direction: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("port is not open for {direction}"),
    )
}

impl Port {
    fn with_backend(flags: PortFlags, backend: Backend, name: impl Into<String>) -> Self {
        Self {
            flags,
            backend,
            peeked: None,
            name: name.into(),
            line: 1,
        }
    }

    pub fn stdin() -> Self {
        Self::reader(Box::new(BufReader::new(io::stdin())), "<stdin>")
    }

    pub fn stdout() -> Self {
        Self::writer(Box::new(io::stdout()), "<stdout>")
    }

    pub fn reader(reader: Box<dyn BufRead>, name: impl Into<String>) -> Self {
        Self::with_backend(PortFlags::INPUT, Backend::Reader(reader), name)
    }

    pub fn writer(writer: Box<dyn Write>, name: impl Into<String>) -> Self {
        Self::with_backend(PortFlags::OUTPUT, Backend::Writer(writer), name)
    }

    pub fn input_file(file: File, name: impl Into<String>) -> Self {
        Self::reader(Box::new(BufReader::new(file)), name)
    }

    pub fn output_file(file: File, name: impl Into<String>) -> Self {
        Self::writer(Box::new(BufWriter::new(file)), name)
    }

    pub fn input_string(text: &str) -> Self {
        Self::with_backend(
            PortFlags::INPUT,
            Backend::Source {
                text: text.chars().collect(),
                pos: 0,
            },
            "<string>",
        )
    }

    pub fn output_string() -> Self {
        Self::with_backend(PortFlags::OUTPUT, Backend::Sink(String::new()), "<string>")
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.flags.contains(PortFlags::INPUT)
    }

    #[inline]
    pub fn is_output(&self) -> bool {
        self.flags.contains(PortFlags::OUTPUT)
    }

    #[inline]
    pub fn saw_eof(&self) -> bool {
        self.flags.contains(PortFlags::SAW_EOF)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.backend, Backend::Closed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based line of the next character to be read.
    pub fn line(&self) -> usize {
        self.line
    }

    fn decode(reader: &mut dyn BufRead) -> io::Result<Option<char>> {
        let mut buf = [0u8; 4];
        let first = {
            let available = reader.fill_buf()?;
            match available.first() {
                Some(byte) => *byte,
                None => return Ok(None),
            }
        };
        reader.consume(1);
        let width = match first {
            0x00..=0x7f => return Ok(Some(first as char)),
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8")),
        };
        buf[0] = first;
        reader.read_exact(&mut buf[1..width])?;
        std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .map(Some)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8"))
    }

    fn next_raw(&mut self) -> io::Result<Option<char>> {
        if let Some(c) = self.peeked.take() {
            return Ok(Some(c));
        }
        match &mut self.backend {
            Backend::Reader(reader) => Self::decode(reader.as_mut()),
            Backend::Source { text, pos } => {
                let c = text.get(*pos).copied();
                if c.is_some() {
                    *pos += 1;
                }
                Ok(c)
            }
            _ => Err(not_open("input")),
        }
    }

    /// Consumes one character. `None` at end of input.
    pub fn read_char(&mut self) -> io::Result<Option<char>> {
        if !self.is_input() {
            return Err(not_open("input"));
        }
        let c = self.next_raw()?;
        match c {
            Some('\n') => self.line += 1,
            None => self.flags = self.flags.with(PortFlags::SAW_EOF),
            _ => {}
        }
        Ok(c)
    }

    pub fn peek_char(&mut self) -> io::Result<Option<char>> {
        if !self.is_input() {
            return Err(not_open("input"));
        }
        if self.peeked.is_none() {
            self.peeked = self.next_raw()?;
        }
        Ok(self.peeked)
    }

    /// Whether a character can be read without blocking.
    pub fn char_ready(&mut self) -> bool {
        match &mut self.backend {
            Backend::Source { .. } => true,
            Backend::Reader(reader) => {
                self.peeked.is_some() || reader.fill_buf().is_ok_and(|buf| !buf.is_empty())
            }
            _ => false,
        }
    }

    pub fn write_str(&mut self, text: &str) -> io::Result<()> {
        match &mut self.backend {
            Backend::Writer(writer) => writer.write_all(text.as_bytes()),
            Backend::Sink(buffer) => {
                buffer.push_str(text);
                Ok(())
            }
            _ => Err(not_open("output")),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.backend {
            Backend::Writer(writer) => writer.flush(),
            _ => Ok(()),
        }
    }

    /// Accumulated text of a string output port.
    pub fn output_text(&self) -> Option<&str> {
        match &self.backend {
            Backend::Sink(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn take_output(&mut self) -> Option<String> {
        match &mut self.backend {
            Backend::Sink(buffer) => Some(std::mem::take(buffer)),
            _ => None,
        }
    }

    /// Closes one direction; the port is released once neither is open.
    pub fn close(&mut self, flag: PortFlags) -> io::Result<()> {
        let result = self.flush();
        self.flags = self.flags.without(flag);
        if !self.is_input() && !self.is_output() {
            self.backend = Backend::Closed;
            self.peeked = None;
        }
        result
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("flushing port {} failed: {err}", self.name);
        }
    }
}
