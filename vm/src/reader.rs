//! The datum reader.
//!
//! Parsing is iterative: open lists and vectors live on a small stack of
//! pending constructions whose elements are rooted on the scratch stack, so
//! a collection in the middle of a datum cannot free the parts already read
//! and deep nesting cannot exhaust the native stack.

use heap::CellRef;

use crate::{
    error::ReadError,
    interpreter::Interpreter,
    number::{self, Number},
    port::Port,
    Result,
};

enum Token {
    Open,
    Close,
    Dot,
    VectorOpen,
    /// `'`, `` ` ``, `,` or `,@` followed by a datum.
    Prefix(CellRef),
    /// `#;` discards the next datum.
    DatumComment,
    Atom(CellRef),
    Eof,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Dot {
    Absent,
    /// `.` seen, tail not read yet.
    Pending,
    /// Tail read; it sits on top of the scratch stack.
    Read,
}

enum Pending {
    List { start: usize, dot: Dot },
    Vector { start: usize },
    Prefix(CellRef),
    Skip,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"' | ';')
}

fn char_named(name: &str) -> Option<char> {
    let c = match name {
        "space" => ' ',
        "newline" | "linefeed" | "nl" => '\n',
        "tab" => '\t',
        "return" => '\r',
        "nul" | "null" => '\0',
        "altmode" | "escape" => '\x1b',
        "backspace" => '\x08',
        "delete" | "rubout" => '\x7f',
        "alarm" => '\x07',
        _ => {
            let hex = name.strip_prefix('x')?;
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    };
    Some(c)
}

impl Interpreter {
    fn next_char(&mut self, port: CellRef) -> Result<Option<char>> {
        Ok(self.port_mut(port, "read")?.read_char()?)
    }

    fn peek_char(&mut self, port: CellRef) -> Result<Option<char>> {
        Ok(self.port_mut(port, "read")?.peek_char()?)
    }

    /// Reads characters up to the next delimiter, which is left unread.
    fn read_token(&mut self, port: CellRef, mut token: String) -> Result<String> {
        while let Some(c) = self.peek_char(port)? {
            if is_delimiter(c) {
                break;
            }
            self.next_char(port)?;
            token.push(c);
        }
        Ok(token)
    }

    fn skip_atmosphere(&mut self, port: CellRef) -> Result<()> {
        while let Some(c) = self.peek_char(port)? {
            if c == ';' {
                while !matches!(self.next_char(port)?, Some('\n') | None) {}
            } else if c.is_whitespace() {
                self.next_char(port)?;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Skips a `#| ... |#` comment whose opening has been consumed. Nests.
    fn skip_block_comment(&mut self, port: CellRef) -> Result<()> {
        let mut depth = 1;
        let mut previous = None;
        while depth > 0 {
            let Some(c) = self.next_char(port)? else {
                return Err(ReadError::UnexpectedEof.into());
            };
            match (previous, c) {
                (Some('|'), '#') => {
                    depth -= 1;
                    previous = None;
                    continue;
                }
                (Some('#'), '|') => {
                    depth += 1;
                    previous = None;
                    continue;
                }
                _ => {}
            }
            previous = Some(c);
        }
        Ok(())
    }

    fn read_string_literal(&mut self, port: CellRef) -> Result<CellRef> {
        let mut text = String::new();
        loop {
            let Some(c) = self.next_char(port)? else {
                return Err(ReadError::UnexpectedEof.into());
            };
            match c {
                '"' => break,
                '\\' => {
                    let Some(escape) = self.next_char(port)? else {
                        return Err(ReadError::UnexpectedEof.into());
                    };
                    match escape {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        'a' => text.push('\x07'),
                        '0' => text.push('\0'),
                        '\\' | '"' => text.push(escape),
                        '\n' => {
                            while matches!(self.peek_char(port)?, Some(' ' | '\t')) {
                                self.next_char(port)?;
                            }
                        }
                        'x' => {
                            let mut hex = String::new();
                            while let Some(h) = self.next_char(port)? {
                                if h == ';' {
                                    break;
                                }
                                hex.push(h);
                                if hex.len() == 2 && !matches!(self.peek_char(port)?, Some(';')) {
                                    break;
                                }
                            }
                            let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                            text.push(decoded.ok_or_else(|| ReadError::BadEscape(format!("x{hex}")))?);
                        }
                        other => return Err(ReadError::BadEscape(other.to_string()).into()),
                    }
                }
                _ => text.push(c),
            }
        }
        self.make_immutable_string(text)
    }

    fn read_character(&mut self, port: CellRef) -> Result<CellRef> {
        let Some(first) = self.next_char(port)? else {
            return Err(ReadError::UnexpectedEof.into());
        };
        let name = self.read_token(port, first.to_string())?;
        let c = if name.chars().count() == 1 {
            Some(first)
        } else {
            char_named(&name.to_lowercase())
        };
        match c {
            Some(c) => self.make_character(c),
            None => Err(ReadError::BadCharacter(name).into()),
        }
    }

    /// `#e`, `#i`, and radix prefixes. `prefix` has been consumed.
    fn read_prefixed_number(&mut self, port: CellRef, prefix: char) -> Result<CellRef> {
        let token = self.read_token(port, String::new())?;
        let bad = || ReadError::BadHash(format!("{prefix}{token}"));
        let parsed = match prefix.to_ascii_lowercase() {
            'x' => number::parse(&token, 16),
            'b' => number::parse(&token, 2),
            'o' => number::parse(&token, 8),
            'd' => number::parse(&token, 10),
            'e' => match number::parse(&token, 10) {
                Some(n) => Some(n.to_exact()?),
                None => None,
            },
            'i' => number::parse(&token, 10).map(|n| Number::Real(n.to_f64())),
            _ => None,
        };
        match parsed {
            Some(n) => self.make_number(n),
            None => Err(bad().into()),
        }
    }

    fn read_hash(&mut self, port: CellRef) -> Result<Option<Token>> {
        let Some(c) = self.next_char(port)? else {
            return Err(ReadError::UnexpectedEof.into());
        };
        let token = match c {
            '(' => Token::VectorOpen,
            '\\' => Token::Atom(self.read_character(port)?),
            '|' => {
                self.skip_block_comment(port)?;
                return Ok(None);
            }
            '!' => {
                while !matches!(self.next_char(port)?, Some('\n') | None) {}
                return Ok(None);
            }
            ';' => Token::DatumComment,
            't' | 'f' => {
                let rest = self.read_token(port, c.to_string())?;
                match rest.as_str() {
                    "t" | "true" => Token::Atom(self.st.sp.t),
                    "f" | "false" => Token::Atom(self.st.sp.f),
                    _ => return Err(ReadError::BadHash(rest).into()),
                }
            }
            'x' | 'X' | 'b' | 'B' | 'o' | 'O' | 'd' | 'D' | 'e' | 'E' | 'i' | 'I' => {
                Token::Atom(self.read_prefixed_number(port, c)?)
            }
            other => {
                let rest = self.read_token(port, other.to_string())?;
                return Err(ReadError::BadHash(rest).into());
            }
        };
        Ok(Some(token))
    }

    fn next_token(&mut self, port: CellRef) -> Result<Token> {
        loop {
            self.skip_atmosphere(port)?;
            let Some(c) = self.next_char(port)? else {
                return Ok(Token::Eof);
            };
            let sym = self.st.sym;
            let token = match c {
                '(' | '[' => Token::Open,
                ')' | ']' => Token::Close,
                '\'' => Token::Prefix(sym.quote),
                '`' => Token::Prefix(sym.quasiquote),
                ',' => {
                    if self.peek_char(port)? == Some('@') {
                        self.next_char(port)?;
                        Token::Prefix(sym.unquote_splicing)
                    } else {
                        Token::Prefix(sym.unquote)
                    }
                }
                '"' => Token::Atom(self.read_string_literal(port)?),
                '#' => match self.read_hash(port)? {
                    Some(token) => token,
                    None => continue,
                },
                _ => {
                    let text = self.read_token(port, c.to_string())?;
                    if text == "." {
                        Token::Dot
                    } else if let Some(n) = number::parse(&text, 10) {
                        Token::Atom(self.make_number(n)?)
                    } else {
                        Token::Atom(self.intern(&text)?)
                    }
                }
            };
            return Ok(token);
        }
    }

    /// Reads one datum from `port`. Returns the eof object when the input
    /// ends between data.
    pub fn read_datum(&mut self, port: CellRef) -> Result<CellRef> {
        let base = self.st.scratch.len();
        let result = self.read_pending(port, base);
        self.st.scratch.truncate(base);
        result
    }

    /// Reads every datum in `source` into a list, evaluating nothing. An
    /// unterminated datum fails with [`ReadError::UnexpectedEof`].
    pub fn read_str(&mut self, source: &str) -> Result<CellRef> {
        let port = self.make_port(Port::input_string(source))?;
        let base = self.st.scratch.len();
        self.st.scratch.push(port);
        let result = self.read_to_end(port, base + 1);
        self.st.scratch.truncate(base);
        result
    }

    fn read_to_end(&mut self, port: CellRef, first: usize) -> Result<CellRef> {
        loop {
            let datum = self.read_datum(port)?;
            if datum == self.st.sp.eof {
                break;
            }
            self.st.scratch.push(datum);
        }
        let items = self.st.scratch[first..].to_vec();
        self.list_from(&items)
    }

    fn read_pending(&mut self, port: CellRef, base: usize) -> Result<CellRef> {
        let mut stack: Vec<Pending> = Vec::new();
        loop {
            let mut datum = match self.next_token(port)? {
                Token::Eof if stack.is_empty() => return Ok(self.st.sp.eof),
                Token::Eof => return Err(ReadError::UnexpectedEof.into()),
                Token::Open => {
                    let start = self.st.scratch.len();
                    stack.push(Pending::List { start, dot: Dot::Absent });
                    continue;
                }
                Token::VectorOpen => {
                    let start = self.st.scratch.len();
                    stack.push(Pending::Vector { start });
                    continue;
                }
                Token::Prefix(symbol) => {
                    stack.push(Pending::Prefix(symbol));
                    continue;
                }
                Token::DatumComment => {
                    stack.push(Pending::Skip);
                    continue;
                }
                Token::Dot => match stack.last_mut() {
                    Some(Pending::List { start, dot }) if *dot == Dot::Absent && self.st.scratch.len() > *start => {
                        *dot = Dot::Pending;
                        continue;
                    }
                    _ => return Err(ReadError::BadDot.into()),
                },
                Token::Close => self.close_pending(stack.pop())?,
                Token::Atom(cell) => cell,
            };

            // Hand the datum to whatever is waiting for it.
            loop {
                match stack.last_mut() {
                    None => {
                        debug_assert_eq!(self.st.scratch.len(), base);
                        return Ok(datum);
                    }
                    Some(Pending::Prefix(symbol)) => {
                        let symbol = *symbol;
                        stack.pop();
                        datum = self.list_from(&[symbol, datum])?;
                    }
                    Some(Pending::Skip) => {
                        stack.pop();
                        break;
                    }
                    Some(Pending::List { dot, .. }) => {
                        match *dot {
                            Dot::Absent => {}
                            Dot::Pending => *dot = Dot::Read,
                            Dot::Read => return Err(ReadError::BadDot.into()),
                        }
                        self.st.scratch.push(datum);
                        break;
                    }
                    Some(Pending::Vector { .. }) => {
                        self.st.scratch.push(datum);
                        break;
                    }
                }
            }
        }
    }

    fn close_pending(&mut self, pending: Option<Pending>) -> Result<CellRef> {
        match pending {
            Some(Pending::List { start, dot }) => {
                let tail = match dot {
                    Dot::Absent => self.st.sp.nil,
                    Dot::Pending => return Err(ReadError::BadDot.into()),
                    Dot::Read => self.st.scratch[self.st.scratch.len() - 1],
                };
                let end = self.st.scratch.len() - usize::from(dot == Dot::Read);
                let items = self.st.scratch[start..end].to_vec();
                let list = self.list_with_tail(&items, tail)?;
                self.st.scratch.truncate(start);
                Ok(list)
            }
            Some(Pending::Vector { start }) => {
                let items = self.st.scratch.split_off(start);
                self.make_vector(items)
            }
            Some(Pending::Prefix(_) | Pending::Skip) | None => Err(ReadError::UnexpectedClose.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn read_all(interp: &mut Interpreter, source: &str) -> Result<Vec<String>> {
        let port = interp.make_port(Port::input_string(source))?;
        interp.pin(port);
        let mut out = Vec::new();
        loop {
            let datum = interp.read_datum(port)?;
            if datum == interp.eof() {
                break;
            }
            out.push(interp.write_to_string(datum));
        }
        interp.unpin(port);
        Ok(out)
    }

    #[test]
    fn reads_atoms_and_lists() {
        let mut interp = Interpreter::new().unwrap();
        let data = read_all(&mut interp, "42 -7 3.5 .5 foo \"a\\nb\" #t #false (1 . 2) (a (b c)) #(1 x)").unwrap();
        assert_eq!(
            data,
            ["42", "-7", "3.5", "0.5", "foo", "\"a\\nb\"", "#t", "#f", "(1 . 2)", "(a (b c))", "#(1 x)"]
        );
    }

    #[test]
    fn reads_prefixes_and_characters() {
        let mut interp = Interpreter::new().unwrap();
        let data = read_all(&mut interp, "'x `(a ,b ,@c) #\\a #\\space #\\( #\\x41 #xff #b101 #e2.0 #i3").unwrap();
        assert_eq!(
            data,
            [
                "(quote x)",
                "(quasiquote (a (unquote b) (unquote-splicing c)))",
                "#\\a",
                "#\\space",
                "#\\(",
                "#\\A",
                "255",
                "5",
                "2",
                "3.0",
            ]
        );
    }

    #[test]
    fn skips_comments() {
        let mut interp = Interpreter::new().unwrap();
        let data = read_all(&mut interp, "; line\n1 #| block #| nested |# |# 2 #;(ignored) 3 #!shebang\n4").unwrap();
        assert_eq!(data, ["1", "2", "3", "4"]);
    }

    #[test]
    fn symbols_that_look_numeric() {
        let mut interp = Interpreter::new().unwrap();
        let data = read_all(&mut interp, "+ - ... 1+ -> a.b").unwrap();
        assert_eq!(data, ["+", "-", "...", "1+", "->", "a.b"]);
    }

    #[test]
    fn reports_malformed_input() {
        let mut interp = Interpreter::new().unwrap();
        assert!(read_all(&mut interp, "(1 2").unwrap_err().is_incomplete_input());
        assert!(read_all(&mut interp, "\"open").unwrap_err().is_incomplete_input());
        assert!(matches!(read_all(&mut interp, ")"), Err(Error::Read(ReadError::UnexpectedClose))));
        assert!(matches!(read_all(&mut interp, "(. 1)"), Err(Error::Read(ReadError::BadDot))));
        assert!(matches!(read_all(&mut interp, "(1 . 2 3)"), Err(Error::Read(ReadError::BadDot))));
        assert!(matches!(read_all(&mut interp, "#\\bogus"), Err(Error::Read(ReadError::BadCharacter(_)))));
    }

    #[test]
    fn read_str_collects_without_evaluating() {
        let mut interp = Interpreter::new().unwrap();
        let data = interp.read_str("(define x 1) (car '())").unwrap();
        assert_eq!(interp.write_to_string(data), "((define x 1) (car (quote ())))");
        assert!(interp.lookup_global("x").is_none());
        assert!(interp.read_str("(define y").unwrap_err().is_incomplete_input());
    }

    #[test]
    fn string_literals_are_immutable() {
        let mut interp = Interpreter::new().unwrap();
        let port = interp.make_port(Port::input_string("\"abc\"")).unwrap();
        interp.pin(port);
        let datum = interp.read_datum(port).unwrap();
        assert!(interp.is_immutable(datum));
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let mut interp = Interpreter::new().unwrap();
        let depth = 50_000;
        let source = "(".repeat(depth) + &")".repeat(depth);
        let data = read_all(&mut interp, &source).unwrap();
        assert_eq!(data.len(), 1);
    }
}
