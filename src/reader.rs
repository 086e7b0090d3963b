use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::stream::Stream;
use crate::symbol::names;
use crate::value::ObjRef;

/// Reads source text from a stream into heap objects, one expression per call.
///
/// The reader only holds onto heap handles through root slots, so the collector may
/// run at any allocation while a nested list is half built.
pub struct Reader<'a> {
    stream: &'a mut Stream,
    heap: &'a mut Heap,
    depth: usize,
    max_depth: usize,
}

/// Deepest nesting of lists and quotes read by default.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

impl<'a> Reader<'a> {
    pub fn new(stream: &'a mut Stream, heap: &'a mut Heap) -> Self {
        Reader {
            stream,
            heap,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit how deeply lists and quotes may nest.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Read one expression. Returns None at end of stream.
    pub fn read(&mut self) -> LispResult<Option<ObjRef>> {
        if self.depth >= self.max_depth {
            return Err(LispError::new("nesting too deep"));
        }
        self.depth += 1;
        let result = self.read_expr();
        self.depth -= 1;
        result
    }

    fn read_expr(&mut self) -> LispResult<Option<ObjRef>> {
        let Some(ch) = self.read_next()? else {
            return Ok(None);
        };

        match ch {
            b'\'' => self.read_quote().map(Some),
            b'"' => self.read_string().map(Some),
            b'(' => self.read_list().map(Some),
            c if is_symbol_char(c) && (c != b'.' || self.peek_is_symbol_char()?) => {
                self.stream.seek_back();
                self.read_number_or_symbol().map(Some)
            }
            c => Err(LispError::new(format!(
                "unexpected character, `{}'",
                c as char
            ))),
        }
    }

    /// The next significant byte, skipping whitespace and comments, left unconsumed.
    pub fn peek_next(&mut self) -> LispResult<Option<u8>> {
        let ch = self.read_next()?;
        if ch.is_some() {
            self.stream.seek_back();
        }
        Ok(ch)
    }

    fn read_next(&mut self) -> LispResult<Option<u8>> {
        loop {
            let mut ch = self.stream.get()?;
            if ch == Some(b';') {
                loop {
                    ch = self.stream.get()?;
                    if matches!(ch, None | Some(b'\n')) {
                        break;
                    }
                }
            }
            match ch {
                Some(c) if is_space(c) => continue,
                other => return Ok(other),
            }
        }
    }

    fn peek_is_symbol_char(&mut self) -> LispResult<bool> {
        Ok(self.stream.peek()?.is_some_and(is_symbol_char))
    }

    /// `'x` becomes `(quote x)`.
    fn read_quote(&mut self) -> LispResult<ObjRef> {
        if self.peek_next()?.is_none() {
            return Err(LispError::new("unexpected end of stream in quote"));
        }
        let expr = self
            .read()?
            .ok_or_else(|| LispError::new("unexpected end of stream in quote"))?;

        let mark = self.heap.root_mark();
        let quoted = self.heap.cons(expr, self.heap.nil())?;
        let quoted = self.heap.slot(quoted);
        let quote = self.heap.intern(names::QUOTE)?;
        let form = self.heap.cons(quote, self.heap.load(quoted))?;
        self.heap.unwind(mark);
        Ok(form)
    }

    fn read_string(&mut self) -> LispResult<ObjRef> {
        let start = self.stream.position();
        let mut escaped = false;
        loop {
            match self.stream.get()? {
                None => {
                    let partial = String::from_utf8_lossy(self.stream.slice_from(start));
                    return Err(LispError::new(format!(
                        "unexpected end of stream in string literal \"{}\"",
                        partial
                    )));
                }
                Some(b'"') if !escaped => {
                    let raw = self.stream.slice_from(start);
                    return self.heap.string_from_source(&raw[..raw.len() - 1]);
                }
                Some(ch) => escaped = ch == b'\\' && !escaped,
            }
        }
    }

    /// Optional sign, digits, at most one `.` and more digits, then an optional
    /// exponent. The token is a number only if it does not run on into another symbol
    /// character.
    fn read_number_or_symbol(&mut self) -> LispResult<ObjRef> {
        let start = self.stream.position();
        let mut ch = self.stream.peek()?;

        if matches!(ch, Some(b'+' | b'-')) {
            self.stream.get()?;
            ch = self.stream.peek()?;
        }

        if ch == Some(b'.') || is_digit(ch) {
            if is_digit(ch) {
                ch = self.skip_digits()?;
            }
            if ch == Some(b'.') {
                self.stream.get()?;
                if is_digit(self.stream.peek()?) {
                    let next = self.skip_digits()?;
                    if self.ends_number(next)? {
                        return self.number_from(start);
                    }
                }
            } else if self.ends_number(ch)? {
                return self.number_from(start);
            }
        }

        while self.peek_is_symbol_char()? {
            self.stream.get()?;
        }
        self.heap.intern(self.stream.slice_from(start))
    }

    /// Whether the mantissa just read, followed by `ch`, finishes a number. An exponent
    /// (`e`, optional sign, digits) is consumed on the way.
    fn ends_number(&mut self, ch: Option<u8>) -> LispResult<bool> {
        if !ch.is_some_and(is_symbol_char) {
            return Ok(true);
        }
        if !matches!(ch, Some(b'e' | b'E')) {
            return Ok(false);
        }
        self.stream.get()?;
        if matches!(self.stream.peek()?, Some(b'+' | b'-')) {
            self.stream.get()?;
        }
        if !is_digit(self.stream.peek()?) {
            return Ok(false);
        }
        let next = self.skip_digits()?;
        Ok(!next.is_some_and(is_symbol_char))
    }

    /// Consume digits, returning the first byte after them (unconsumed).
    fn skip_digits(&mut self) -> LispResult<Option<u8>> {
        loop {
            let ch = self.stream.peek()?;
            if !is_digit(ch) {
                return Ok(ch);
            }
            self.stream.get()?;
        }
    }

    fn number_from(&mut self, start: usize) -> LispResult<ObjRef> {
        let token = String::from_utf8_lossy(self.stream.slice_from(start)).into_owned();
        let n = token
            .parse::<f64>()
            .map_err(|_| LispError::new(format!("malformed number `{}'", token)))?;
        self.heap.make_number(n)
    }

    /// Elements are consed onto a reversed list in a root slot, then the list is
    /// reversed in place once the closing paren (or dotted tail) is seen.
    fn read_list(&mut self) -> LispResult<ObjRef> {
        let mark = self.heap.root_mark();
        let list = self.heap.slot(self.heap.nil());

        loop {
            match self.read_next()? {
                None => return Err(LispError::new("unexpected end of stream in list")),
                Some(b')') => {
                    let reversed = self.heap.load(list);
                    let head = self.heap.reverse_in_place(reversed);
                    self.heap.unwind(mark);
                    return Ok(head);
                }
                Some(b'.') if !self.peek_is_symbol_char()? => {
                    if self.heap.is_nil(self.heap.load(list)) {
                        return Err(LispError::new("unexpected dot at start of list"));
                    }
                    if self.peek_next()? == Some(b')') {
                        return Err(LispError::new("expected object at end of dotted list"));
                    }
                    let tail = self
                        .read()?
                        .ok_or_else(|| LispError::new("unexpected end of stream in dotted list"))?;
                    let tail = self.heap.slot(tail);
                    if self.peek_next()? != Some(b')') {
                        return Err(LispError::new("unexpected object at end of dotted list"));
                    }
                    self.read_next()?;

                    // the first cell of the reversed list ends up last
                    let last = self.heap.load(list);
                    let head = self.heap.reverse_in_place(last);
                    let tail = self.heap.load(tail);
                    self.heap.set_cdr(last, tail);
                    self.heap.unwind(mark);
                    return Ok(head);
                }
                Some(_) => {
                    self.stream.seek_back();
                    let item = self
                        .read()?
                        .ok_or_else(|| LispError::new("unexpected end of stream in list"))?;
                    let cell = self.heap.cons(item, self.heap.load(list))?;
                    self.heap.store(list, cell);
                }
            }
        }
    }
}

pub fn is_symbol_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || b"!#$%&*+-./:<=>?@^_~".contains(&ch)
}

fn is_digit(ch: Option<u8>) -> bool {
    ch.is_some_and(|c| c.is_ascii_digit())
}

fn is_space(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}
