//! Entry points for hosts: one-shot evaluation into a bounded buffer, evaluation of
//! files and streams, and evaluation returning values.

use std::fs::File;

use crate::error::{LispError, LispResult};
use crate::eval::Machine;
use crate::printer;
use crate::reader::{self, Reader};
use crate::stream::{Output, OutputBuffer, Stream};
use crate::value::ObjRef;

/// Sizes a machine is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bytes per semispace.
    pub heap_capacity: usize,
    /// Size of the buffer `evaluate` returns, including the room C hosts keep for a
    /// terminator.
    pub output_capacity: usize,
    /// Deepest nesting of lists while reading, and of non-tail evaluation.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            heap_capacity: 1 << 20,
            output_capacity: 2048,
            max_depth: reader::DEFAULT_MAX_DEPTH,
        }
    }
}

impl Machine {
    /// Evaluate every expression in `src`, returning what was printed.
    ///
    /// Each value is written readably on its own line. The first error ends the call
    /// with an `error: ...` line; bindings made before it stay in place. Output beyond
    /// the configured capacity is cut off and ends with `$$`.
    pub fn evaluate(&mut self, src: &str) -> String {
        let mut stream = Stream::from_text(src);
        self.evaluate_stream(&mut stream)
    }

    /// Like `evaluate`, reading the source from an open file.
    pub fn evaluate_file(&mut self, file: File) -> String {
        match Stream::from_file(file) {
            Ok(mut stream) => self.evaluate_stream(&mut stream),
            Err(e) => {
                let err = LispError::from(e);
                tracing::debug!(error = %err, "cannot open source");
                format!("error: {}\n", err)
            }
        }
    }

    fn evaluate_stream(&mut self, stream: &mut Stream) -> String {
        let buffer = Output::Buffer(OutputBuffer::new(self.config.output_capacity));
        let previous = self.set_output(buffer);
        if let Err(e) = self.run_stream(stream, true) {
            self.report_error(&e);
        }
        match self.set_output(previous) {
            Output::Buffer(buffer) => buffer.into_string(),
            Output::Writer(_) => String::new(),
        }
    }

    /// Evaluate every expression in `src` without echoing values, returning the last
    /// one (nil for empty source). The handle is valid until the next allocation.
    pub fn eval_str(&mut self, src: &str) -> LispResult<ObjRef> {
        let mut stream = Stream::from_text(src);
        self.run_stream(&mut stream, false)
    }

    /// Read and evaluate expressions from `stream` in the global environment until
    /// it runs dry or an expression fails. With `echo`, each value is written to the
    /// current output followed by a newline.
    pub fn run_stream(&mut self, stream: &mut Stream, echo: bool) -> LispResult<ObjRef> {
        let mark = self.heap.root_mark();
        let result = self.run_forms(stream, echo);
        self.heap.unwind(mark);
        result
    }

    fn run_forms(&mut self, stream: &mut Stream, echo: bool) -> LispResult<ObjRef> {
        let last = self.heap.slot(self.heap.nil());
        loop {
            let Some(expr) = self.read_form(stream)? else {
                break;
            };
            let value = self.eval(expr, self.global_env())?;
            self.heap.store(last, value);
            if echo {
                self.write_value(value);
            }
        }
        Ok(self.heap.load(last))
    }

    fn read_form(&mut self, stream: &mut Stream) -> LispResult<Option<ObjRef>> {
        Reader::new(stream, &mut self.heap)
            .max_depth(self.config.max_depth)
            .read()
    }

    fn write_value(&mut self, value: ObjRef) {
        let text = printer::print(&self.heap, value, true);
        self.out.write_str(&text);
        self.out.write_str("\n");
        self.out.flush();
    }

    /// Write `error: <message>` to the current output.
    pub fn report_error(&mut self, err: &LispError) {
        tracing::debug!(error = %err, "evaluation failed");
        self.out.write_str(&format!("error: {}\n", err));
        self.out.flush();
    }

    /// Swap the output sink, returning the previous one.
    pub fn set_output(&mut self, out: Output) -> Output {
        std::mem::replace(&mut self.out, out)
    }

    /// Print an object, readably (strings quoted and escaped) or for display.
    pub fn print(&self, obj: ObjRef, readably: bool) -> String {
        printer::print(&self.heap, obj, readably)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::NullEditor;

    fn machine() -> Machine {
        Machine::new(Config::default(), Box::new(NullEditor)).unwrap()
    }

    #[test]
    fn evaluate_writes_one_line_per_value() {
        let mut m = machine();
        assert_eq!(m.evaluate("1 'a \"s\""), "1\na\n\"s\"\n");
    }

    #[test]
    fn evaluate_stops_at_first_error() {
        let mut m = machine();
        assert_eq!(m.evaluate("1 (car 2) 3"), "1\nerror: 2 is not a list\n");
    }

    #[test]
    fn empty_source_prints_nothing() {
        let mut m = machine();
        assert_eq!(m.evaluate("  ; just a comment\n"), "");
    }

    #[test]
    fn definitions_persist_across_calls() {
        let mut m = machine();
        m.evaluate("(setq x 41)");
        assert_eq!(m.evaluate("(+ x 1)"), "42\n");
    }

    #[test]
    fn eval_str_returns_the_last_value() {
        let mut m = machine();
        let value = m.eval_str("1 2 (cons 3 4)").unwrap();
        assert_eq!(m.print(value, true), "(3 . 4)");
        assert_eq!(m.eval_str("").map(|v| m.heap.is_nil(v)), Ok(true));
    }

    #[test]
    fn nesting_beyond_the_limit_is_an_error() {
        let config = Config {
            max_depth: 32,
            ..Config::default()
        };
        let mut m = Machine::new(config, Box::new(NullEditor)).unwrap();
        let src = format!("(quote {})", "(".repeat(200_000));
        assert_eq!(m.evaluate(&src), "error: nesting too deep\n");
        assert_eq!(
            m.evaluate("(defun down (n) (if (= n 0) 0 (+ 1 (down (- n 1))))) (down 10) (down 100)"),
            "#<Lambda (n)>\n10\nerror: nesting too deep\n"
        );
        assert_eq!(m.evaluate("(+ 1 2)"), "3\n");
    }

    #[test]
    fn root_table_is_restored_after_errors() {
        let mut m = machine();
        let mark = m.heap.root_mark();
        m.evaluate("(defun f (x) (car x)) (f 5)");
        assert_eq!(m.heap.root_mark(), mark);
    }
}
