//! The host editor, as seen from Lisp.
//!
//! The runtime never touches the text buffer or the screen itself. Editor commands
//! are forwarded to an [`Editor`] implementation supplied by the host, and the
//! bridge primitives below expose them under their Lisp names.

use crate::error::LispResult;
use crate::eval::Machine;
use crate::value::{ObjRef, Object};

/// Commands the host editor provides. Every method has a default, so a host only
/// implements what it supports.
pub trait Editor {
    fn beginning_of_buffer(&mut self) {}
    fn end_of_buffer(&mut self) {}
    fn beginning_of_line(&mut self) {}
    fn end_of_line(&mut self) {}
    fn forward_char(&mut self) {}
    fn backward_char(&mut self) {}
    fn next_line(&mut self) {}
    fn previous_line(&mut self) {}
    fn set_mark(&mut self) {}
    fn delete(&mut self) {}
    fn copy_region(&mut self) {}
    fn kill_region(&mut self) {}
    fn yank(&mut self) {}
    fn dump_keys(&mut self) {}

    /// The character at point. At the end of the buffer this is NUL.
    fn get_char(&mut self) -> char {
        '\0'
    }

    /// Bind `key` to the Lisp command `command`. Returns false if the binding was
    /// rejected.
    fn set_key(&mut self, _key: &str, _command: &str) -> bool {
        false
    }

    /// Source text of the script at `path`, or None if it cannot be read.
    fn load(&mut self, path: &str) -> Option<String> {
        match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!(path, error = %e, "cannot read script");
                None
            }
        }
    }
}

/// An editor with an empty buffer. Commands do nothing; `load` reads from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEditor;

impl Editor for NullEditor {}

macro_rules! editor_commands {
    ($($name:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(m: &mut Machine, _args: ObjRef) -> LispResult<ObjRef> {
                m.editor.$name();
                Ok(m.heap.t())
            }
        )*
    };
}

editor_commands!(
    beginning_of_buffer,
    end_of_buffer,
    beginning_of_line,
    end_of_line,
    forward_char,
    backward_char,
    next_line,
    previous_line,
    set_mark,
    delete,
    copy_region,
    kill_region,
    yank,
    dump_keys,
);

fn string_arg(m: &Machine, arg: ObjRef) -> LispResult<String> {
    match m.heap.get(arg) {
        Object::String(text) => Ok(String::from_utf8_lossy(text).into_owned()),
        _ => Err(m.heap.error(arg, "is not a string")),
    }
}

/// The character at point as a one-character string.
pub(crate) fn get_char(m: &mut Machine, _args: ObjRef) -> LispResult<ObjRef> {
    let ch = m.editor.get_char();
    let mut buf = [0u8; 4];
    m.heap.make_string(ch.encode_utf8(&mut buf).as_bytes())
}

pub(crate) fn set_key(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let key = string_arg(m, m.heap.car(args))?;
    let command = string_arg(m, m.heap.car(m.heap.cdr(args)))?;
    let bound = m.editor.set_key(&key, &command);
    Ok(m.heap.boolean(bound))
}

/// Evaluate a script in the global environment. Returns nil if the editor cannot
/// produce its text; errors raised by the script propagate to the caller.
pub(crate) fn load(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let path = string_arg(m, m.heap.car(args))?;
    let Some(text) = m.editor.load(&path) else {
        return Ok(m.heap.nil());
    };
    tracing::debug!(path = %path, bytes = text.len(), "loading script");
    m.eval_str(&text)?;
    Ok(m.heap.t())
}
