//! Typed constructors for heap objects.
//!
//! Every constructor may collect. Handles passed in as arguments are pinned across
//! the allocation, but anything else the caller holds must already be in a root slot.

use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::printer;
use crate::value::{ClosureKind, ObjRef, Object};

impl Heap {
    pub fn make_number(&mut self, n: f64) -> LispResult<ObjRef> {
        self.allocate(Object::Number(n), &mut [])
    }

    pub fn cons(&mut self, car: ObjRef, cdr: ObjRef) -> LispResult<ObjRef> {
        let nil = self.nil();
        self.allocate(Object::Cons { car: nil, cdr: nil }, &mut [car, cdr])
    }

    /// A string holding `text` as-is.
    pub fn make_string(&mut self, text: &[u8]) -> LispResult<ObjRef> {
        self.allocate(Object::String(text.to_vec().into_boxed_slice()), &mut [])
    }

    /// A string from literal source text, decoding escapes.
    pub fn string_from_source(&mut self, raw: &[u8]) -> LispResult<ObjRef> {
        let decoded = decode_escapes(raw);
        self.allocate(Object::String(decoded.into_boxed_slice()), &mut [])
    }

    pub fn primitive(&mut self, index: usize, name: &'static str) -> LispResult<ObjRef> {
        self.allocate(Object::Primitive { index, name }, &mut [])
    }

    pub fn env(&mut self, parent: ObjRef, vars: ObjRef, vals: ObjRef) -> LispResult<ObjRef> {
        let nil = self.nil();
        self.allocate(
            Object::Env {
                parent: nil,
                vars: nil,
                vals: nil,
            },
            &mut [parent, vars, vals],
        )
    }

    /// Build a lambda or macro after validating its parameter spec.
    pub fn closure(
        &mut self,
        kind: ClosureKind,
        params: ObjRef,
        body: ObjRef,
        env: ObjRef,
    ) -> LispResult<ObjRef> {
        self.check_params(params)?;
        let nil = self.nil();
        self.allocate(
            Object::Closure {
                kind,
                params: nil,
                body: nil,
                env: nil,
            },
            &mut [params, body, env],
        )
    }

    /// Every parameter must be a distinct symbol other than nil and t. A dotted tail,
    /// or a bare symbol standing for the whole argument list, follows the same rules.
    fn check_params(&self, params: ObjRef) -> LispResult<()> {
        let mut seen: Vec<ObjRef> = Vec::new();
        let mut list = params;
        while self.is_cons(list) {
            self.check_param(self.car(list), &seen)?;
            seen.push(self.car(list));
            list = self.cdr(list);
        }
        if !self.is_nil(list) {
            self.check_param(list, &seen)?;
        }
        Ok(())
    }

    fn check_param(&self, param: ObjRef, seen: &[ObjRef]) -> LispResult<()> {
        if !self.is_symbol(param) {
            return Err(self.error(param, "is not a symbol"));
        }
        if param == self.nil() || param == self.t() {
            return Err(self.error(param, "cannot be used as a parameter"));
        }
        if seen.contains(&param) {
            return Err(self.error(param, "is a duplicate parameter"));
        }
        Ok(())
    }

    /// An error annotated with the readable form of `object`.
    pub fn error(&self, object: ObjRef, message: impl Into<String>) -> LispError {
        LispError::with_object(printer::print(self, object, true), message)
    }

    /// Build a proper list from handles. The slice must not hold anything that the
    /// allocation could move, so only use it with rooted or constant handles.
    pub fn list(&mut self, values: &[ObjRef]) -> LispResult<ObjRef> {
        let mark = self.root_mark();
        let slots: Vec<_> = values.iter().map(|&v| self.slot(v)).collect();
        let result = self.slot(self.nil());
        for &slot in slots.iter().rev() {
            let cell = self.cons(self.load(slot), self.load(result))?;
            self.store(result, cell);
        }
        let list = self.load(result);
        self.unwind(mark);
        Ok(list)
    }

    /// Reverse a list in place, returning the new head. Allocates nothing.
    pub fn reverse_in_place(&mut self, list: ObjRef) -> ObjRef {
        let mut result = self.nil();
        let mut current = list;
        while self.is_cons(current) {
            let next = self.cdr(current);
            self.set_cdr(current, result);
            result = current;
            current = next;
        }
        result
    }
}

/// Decode `\\ \" \t \r \n`. Any other backslash is kept literally.
pub fn decode_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let ch = raw[i];
        if ch == b'\\' && i + 1 < raw.len() {
            let decoded = match raw[i + 1] {
                b'\\' => Some(b'\\'),
                b'"' => Some(b'"'),
                b't' => Some(b'\t'),
                b'r' => Some(b'\r'),
                b'n' => Some(b'\n'),
                _ => None,
            };
            if let Some(c) = decoded {
                out.push(c);
                i += 2;
                continue;
            }
        }
        out.push(ch);
        i += 1;
    }
    out
}
