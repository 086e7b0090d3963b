use crate::editor;
use crate::error::LispResult;
use crate::eval::Machine;
use crate::heap::Heap;
use crate::printer;
use crate::value::{ObjRef, Object};

use Arity::{AtMost, MultipleOf};

/// Upper bound on a primitive's argument count.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Arity {
    AtMost(usize),
    /// Any count that divides evenly. `MultipleOf(1)` means unbounded.
    MultipleOf(usize),
}

/// Receives the evaluated argument list, already checked against the arity.
pub type PrimitiveFn = fn(&mut Machine, ObjRef) -> LispResult<ObjRef>;

pub struct Primitive {
    pub name: &'static str,
    pub min: usize,
    pub max: Arity,
    /// None for special forms, which the evaluator handles itself.
    pub func: Option<PrimitiveFn>,
}

// Special forms come first in the table, in this order.
pub const QUOTE: usize = 0;
pub const SETQ: usize = 1;
pub const PROGN: usize = 2;
pub const IF: usize = 3;
pub const COND: usize = 4;
pub const LAMBDA: usize = 5;
pub const MACRO: usize = 6;

const fn special(name: &'static str, min: usize, max: Arity) -> Primitive {
    Primitive {
        name,
        min,
        max,
        func: None,
    }
}

const fn function(name: &'static str, min: usize, max: Arity, func: PrimitiveFn) -> Primitive {
    Primitive {
        name,
        min,
        max,
        func: Some(func),
    }
}

pub static PRIMITIVES: &[Primitive] = &[
    special("quote", 1, AtMost(1)),
    special("setq", 0, MultipleOf(2)),
    special("progn", 0, MultipleOf(1)),
    special("if", 2, AtMost(3)),
    special("cond", 0, MultipleOf(1)),
    special("lambda", 1, MultipleOf(1)),
    special("macro", 1, MultipleOf(1)),
    function("atom", 1, AtMost(1), atom),
    function("eq", 2, AtMost(2), eq),
    function("car", 1, AtMost(1), car),
    function("cdr", 1, AtMost(1), cdr),
    function("cons", 2, AtMost(2), cons),
    function("print", 1, AtMost(1), print),
    function("princ", 1, AtMost(1), princ),
    function("+", 0, MultipleOf(1), add),
    function("-", 1, MultipleOf(1), subtract),
    function("*", 0, MultipleOf(1), multiply),
    function("/", 1, MultipleOf(1), divide),
    function("=", 1, MultipleOf(1), num_eq),
    function("<", 1, MultipleOf(1), less),
    function("<=", 1, MultipleOf(1), less_eq),
    function(">", 1, MultipleOf(1), greater),
    function(">=", 1, MultipleOf(1), greater_eq),
    function("string?", 1, AtMost(1), string_p),
    function("load", 1, AtMost(1), editor::load),
    function("set-key", 2, AtMost(2), editor::set_key),
    function("get-char", 0, AtMost(0), editor::get_char),
    function("beginning-of-buffer", 0, AtMost(0), editor::beginning_of_buffer),
    function("end-of-buffer", 0, AtMost(0), editor::end_of_buffer),
    function("beginning-of-line", 0, AtMost(0), editor::beginning_of_line),
    function("end-of-line", 0, AtMost(0), editor::end_of_line),
    function("forward-char", 0, AtMost(0), editor::forward_char),
    function("backward-char", 0, AtMost(0), editor::backward_char),
    function("next-line", 0, AtMost(0), editor::next_line),
    function("previous-line", 0, AtMost(0), editor::previous_line),
    function("set-mark", 0, AtMost(0), editor::set_mark),
    function("delete", 0, AtMost(0), editor::delete),
    function("copy-region", 0, AtMost(0), editor::copy_region),
    function("kill-region", 0, AtMost(0), editor::kill_region),
    function("yank", 0, AtMost(0), editor::yank),
    function("dump-keys", 0, AtMost(0), editor::dump_keys),
];

/// First and second argument.
fn args2(heap: &Heap, args: ObjRef) -> (ObjRef, ObjRef) {
    (heap.car(args), heap.car(heap.cdr(args)))
}

fn number_arg(heap: &Heap, arg: ObjRef) -> LispResult<f64> {
    heap.number(arg).ok_or_else(|| heap.error(arg, "is not a number"))
}

fn atom(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let heap = &m.heap;
    Ok(heap.boolean(!heap.is_cons(heap.car(args))))
}

/// Numbers and strings compare by value, everything else by identity.
fn eq(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let heap = &m.heap;
    let (a, b) = args2(heap, args);
    let same = match (heap.get(a), heap.get(b)) {
        (Object::Number(x), Object::Number(y)) => x == y,
        (Object::String(x), Object::String(y)) => x == y,
        _ => a == b,
    };
    Ok(heap.boolean(same))
}

fn car(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let heap = &m.heap;
    let list = heap.car(args);
    if heap.is_nil(list) || heap.is_cons(list) {
        Ok(heap.car(list))
    } else {
        Err(heap.error(list, "is not a list"))
    }
}

fn cdr(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let heap = &m.heap;
    let list = heap.car(args);
    if heap.is_nil(list) || heap.is_cons(list) {
        Ok(heap.cdr(list))
    } else {
        Err(heap.error(list, "is not a list"))
    }
}

fn cons(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let (a, b) = args2(&m.heap, args);
    m.heap.cons(a, b)
}

/// Newline, readable form, then a space.
fn print(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let value = m.heap.car(args);
    let text = printer::print(&m.heap, value, true);
    m.out.write_str("\n");
    m.out.write_str(&text);
    m.out.write_str(" ");
    Ok(value)
}

fn princ(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let value = m.heap.car(args);
    let text = printer::print(&m.heap, value, false);
    m.out.write_str(&text);
    Ok(value)
}

/// Fold the arguments with `op`. A lone argument is folded onto `init`, so `(- 5)`
/// is -5 and `(/ 4)` is 0.25.
fn arithmetic(
    m: &mut Machine,
    args: ObjRef,
    init: f64,
    op: fn(f64, f64) -> f64,
) -> LispResult<ObjRef> {
    let heap = &m.heap;
    let values = heap.list_to_vec(args).unwrap_or_default();
    let (mut acc, rest) = match values.split_first() {
        Some((&first, rest)) if !rest.is_empty() => (number_arg(heap, first)?, rest),
        _ => (init, &values[..]),
    };
    for &value in rest {
        acc = op(acc, number_arg(heap, value)?);
    }
    m.heap.make_number(acc)
}

fn add(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    arithmetic(m, args, 0.0, |a, b| a + b)
}

fn subtract(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    arithmetic(m, args, 0.0, |a, b| a - b)
}

fn multiply(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    arithmetic(m, args, 1.0, |a, b| a * b)
}

fn divide(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    arithmetic(m, args, 1.0, |a, b| a / b)
}

/// Compare consecutive pairs, stopping at the first false one. Operands after that
/// point are not type checked.
fn relational(m: &mut Machine, args: ObjRef, op: fn(f64, f64) -> bool) -> LispResult<ObjRef> {
    let heap = &m.heap;
    let values = heap.list_to_vec(args).unwrap_or_default();
    let Some((&first, rest)) = values.split_first() else {
        return Ok(heap.t());
    };
    let mut prev = number_arg(heap, first)?;
    for &value in rest {
        let next = number_arg(heap, value)?;
        if !op(prev, next) {
            return Ok(heap.nil());
        }
        prev = next;
    }
    Ok(heap.t())
}

fn num_eq(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    relational(m, args, |a, b| a == b)
}

fn less(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    relational(m, args, |a, b| a < b)
}

fn less_eq(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    relational(m, args, |a, b| a <= b)
}

fn greater(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    relational(m, args, |a, b| a > b)
}

fn greater_eq(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    relational(m, args, |a, b| a >= b)
}

fn string_p(m: &mut Machine, args: ObjRef) -> LispResult<ObjRef> {
    let heap = &m.heap;
    Ok(heap.boolean(matches!(heap.get(heap.car(args)), Object::String(_))))
}
