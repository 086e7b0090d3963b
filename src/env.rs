//! Environments.
//!
//! A frame is an `Env` object holding a parent and two parallel lists, `vars` and
//! `vals`. The vars list comes straight from a closure's parameter spec, so it takes
//! one of three shapes:
//!
//! - proper list: `(a b c)` with `(1 2 3)` binds each name to one value;
//! - dotted list: `(a b . c)` with `(1 2 3 4)` binds `c` to `(3 4)`;
//! - bare symbol: `a` with `(1 2 3)` binds `a` to the whole list.
//!
//! The global frame is a proper list that grows at the front.

use crate::error::LispResult;
use crate::heap::Heap;
use crate::primitives::PRIMITIVES;
use crate::value::{ObjRef, Object};

/// Parent, vars and vals of a frame. Anything but an `Env` reads as an empty frame.
fn frame(heap: &Heap, env: ObjRef) -> (ObjRef, ObjRef, ObjRef) {
    match heap.get(env) {
        Object::Env { parent, vars, vals } => (*parent, *vars, *vals),
        _ => (heap.nil(), heap.nil(), heap.nil()),
    }
}

fn set_frame(heap: &mut Heap, env: ObjRef, new_vars: ObjRef, new_vals: ObjRef) {
    if let Object::Env { vars, vals, .. } = heap.get_mut(env) {
        *vars = new_vars;
        *vals = new_vals;
    }
}

/// The value bound to `var`, searching from `env` outward.
pub fn lookup(heap: &Heap, var: ObjRef, env: ObjRef) -> LispResult<ObjRef> {
    let mut env = env;
    while !heap.is_nil(env) {
        let (parent, mut vars, mut vals) = frame(heap, env);
        while heap.is_cons(vars) {
            if heap.car(vars) == var {
                return Ok(heap.car(vals));
            }
            vars = heap.cdr(vars);
            vals = heap.cdr(vals);
        }
        // rest parameter, or a bare symbol naming the whole argument list
        if vars == var {
            return Ok(vals);
        }
        env = parent;
    }
    Err(heap.error(var, "has no value"))
}

/// Assign `val` to the nearest binding of `var`. An unbound variable is defined in
/// the outermost frame.
pub fn set(heap: &mut Heap, var: ObjRef, val: ObjRef, env: ObjRef) -> LispResult<ObjRef> {
    let mut env = env;
    loop {
        let (parent, mut vars, mut vals) = frame(heap, env);
        while heap.is_cons(vars) {
            if heap.car(vars) == var {
                heap.set_car(vals, val);
                return Ok(val);
            }
            if heap.cdr(vars) == var {
                heap.set_cdr(vals, val);
                return Ok(val);
            }
            vars = heap.cdr(vars);
            vals = heap.cdr(vals);
        }
        if vars == var && !heap.is_nil(var) {
            let (_, all_vars, _) = frame(heap, env);
            set_frame(heap, env, all_vars, val);
            return Ok(val);
        }
        if heap.is_nil(parent) {
            return define(heap, var, val, env);
        }
        env = parent;
    }
}

/// Prepend a binding of `var` to the frame `env`.
pub fn define(heap: &mut Heap, var: ObjRef, val: ObjRef, env: ObjRef) -> LispResult<ObjRef> {
    let mark = heap.root_mark();
    let env = heap.slot(env);
    let val = heap.slot(val);

    let (_, vars, _) = frame(heap, heap.load(env));
    let vars = heap.cons(var, vars)?;
    let vars = heap.slot(vars);

    let (_, _, vals) = frame(heap, heap.load(env));
    let vals = heap.cons(heap.load(val), vals)?;

    let frame_env = heap.load(env);
    let new_vars = heap.load(vars);
    set_frame(heap, frame_env, new_vars, vals);
    let val = heap.load(val);
    heap.unwind(mark);
    Ok(val)
}

/// A fresh frame binding the parameters of the closure `func` to `args`, whose
/// parent is the closure's own environment.
pub fn bind(heap: &mut Heap, func: ObjRef, args: ObjRef) -> LispResult<ObjRef> {
    let (params, parent) = match heap.get(func) {
        Object::Closure { params, env, .. } => (*params, *env),
        _ => return Err(heap.error(func, "is not a function")),
    };

    let mut param = params;
    let mut arg = args;
    let mut count = 0;
    loop {
        if heap.is_nil(param) && heap.is_nil(arg) {
            break;
        }
        if !heap.is_nil(param) && heap.is_symbol(param) {
            break;
        }
        if !heap.is_nil(arg) && !heap.is_cons(arg) {
            return Err(heap.error(arg, "is not a list"));
        }
        if heap.is_nil(param) {
            return Err(heap.error(func, format!("expects at most {} arguments", count)));
        }
        if heap.is_nil(arg) {
            while heap.is_cons(param) {
                param = heap.cdr(param);
                count += 1;
            }
            return Err(heap.error(func, format!("expects at least {} arguments", count)));
        }
        param = heap.cdr(param);
        arg = heap.cdr(arg);
        count += 1;
    }

    heap.env(parent, params, args)
}

/// The global frame: `nil` and `t` bound to themselves, and every primitive and
/// special form bound by name.
pub fn root_env(heap: &mut Heap) -> LispResult<ObjRef> {
    let mark = heap.root_mark();
    let nil = heap.nil();
    let env = heap.env(nil, nil, nil)?;
    let env = heap.slot(env);

    let t = heap.t();
    let frame_env = heap.load(env);
    define(heap, nil, nil, frame_env)?;
    let frame_env = heap.load(env);
    define(heap, t, t, frame_env)?;

    for (index, primitive) in PRIMITIVES.iter().enumerate() {
        let name = heap.intern(primitive.name.as_bytes())?;
        let name = heap.slot(name);
        let value = heap.primitive(index, primitive.name)?;
        let (var, frame_env) = (heap.load(name), heap.load(env));
        define(heap, var, value, frame_env)?;
    }

    let env = heap.load(env);
    heap.unwind(mark);
    Ok(env)
}
