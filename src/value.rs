use std::fmt;

/// Index into the active semispace. This is the GC handle.
///
/// A handle is only valid until the next allocation, which may move every object.
/// Anything held across an allocation must live in a root slot (see `Heap::slot`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub u32);

/// Size of a fixed object cell: type tag and size words plus a three-pointer payload.
pub const CELL_SIZE: usize = 40;

/// Bytes of string payload that fit inside a fixed cell.
const INLINE_TEXT: usize = 24;

/// Closure flavour: lambdas evaluate their arguments, macros do not.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClosureKind {
    Lambda,
    Macro,
}

/// A heap object.
#[derive(Clone, Debug)]
pub enum Object {
    Number(f64),
    String(Box<[u8]>),
    Symbol(Box<[u8]>),
    Cons {
        car: ObjRef,
        cdr: ObjRef,
    },
    Closure {
        kind: ClosureKind,
        params: ObjRef,
        body: ObjRef,
        env: ObjRef,
    },
    Primitive {
        index: usize,
        name: &'static str,
    },
    Env {
        parent: ObjRef,
        vars: ObjRef,
        vals: ObjRef,
    },
    /// Left behind in from-space when the collector moves an object.
    Forward(ObjRef),
}

impl Object {
    /// Byte size of this object, used for heap accounting.
    pub fn size(&self) -> usize {
        match self {
            Object::String(text) | Object::Symbol(text) => {
                let extra = (text.len() + 1).saturating_sub(INLINE_TEXT);
                align(CELL_SIZE + extra)
            }
            _ => CELL_SIZE,
        }
    }

    /// Visit every handle stored in this object.
    pub fn for_each_ref(&mut self, mut f: impl FnMut(&mut ObjRef)) {
        match self {
            Object::Cons { car, cdr } => {
                f(car);
                f(cdr);
            }
            Object::Closure {
                params, body, env, ..
            } => {
                f(params);
                f(body);
                f(env);
            }
            Object::Env { parent, vars, vals } => {
                f(parent);
                f(vars);
                f(vals);
            }
            Object::Number(_)
            | Object::String(_)
            | Object::Symbol(_)
            | Object::Primitive { .. }
            | Object::Forward(_) => {}
        }
    }
}

fn align(size: usize) -> usize {
    (size + 7) & !7
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_fit_in_a_cell() {
        let obj = Object::String(b"hello".to_vec().into_boxed_slice());
        assert_eq!(obj.size(), CELL_SIZE);
    }

    #[test]
    fn long_strings_grow_in_words() {
        let obj = Object::Symbol(vec![b'x'; 30].into_boxed_slice());
        // 31 bytes with terminator, 7 past the inline area, rounded up to 8.
        assert_eq!(obj.size(), 48);
    }

    #[test]
    fn for_each_ref_visits_all_fields() {
        let mut env = Object::Env {
            parent: ObjRef(1),
            vars: ObjRef(2),
            vals: ObjRef(3),
        };
        let mut seen = Vec::new();
        env.for_each_ref(|r| seen.push(r.0));
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
