use crate::driver::Config;
use crate::editor::Editor;
use crate::env;
use crate::error::{LispError, LispResult};
use crate::heap::{Heap, Slot};
use crate::primitives::{self, Primitive, PRIMITIVES};
use crate::printer;
use crate::stream::{Output, OutputBuffer};
use crate::symbol::names;
use crate::value::{ClosureKind, ObjRef, Object};

/// Source of the library evaluated into every new machine.
const PRELUDE: &str = include_str!("prelude.lisp");

/// The evaluation machine.
/// All interpreter state lives here so the collector can find every root.
pub struct Machine {
    pub heap: Heap,
    /// Where `print`, `princ`, results and error lines go.
    pub(crate) out: Output,
    pub(crate) editor: Box<dyn Editor>,
    /// Root slot holding the global environment.
    pub(crate) global: Slot,
    pub(crate) config: Config,
    /// Nesting of `eval` calls in progress.
    depth: usize,
}

/// What a special form leaves in tail position.
enum Tail {
    /// An expression the trampoline evaluates next, in the current environment.
    Eval(ObjRef),
    /// A finished value.
    Value(ObjRef),
}

enum Callee {
    Lambda,
    Macro,
    Primitive(usize),
    NotAFunction,
}

impl Machine {
    /// Build a machine: a fresh heap, the global environment with every primitive
    /// bound, and the bootstrap library evaluated into it.
    pub fn new(config: Config, editor: Box<dyn Editor>) -> LispResult<Self> {
        let mut heap = Heap::new(config.heap_capacity)?;
        let root = env::root_env(&mut heap)?;
        let global = heap.slot(root);

        let mut machine = Machine {
            heap,
            out: Output::Buffer(OutputBuffer::new(config.output_capacity)),
            editor,
            global,
            config,
            depth: 0,
        };
        machine.eval_str(PRELUDE)?;
        tracing::debug!(
            symbols = machine.heap.symbol_count(),
            used = machine.heap.used(),
            collections = machine.heap.collections(),
            "bootstrap library loaded"
        );
        Ok(machine)
    }

    /// The global environment.
    pub fn global_env(&self) -> ObjRef {
        self.heap.load(self.global)
    }

    /// Evaluate `expr` in `env`.
    ///
    /// Tail calls loop inside one invocation instead of recursing, so a tail-recursive
    /// Lisp loop runs in constant native stack. Other nesting is capped at
    /// `Config::max_depth`. The root table is restored on return.
    pub fn eval(&mut self, expr: ObjRef, env: ObjRef) -> LispResult<ObjRef> {
        if self.depth >= self.config.max_depth {
            return Err(LispError::new("nesting too deep"));
        }
        self.depth += 1;
        let mark = self.heap.root_mark();
        let result = self.eval_frame(expr, env);
        self.heap.unwind(mark);
        self.depth -= 1;
        result
    }

    fn eval_frame(&mut self, expr: ObjRef, env: ObjRef) -> LispResult<ObjRef> {
        let expr = self.heap.slot(expr);
        let env = self.heap.slot(env);
        let func = self.heap.slot(self.heap.nil());
        let args = self.heap.slot(self.heap.nil());

        loop {
            let form = self.heap.load(expr);
            match self.heap.get(form) {
                Object::Symbol(_) => return env::lookup(&self.heap, form, self.heap.load(env)),
                Object::Cons { .. } => {}
                _ => return Ok(form),
            }

            self.heap.store(args, self.heap.cdr(form));
            let head = self.heap.car(form);
            let f = self.eval(head, self.heap.load(env))?;
            self.heap.store(func, f);

            let callee = match self.heap.get(f) {
                Object::Closure {
                    kind: ClosureKind::Lambda,
                    ..
                } => Callee::Lambda,
                Object::Closure {
                    kind: ClosureKind::Macro,
                    ..
                } => Callee::Macro,
                Object::Primitive { index, .. } => Callee::Primitive(*index),
                _ => Callee::NotAFunction,
            };

            let tail = match callee {
                Callee::Lambda => {
                    let evaluated = self.eval_list(self.heap.load(args), self.heap.load(env))?;
                    let closure = self.heap.load(func);
                    let frame = env::bind(&mut self.heap, closure, evaluated)?;
                    self.heap.store(env, frame);
                    let body = self.closure_body(self.heap.load(func));
                    self.eval_progn(body, env)?
                }
                Callee::Macro => {
                    self.expand_macro(func, args, expr)?;
                    continue;
                }
                Callee::Primitive(index) => {
                    let primitive = &PRIMITIVES[index];
                    self.check_arity(primitive, self.heap.load(func), self.heap.load(args))?;
                    let argv = self.heap.load(args);
                    match index {
                        primitives::QUOTE => return Ok(self.heap.car(argv)),
                        primitives::SETQ => return self.eval_setq(argv, env),
                        primitives::PROGN => self.eval_progn(argv, env)?,
                        primitives::IF => self.eval_if(argv, env)?,
                        primitives::COND => self.eval_cond(argv, env)?,
                        primitives::LAMBDA | primitives::MACRO => {
                            let kind = if index == primitives::LAMBDA {
                                ClosureKind::Lambda
                            } else {
                                ClosureKind::Macro
                            };
                            let (params, body) = (self.heap.car(argv), self.heap.cdr(argv));
                            return self.heap.closure(kind, params, body, self.heap.load(env));
                        }
                        _ => {
                            let evaluated = self.eval_list(argv, self.heap.load(env))?;
                            self.heap.store(args, evaluated);
                            return match primitive.func {
                                Some(call) => call(self, evaluated),
                                None => Err(self.heap.error(self.heap.load(func), "is not a function")),
                            };
                        }
                    }
                }
                Callee::NotAFunction => {
                    return Err(self.heap.error(self.heap.load(func), "is not a function"));
                }
            };

            match tail {
                Tail::Eval(next) => self.heap.store(expr, next),
                Tail::Value(value) => return Ok(value),
            }
        }
    }

    fn closure_body(&self, func: ObjRef) -> ObjRef {
        match self.heap.get(func) {
            Object::Closure { body, .. } => *body,
            _ => self.heap.nil(),
        }
    }

    /// Count the arguments of a primitive call against its declared arity.
    fn check_arity(&self, primitive: &Primitive, func: ObjRef, args: ObjRef) -> LispResult<()> {
        let heap = &self.heap;
        let mut count = 0;
        let mut list = args;
        while !heap.is_nil(list) {
            if !heap.is_cons(list) {
                return Err(heap.error(list, "is not a list"));
            }
            count += 1;
            list = heap.cdr(list);
        }

        if count < primitive.min {
            return Err(heap.error(
                func,
                format!("expects at least {} arguments", primitive.min),
            ));
        }
        match primitive.max {
            primitives::Arity::AtMost(max) if count > max => {
                Err(heap.error(func, format!("expects at most {} arguments", max)))
            }
            primitives::Arity::MultipleOf(n) if count % n != 0 => {
                Err(heap.error(func, format!("expects a multiple of {} arguments", n)))
            }
            _ => Ok(()),
        }
    }

    /// Evaluate each element of an argument list, left to right. A dotted tail is
    /// evaluated as an expression and its value becomes the rest of the result, so
    /// `(f a . rest)` spreads the list `rest` evaluates to.
    fn eval_list(&mut self, list: ObjRef, env: ObjRef) -> LispResult<ObjRef> {
        let mark = self.heap.root_mark();
        let rest = self.heap.slot(list);
        let env = self.heap.slot(env);
        let acc = self.heap.slot(self.heap.nil());

        while self.heap.is_cons(self.heap.load(rest)) {
            let item = self.heap.car(self.heap.load(rest));
            let value = self.eval(item, self.heap.load(env))?;
            let cell = self.heap.cons(value, self.heap.load(acc))?;
            self.heap.store(acc, cell);
            let next = self.heap.cdr(self.heap.load(rest));
            self.heap.store(rest, next);
        }

        let tail = if self.heap.is_nil(self.heap.load(rest)) {
            self.heap.nil()
        } else {
            self.eval(self.heap.load(rest), self.heap.load(env))?
        };

        // the first cell of the reversed list is the last cell of the result
        let last = self.heap.load(acc);
        let head = if self.heap.is_cons(last) {
            let head = self.heap.reverse_in_place(last);
            self.heap.set_cdr(last, tail);
            head
        } else {
            tail
        };
        self.heap.unwind(mark);
        Ok(head)
    }

    /// Evaluate all but the last form; the last is left in tail position.
    fn eval_progn(&mut self, body: ObjRef, env: Slot) -> LispResult<Tail> {
        let mark = self.heap.root_mark();
        let rest = self.heap.slot(body);
        let tail = loop {
            let list = self.heap.load(rest);
            if !self.heap.is_cons(list) {
                break Tail::Value(self.heap.nil());
            }
            if !self.heap.is_cons(self.heap.cdr(list)) {
                break Tail::Eval(self.heap.car(list));
            }
            self.eval(self.heap.car(list), self.heap.load(env))?;
            let next = self.heap.cdr(self.heap.load(rest));
            self.heap.store(rest, next);
        };
        self.heap.unwind(mark);
        Ok(tail)
    }

    fn eval_if(&mut self, args: ObjRef, env: Slot) -> LispResult<Tail> {
        let mark = self.heap.root_mark();
        let args = self.heap.slot(args);
        let test = self.eval(self.heap.car(self.heap.load(args)), self.heap.load(env))?;
        let branches = self.heap.cdr(self.heap.load(args));
        self.heap.unwind(mark);

        if !self.heap.is_nil(test) {
            Ok(Tail::Eval(self.heap.car(branches)))
        } else if self.heap.is_cons(self.heap.cdr(branches)) {
            Ok(Tail::Eval(self.heap.car(self.heap.cdr(branches))))
        } else {
            Ok(Tail::Value(self.heap.nil()))
        }
    }

    /// The first clause whose test is true selects its body. A clause without a body
    /// yields the test value itself.
    fn eval_cond(&mut self, clauses: ObjRef, env: Slot) -> LispResult<Tail> {
        let mark = self.heap.root_mark();
        let rest = self.heap.slot(clauses);
        loop {
            let list = self.heap.load(rest);
            if !self.heap.is_cons(list) {
                self.heap.unwind(mark);
                return Ok(Tail::Value(self.heap.nil()));
            }
            let clause = self.heap.car(list);
            if !self.heap.is_cons(clause) {
                return Err(self.heap.error(clause, "is not a list"));
            }
            let test = self.eval(self.heap.car(clause), self.heap.load(env))?;
            if !self.heap.is_nil(test) {
                let body = self.heap.cdr(self.heap.car(self.heap.load(rest)));
                self.heap.unwind(mark);
                return if self.heap.is_nil(body) {
                    Ok(Tail::Value(test))
                } else {
                    self.eval_progn(body, env)
                };
            }
            let next = self.heap.cdr(self.heap.load(rest));
            self.heap.store(rest, next);
        }
    }

    /// Assign each (symbol value) pair in turn. Returns the last value assigned.
    fn eval_setq(&mut self, args: ObjRef, env: Slot) -> LispResult<ObjRef> {
        let mark = self.heap.root_mark();
        let rest = self.heap.slot(args);
        let value = self.heap.slot(self.heap.nil());

        while self.heap.is_cons(self.heap.load(rest)) {
            let pair = self.heap.load(rest);
            let var = self.heap.car(pair);
            if !self.heap.is_symbol(var) {
                return Err(self.heap.error(var, "is not a symbol"));
            }
            if var == self.heap.nil() || var == self.heap.t() {
                return Err(self.heap.error(var, "is a constant and cannot be set"));
            }
            let var = self.heap.slot(var);

            let expr = self.heap.car(self.heap.cdr(pair));
            let result = self.eval(expr, self.heap.load(env))?;
            self.heap.store(value, result);
            let (target, frame) = (self.heap.load(var), self.heap.load(env));
            env::set(&mut self.heap, target, result, frame)?;

            let next = self.heap.cdr(self.heap.cdr(self.heap.load(rest)));
            self.heap.store(rest, next);
        }

        let result = self.heap.load(value);
        self.heap.unwind(mark);
        Ok(result)
    }

    /// Expand the macro call in the `site` slot and overwrite the call-site cons with
    /// the expansion, so later evaluations of the same code skip the expansion.
    fn expand_macro(&mut self, func: Slot, args: Slot, site: Slot) -> LispResult<()> {
        let mark = self.heap.root_mark();
        let (macro_fn, forms) = (self.heap.load(func), self.heap.load(args));
        let frame = env::bind(&mut self.heap, macro_fn, forms)?;
        let frame = self.heap.slot(frame);
        let body = self.closure_body(self.heap.load(func));

        let expansion = match self.eval_progn(body, frame)? {
            Tail::Eval(last) => self.eval(last, self.heap.load(frame))?,
            Tail::Value(value) => value,
        };
        tracing::trace!(
            expansion = %printer::print(&self.heap, expansion, true),
            "macro expanded"
        );

        if self.heap.is_cons(expansion) {
            let call = self.heap.load(site);
            let (head, rest) = (self.heap.car(expansion), self.heap.cdr(expansion));
            self.heap.set_car(call, head);
            self.heap.set_cdr(call, rest);
        } else {
            let wrapped = self.heap.cons(expansion, self.heap.nil())?;
            let wrapped = self.heap.slot(wrapped);
            let progn = self.heap.intern(names::PROGN)?;
            let call = self.heap.load(site);
            self.heap.set_car(call, progn);
            self.heap.set_cdr(call, self.heap.load(wrapped));
        }
        self.heap.unwind(mark);
        Ok(())
    }
}
