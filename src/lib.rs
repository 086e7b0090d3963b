//! tinylisp: a small Lisp runtime for embedding in a text editor.
//!
//! The runtime has a semispace copying collector, a reader, a tail-recursive
//! evaluator with in-place macro expansion, and a handful of primitives. Editor
//! commands are reached through the [`Editor`] trait supplied by the host.
//!
//! ```no_run
//! use tinylisp::{Config, Machine, NullEditor};
//!
//! let mut machine = Machine::new(Config::default(), Box::new(NullEditor)).unwrap();
//! assert_eq!(machine.evaluate("(defun sq (x) (* x x)) (sq 9)"), "#<Lambda (x)>\n81\n");
//! ```

pub mod driver;
pub mod editor;
pub mod env;
pub mod error;
pub mod eval;
pub mod heap;
pub mod object;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod stream;
pub mod symbol;
pub mod value;

pub use driver::Config;
pub use editor::{Editor, NullEditor};
pub use error::{LispError, LispResult};
pub use eval::Machine;
pub use value::ObjRef;
