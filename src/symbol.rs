use crate::error::LispResult;
use crate::heap::Heap;
use crate::value::{ObjRef, Object};

/// Names the runtime refers to directly.
pub mod names {
    pub const QUOTE: &[u8] = b"quote";
    pub const PROGN: &[u8] = b"progn";
}

impl Heap {
    /// Intern a symbol name. Returns the existing symbol if the name is already in the
    /// symbol list, otherwise allocates one and prepends it.
    ///
    /// Since names are unique, `intern(a) == intern(b)` exactly when the names match.
    pub fn intern(&mut self, name: &[u8]) -> LispResult<ObjRef> {
        if let Some(existing) = self.find_symbol(name) {
            return Ok(existing);
        }
        let sym = self.allocate(Object::Symbol(name.to_vec().into_boxed_slice()), &mut [])?;
        // the symbol list is a heap root, so only the new symbol needs pinning
        let list = self.cons(sym, self.nil())?;
        let sym = self.car(list);
        let symbols = self.symbols;
        self.set_cdr(list, symbols);
        self.symbols = list;
        Ok(sym)
    }

    /// Look up a symbol by name, without interning.
    pub fn find_symbol(&self, name: &[u8]) -> Option<ObjRef> {
        let mut list = self.symbols;
        while self.is_cons(list) {
            let sym = self.car(list);
            if self.text(sym) == Some(name) {
                return Some(sym);
            }
            list = self.cdr(list);
        }
        None
    }

    /// Total number of interned symbols.
    pub fn symbol_count(&self) -> usize {
        let mut count = 0;
        let mut list = self.symbols;
        while self.is_cons(list) {
            count += 1;
            list = self.cdr(list);
        }
        count
    }
}
