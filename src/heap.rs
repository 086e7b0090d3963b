use crate::error::{LispError, LispResult};
use crate::value::{ObjRef, Object, CELL_SIZE};

/// A slot in the root table. The collector rewrites the handle stored in it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Slot(u32);

/// Height of the root table, taken before pushing slots and restored with `unwind`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RootMark(usize);

/// Cells allocated by `Heap::new`: `nil`, `t` and the two conses of the symbol list.
const BOOTSTRAP_SIZE: usize = 4 * CELL_SIZE;

/// Semispace heap with a Cheney copying collector.
///
/// Objects are bump-allocated into `from`. When `capacity` bytes are used up, every
/// object reachable from `nil`, `t`, the symbol list and the root table is copied into
/// `to`, and the two spaces swap roles. An `ObjRef` is an index into `from`, so any
/// handle not stored in a root slot is stale after a collection.
pub struct Heap {
    from: Vec<Object>,
    to: Vec<Object>,
    /// Bytes allocated in the active space.
    used: usize,
    /// Bytes available in each space.
    capacity: usize,
    nil: ObjRef,
    t: ObjRef,
    /// The interned symbol list, a chain of conses terminated by nil.
    pub(crate) symbols: ObjRef,
    roots: Vec<ObjRef>,
    collections: usize,
}

impl Heap {
    /// Create a heap with `capacity` bytes per semispace, holding only `nil` and `t`.
    ///
    /// Fails with `OutOfMemory` if the space cannot hold those first cells.
    pub fn new(capacity: usize) -> LispResult<Self> {
        if capacity <= BOOTSTRAP_SIZE {
            return Err(LispError::OutOfMemory(BOOTSTRAP_SIZE));
        }
        let mut heap = Heap {
            from: Vec::with_capacity(1024),
            to: Vec::new(),
            used: 0,
            capacity,
            nil: ObjRef(0),
            t: ObjRef(0),
            symbols: ObjRef(0),
            roots: Vec::new(),
            collections: 0,
        };

        // nil and t come first; nothing is reachable yet, so these cannot collect.
        heap.nil = heap.allocate(Object::Symbol(b"nil".to_vec().into_boxed_slice()), &mut [])?;
        heap.t = heap.allocate(Object::Symbol(b"t".to_vec().into_boxed_slice()), &mut [])?;
        heap.symbols = heap.nil;
        let (nil, t) = (heap.nil, heap.t);
        heap.symbols = heap.cons(nil, heap.symbols)?;
        heap.symbols = heap.cons(t, heap.symbols)?;
        Ok(heap)
    }

    #[inline]
    pub fn nil(&self) -> ObjRef {
        self.nil
    }

    #[inline]
    pub fn t(&self) -> ObjRef {
        self.t
    }

    /// `t` for true, `nil` for false.
    pub fn boolean(&self, b: bool) -> ObjRef {
        if b {
            self.t
        } else {
            self.nil
        }
    }

    /// Allocate `object` in the active space.
    ///
    /// The handles in `pinned` are rooted across a possible collection and rewritten
    /// in place, so callers pass the fields of `object` here and rebuild it from them.
    /// Use the typed constructors instead of calling this with a populated object.
    pub(crate) fn allocate(&mut self, object: Object, pinned: &mut [ObjRef]) -> LispResult<ObjRef> {
        let size = object.size();
        self.reserve(size, pinned)?;
        let mut object = object;
        let mut i = 0;
        object.for_each_ref(|r| {
            *r = pinned[i];
            i += 1;
        });
        let id = ObjRef(self.from.len() as u32);
        self.from.push(object);
        self.used += size;
        Ok(id)
    }

    /// Make room for `size` bytes, collecting if needed.
    fn reserve(&mut self, size: usize, pinned: &mut [ObjRef]) -> LispResult<()> {
        if self.used + size < self.capacity {
            return Ok(());
        }
        let mark = self.root_mark();
        for &r in pinned.iter() {
            self.roots.push(r);
        }
        self.collect();
        for (i, r) in pinned.iter_mut().enumerate() {
            *r = self.roots[mark.0 + i];
        }
        self.unwind(mark);
        if self.used + size >= self.capacity {
            return Err(LispError::OutOfMemory(size));
        }
        Ok(())
    }

    // === Root table ===

    pub fn root_mark(&self) -> RootMark {
        RootMark(self.roots.len())
    }

    /// Push `r` onto the root table.
    pub fn slot(&mut self, r: ObjRef) -> Slot {
        self.roots.push(r);
        Slot((self.roots.len() - 1) as u32)
    }

    #[inline]
    pub fn load(&self, slot: Slot) -> ObjRef {
        self.roots[slot.0 as usize]
    }

    #[inline]
    pub fn store(&mut self, slot: Slot, r: ObjRef) {
        self.roots[slot.0 as usize] = r;
    }

    /// Drop every slot pushed since `mark`.
    pub fn unwind(&mut self, mark: RootMark) {
        self.roots.truncate(mark.0);
    }

    // === Accessors ===

    #[inline]
    pub fn get(&self, r: ObjRef) -> &Object {
        &self.from[r.0 as usize]
    }

    /// Car of a cons; nil for anything else.
    #[inline]
    pub fn car(&self, r: ObjRef) -> ObjRef {
        match self.get(r) {
            Object::Cons { car, .. } => *car,
            _ => self.nil,
        }
    }

    /// Cdr of a cons; nil for anything else.
    #[inline]
    pub fn cdr(&self, r: ObjRef) -> ObjRef {
        match self.get(r) {
            Object::Cons { cdr, .. } => *cdr,
            _ => self.nil,
        }
    }

    /// Set the car of a cons. No-op on anything else.
    pub fn set_car(&mut self, r: ObjRef, val: ObjRef) {
        if let Object::Cons { car, .. } = &mut self.from[r.0 as usize] {
            *car = val;
        }
    }

    /// Set the cdr of a cons. No-op on anything else.
    pub fn set_cdr(&mut self, r: ObjRef, val: ObjRef) {
        if let Object::Cons { cdr, .. } = &mut self.from[r.0 as usize] {
            *cdr = val;
        }
    }

    pub(crate) fn get_mut(&mut self, r: ObjRef) -> &mut Object {
        &mut self.from[r.0 as usize]
    }

    #[inline]
    pub fn is_nil(&self, r: ObjRef) -> bool {
        r == self.nil
    }

    #[inline]
    pub fn is_cons(&self, r: ObjRef) -> bool {
        matches!(self.get(r), Object::Cons { .. })
    }

    #[inline]
    pub fn is_symbol(&self, r: ObjRef) -> bool {
        matches!(self.get(r), Object::Symbol(_))
    }

    pub fn number(&self, r: ObjRef) -> Option<f64> {
        match self.get(r) {
            Object::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Bytes of a string or symbol.
    pub fn text(&self, r: ObjRef) -> Option<&[u8]> {
        match self.get(r) {
            Object::String(text) | Object::Symbol(text) => Some(text),
            _ => None,
        }
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    /// The handles are only valid until the next allocation.
    pub fn list_to_vec(&self, list: ObjRef) -> Option<Vec<ObjRef>> {
        let mut result = Vec::new();
        let mut current = list;
        loop {
            match self.get(current) {
                Object::Cons { car, cdr } => {
                    result.push(*car);
                    current = *cdr;
                }
                _ if current == self.nil => return Some(result),
                _ => return None,
            }
        }
    }

    // === Statistics ===

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    pub fn live_objects(&self) -> usize {
        self.from.len()
    }

    // === Collection ===

    /// Run Cheney's copying collection now.
    pub fn collect(&mut self) {
        let before = self.used;
        let mut copier = Copier {
            from: std::mem::take(&mut self.from),
            to: std::mem::take(&mut self.to),
            used: 0,
        };
        copier.to.clear();

        // symbols first, so the symbol list lands at the front of to-space
        self.symbols = copier.forward(self.symbols);
        self.nil = copier.forward(self.nil);
        self.t = copier.forward(self.t);
        for r in self.roots.iter_mut() {
            *r = copier.forward(*r);
        }

        // the scan finger chases the allocation finger
        let mut scan = 0;
        while scan < copier.to.len() {
            let mut object = std::mem::replace(&mut copier.to[scan], Object::Number(0.0));
            object.for_each_ref(|r| *r = copier.forward(*r));
            copier.to[scan] = object;
            scan += 1;
        }

        self.from = copier.to;
        self.to = copier.from;
        self.used = copier.used;
        self.collections += 1;
        tracing::debug!(
            before,
            after = self.used,
            objects = self.from.len(),
            collections = self.collections,
            "garbage collected"
        );
    }
}

/// The two spaces during a collection.
struct Copier {
    from: Vec<Object>,
    to: Vec<Object>,
    used: usize,
}

impl Copier {
    /// Move one object to to-space, or follow its forwarding marker if already moved.
    fn forward(&mut self, r: ObjRef) -> ObjRef {
        let slot = &mut self.from[r.0 as usize];
        if let Object::Forward(new) = slot {
            return *new;
        }
        let new = ObjRef(self.to.len() as u32);
        let object = std::mem::replace(slot, Object::Forward(new));
        self.used += object.size();
        self.to.push(object);
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_and_t_are_distinct_symbols() {
        let heap = Heap::new(4096).unwrap();
        assert_ne!(heap.nil(), heap.t());
        assert!(heap.is_symbol(heap.nil()));
        assert_eq!(heap.text(heap.t()), Some(&b"t"[..]));
    }

    #[test]
    fn capacity_below_the_first_cells_is_out_of_memory() {
        assert_eq!(
            Heap::new(16).err(),
            Some(LispError::OutOfMemory(BOOTSTRAP_SIZE))
        );
        assert!(Heap::new(BOOTSTRAP_SIZE).is_err());
        assert!(Heap::new(BOOTSTRAP_SIZE + CELL_SIZE).is_ok());
    }

    #[test]
    fn unrooted_objects_are_reclaimed() {
        let mut heap = Heap::new(64 * 1024).unwrap();
        let baseline = heap.live_objects();
        for i in 0..100 {
            heap.make_number(i as f64).unwrap();
            heap.cons(heap.nil(), heap.nil()).unwrap();
        }
        heap.collect();
        assert_eq!(heap.live_objects(), baseline);
    }

    #[test]
    fn rooted_objects_survive_with_fields_intact() {
        let mut heap = Heap::new(64 * 1024).unwrap();
        let one = heap.make_number(1.0).unwrap();
        let slot = heap.slot(one);
        let two = heap.make_number(2.0).unwrap();
        let pair = heap.cons(heap.load(slot), two).unwrap();
        heap.store(slot, pair);

        for _ in 0..5 {
            heap.collect();
        }

        let pair = heap.load(slot);
        assert_eq!(heap.number(heap.car(pair)), Some(1.0));
        assert_eq!(heap.number(heap.cdr(pair)), Some(2.0));
    }

    #[test]
    fn shared_objects_stay_shared() {
        let mut heap = Heap::new(64 * 1024).unwrap();
        let shared = heap.make_number(7.0).unwrap();
        let pair = heap.cons(shared, shared).unwrap();
        let slot = heap.slot(pair);
        heap.collect();
        let pair = heap.load(slot);
        assert_eq!(heap.car(pair), heap.cdr(pair));
    }

    #[test]
    fn allocation_collects_when_full() {
        let mut heap = Heap::new(CELL_SIZE * 64).unwrap();
        for i in 0..1000 {
            heap.make_number(i as f64).unwrap();
        }
        assert!(heap.collections() > 0);
    }

    #[test]
    fn allocation_fails_when_live_data_fills_the_space() {
        let mut heap = Heap::new(CELL_SIZE * 16).unwrap();
        let slot = heap.slot(heap.nil());
        let mut result = Ok(());
        for _ in 0..100 {
            let list = heap.load(slot);
            match heap.cons(heap.nil(), list) {
                Ok(cell) => heap.store(slot, cell),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        assert_eq!(result, Err(LispError::OutOfMemory(CELL_SIZE)));
    }

    #[test]
    fn pinned_fields_follow_a_collection() {
        let mut heap = Heap::new(CELL_SIZE * 32).unwrap();
        let slot = heap.slot(heap.nil());
        // fill the space with garbage so the next cons must collect
        while heap.used() + CELL_SIZE * 2 < heap.capacity() {
            heap.make_number(0.0).unwrap();
        }
        let car = heap.make_number(3.0).unwrap();
        let before = heap.collections();
        let pair = heap.cons(car, heap.nil()).unwrap();
        heap.store(slot, pair);
        assert!(heap.collections() > before);
        assert_eq!(heap.number(heap.car(heap.load(slot))), Some(3.0));
    }
}
