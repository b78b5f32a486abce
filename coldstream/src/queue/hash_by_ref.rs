// lifted from..
// https://github.com/eqv/hash_by_ref
// Copyright (c) 2017 Cornelius Aschermann
// modified to hash by address only, so fat pointers to the
// same node compare equal

use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Identity key for an `Rc`, used to find a node's index while wiring.
pub(crate) struct HashByRef<T: ?Sized> {
    val: Rc<T>,
}

impl<T: ?Sized> HashByRef<T> {
    pub fn new(val: Rc<T>) -> Self {
        HashByRef { val }
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.val) as *const ()
    }
}

impl<T: ?Sized> Hash for HashByRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized> PartialEq for HashByRef<T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl<T: ?Sized> Eq for HashByRef<T> {}

#[cfg(test)]
mod tests {
    use super::HashByRef;
    use std::collections::HashSet;
    use std::rc::Rc;

    #[test]
    fn clones_share_identity() {
        let a = Rc::new(1);
        let b = Rc::new(1);
        let mut seen = HashSet::new();
        assert!(seen.insert(HashByRef::new(a.clone())));
        assert!(!seen.insert(HashByRef::new(a)));
        assert!(seen.insert(HashByRef::new(b)));
    }
}
