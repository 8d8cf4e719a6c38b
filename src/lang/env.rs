use crate::mach::Address;
use std::collections::HashMap;

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Absolute memory cell.
    Global(Address),
    /// Offset into the active frame.
    Local(i16),
}

/// ## Variable scope
///
/// The root environment hands out global cells, first use first
/// allocated. Each `DEF FN` body gets a child whose names are frame
/// slots starting at 1; slot 0 of a frame saves the caller's frame pointer.

#[derive(Debug)]
pub struct Environment {
    vars: HashMap<String, Address>,
    next: Address,
    parent: Option<Box<Environment>>,
}

impl Environment {
    pub fn new(base: Address) -> Environment {
        Environment {
            vars: HashMap::new(),
            next: base,
            parent: None,
        }
    }

    pub fn child(parent: Environment) -> Environment {
        Environment {
            vars: HashMap::new(),
            next: 1,
            parent: Some(Box::new(parent)),
        }
    }

    /// Give back the enclosing scope, or this one if it is the root.
    pub fn into_parent(self) -> Environment {
        match self.parent {
            Some(parent) => *parent,
            None => self,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Frame slots used by this scope, including the saved frame pointer.
    pub fn frame_size(&self) -> usize {
        self.next
    }

    fn root_mut(&mut self) -> &mut Environment {
        match self.parent {
            Some(ref mut parent) => parent.root_mut(),
            None => self,
        }
    }

    /// Reserve `n` global cells, returning the first.
    pub fn allocate(&mut self, n: usize) -> Address {
        let root = self.root_mut();
        let addr = root.next;
        root.next += n;
        addr
    }

    /// One past the last global cell handed out.
    pub fn high_water(&self) -> Address {
        match &self.parent {
            Some(parent) => parent.high_water(),
            None => self.next,
        }
    }

    /// Declare a name in this scope.
    pub fn define(&mut self, name: &str) -> Slot {
        let addr = self.next;
        self.vars.insert(name.to_string(), addr);
        self.next += 1;
        self.slot(addr)
    }

    fn slot(&self, addr: Address) -> Slot {
        if self.is_root() {
            Slot::Global(addr)
        } else {
            Slot::Local(addr as i16)
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Slot> {
        match self.vars.get(name) {
            Some(addr) => Some(self.slot(*addr)),
            None => match &self.parent {
                Some(parent) => parent.lookup(name),
                None => None,
            },
        }
    }

    /// Look a name up through every scope; unknown names become globals.
    pub fn resolve(&mut self, name: &str) -> Slot {
        if let Some(slot) = self.lookup(name) {
            return slot;
        }
        self.root_mut().define(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_allocates() {
        let mut env = Environment::new(10);
        assert_eq!(env.resolve("A"), Slot::Global(10));
        assert_eq!(env.resolve("B"), Slot::Global(11));
        assert_eq!(env.resolve("A"), Slot::Global(10));
        assert_eq!(env.allocate(3), 12);
        assert_eq!(env.high_water(), 15);
    }

    #[test]
    fn test_child_scope() {
        let mut env = Environment::new(0);
        env.resolve("X");
        let mut child = Environment::child(env);
        assert_eq!(child.define("X"), Slot::Local(1));
        assert_eq!(child.define("Y"), Slot::Local(2));
        assert_eq!(child.resolve("X"), Slot::Local(1));
        assert_eq!(child.resolve("Z"), Slot::Global(1));
        assert_eq!(child.frame_size(), 3);
        let env = child.into_parent();
        assert!(env.is_root());
        assert_eq!(env.lookup("X"), Some(Slot::Global(0)));
        assert_eq!(env.lookup("Y"), None);
        assert_eq!(env.lookup("Z"), Some(Slot::Global(1)));
    }
}
