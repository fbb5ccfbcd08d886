use std::{collections::HashMap, fmt};

/// Handle to an interned source name: an identifier, a member name, or a
/// synthesized symbol name. Two handles from the same [`Interner`] compare
/// equal iff their names do.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Name(u32);

impl Name {
    /// Whether this is the empty name, carried by identifiers fabricated
    /// for parser error recovery.
    pub fn is_empty(self) -> bool {
        self == well_known::EMPTY
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// Names every compilation needs, seeded into each interner at fixed
/// handles so they can be used without a lookup or a mutable borrow.
pub mod well_known {
    use super::Name;

    /// The name of missing identifiers.
    pub const EMPTY: Name = Name(0);
    /// The entry point, user-declared or synthesized.
    pub const MAIN: Name = Name(1);
    /// The implicit receiver parameter of instance methods.
    pub const THIS: Name = Name(2);
    /// The synthesized constructor pair of a class.
    pub const CTOR: Name = Name(3);
    /// The upper-bound variable introduced when lowering `for` loops.
    pub const UPPER: Name = Name(4);

    pub(super) const SEED: &[&str] = &["", "main", "this", ".ctor", "upper"];
}

/// Deduplicating store for source names. Distinct names live back to back
/// in a single buffer; identifiers are short, so resolution stays a cheap
/// slice into it rather than a pointer chase per name.
pub struct Interner {
    buffer: String,
    /// Byte range of each name in `buffer`, indexed by handle.
    spans: Vec<(u32, u32)>,
    lookup: HashMap<Box<str>, Name>,
}

impl Interner {
    pub fn with_capacity(names: usize) -> Interner {
        let mut interner = Interner {
            buffer: String::with_capacity(names * 8),
            spans: Vec::with_capacity(names),
            lookup: HashMap::with_capacity(names),
        };
        for name in well_known::SEED {
            interner.intern(name);
        }
        interner
    }

    /// Interns the provided text, returning a handle which can be used to
    /// retrieve it later. Equal text always yields the same handle.
    pub fn intern(&mut self, text: &str) -> Name {
        if let Some(&name) = self.lookup.get(text) {
            return name;
        }
        let lo = u32::try_from(self.buffer.len()).expect("name buffer overflow");
        let hi = lo + text.len() as u32;
        self.buffer.push_str(text);
        let name = Name(u32::try_from(self.spans.len()).expect("interner out of capacity"));
        self.spans.push((lo, hi));
        self.lookup.insert(text.into(), name);
        name
    }

    /// Returns the text behind a handle produced by this interner.
    pub fn resolve(&self, name: Name) -> &str {
        let (lo, hi) = self.spans[name.0 as usize];
        &self.buffer[lo as usize..hi as usize]
    }
}

impl Default for Interner {
    fn default() -> Interner {
        Interner::with_capacity(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interning_deduplicates() {
        let mut interner = Interner::with_capacity(4);

        let hello1 = interner.intern("hello");
        let world1 = interner.intern("world");
        let hello2 = interner.intern("hello");
        let world2 = interner.intern("world");

        assert_eq!(hello1, hello2);
        assert_eq!(world1, world2);
        assert_ne!(hello1, world1);
        assert_eq!(interner.resolve(hello1), "hello");
        assert_eq!(interner.resolve(world1), "world");
    }

    #[test]
    fn well_known_names_are_seeded() {
        let mut interner = Interner::with_capacity(0);
        assert_eq!(interner.resolve(well_known::EMPTY), "");
        assert_eq!(interner.resolve(well_known::MAIN), "main");
        assert_eq!(interner.resolve(well_known::THIS), "this");
        assert_eq!(interner.resolve(well_known::CTOR), ".ctor");
        assert_eq!(interner.resolve(well_known::UPPER), "upper");

        // Interning a seeded name hands back its fixed handle.
        assert_eq!(interner.intern("main"), well_known::MAIN);
        assert_eq!(interner.intern(""), well_known::EMPTY);
        assert!(well_known::EMPTY.is_empty());
        assert!(!well_known::MAIN.is_empty());
    }
}
