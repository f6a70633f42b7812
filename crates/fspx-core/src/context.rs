//! Bound-variable contexts.
//!
//! A [`Context`] maps variable names to their current value, which is always
//! a string: either an action label or the decimal form of an integer. The
//! translator threads one context through every recursive translation and
//! saves/restores it around deferred re-translations.

/// Ordered variable → value bindings. Value types are compared by string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    names: Vec<String>,
    values: Vec<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value`; fails on an already-bound name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.names.iter().any(|n| n == name) {
            return false;
        }
        self.names.push(name.to_owned());
        self.values.push(value.into());
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i].as_str())
    }

    /// Unbinds `name`, returning whether it was bound.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.names.iter().position(|n| n == name) {
            Some(i) => {
                self.names.remove(i);
                self.values.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.names.clear();
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lookup_remove() {
        let mut ctx = Context::new();
        assert!(ctx.insert("i", "3"));
        assert!(!ctx.insert("i", "4"));
        assert_eq!(ctx.lookup("i"), Some("3"));
        assert!(ctx.remove("i"));
        assert!(!ctx.remove("i"));
        assert_eq!(ctx.lookup("i"), None);
    }

    #[test]
    fn equality_is_order_sensitive() {
        let mut a = Context::new();
        a.insert("i", "0");
        a.insert("j", "1");
        let mut b = Context::new();
        b.insert("j", "1");
        b.insert("i", "0");
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
