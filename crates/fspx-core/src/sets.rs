//! Ordered label sets.
//!
//! A [`LabelSet`] is the working representation of an FSP action-label set:
//! an ordered sequence of label strings (duplicates preserved, order is
//! significant for iteration) plus an optional bound-variable name recorded
//! when the set came from a variable-binding action range.
//!
//! The combination operations mirror FSP label syntax: `dotcat` joins with a
//! literal `.`, the `indexize` family brackets its argument. Cartesian
//! combinations keep the receiver as the first axis, varying fastest.

/// Ordered, possibly repeated sequence of action labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LabelSet {
    labels: Vec<String>,
    variable: Option<String>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-label set.
    pub fn singleton(label: impl Into<String>) -> Self {
        Self {
            labels: vec![label.into()],
            variable: None,
        }
    }

    pub fn from_labels(labels: Vec<String>) -> Self {
        Self {
            labels,
            variable: None,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, i: usize) -> &str {
        &self.labels[i]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Appends a single label (multiset append).
    pub fn push(&mut self, label: impl Into<String>) {
        self.labels.push(label.into());
    }

    /// Appends every label of `other`, preserving both orders.
    pub fn extend_from(&mut self, other: &LabelSet) {
        self.labels.extend(other.labels.iter().cloned());
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        self.variable = None;
    }

    /// Binds a variable name to this set for context expansion.
    pub fn set_variable(&mut self, name: impl Into<String>) {
        self.variable = Some(name.into());
    }

    pub fn variable(&self) -> Option<&str> {
        self.variable.as_deref()
    }

    pub fn has_variable(&self) -> bool {
        self.variable.is_some()
    }

    /// Yields `(label, index)` pairs in order, for context expansion.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().enumerate().map(|(i, s)| (s.as_str(), i))
    }

    /// Replaces every element `e` with `e.s`.
    pub fn dotcat(&mut self, s: &str) -> &mut Self {
        for label in &mut self.labels {
            label.push('.');
            label.push_str(s);
        }
        self
    }

    /// Cartesian dot concatenation: for sets `A = [a1..am]` and
    /// `B = [b1..bn]` the result is `[a1.b1, .., am.b1, a1.b2, .., am.bn]`,
    /// the receiver axis varying fastest.
    pub fn dotcat_set(&mut self, other: &LabelSet) -> &mut Self {
        self.combine(other, ".", "")
    }

    /// Appends `[i]` to every element.
    pub fn indexize_int(&mut self, index: i64) -> &mut Self {
        self.indexize_str(&index.to_string())
    }

    /// Appends `[s]` to every element.
    pub fn indexize_str(&mut self, s: &str) -> &mut Self {
        for label in &mut self.labels {
            label.push('[');
            label.push_str(s);
            label.push(']');
        }
        self
    }

    /// Expands every element `e` into `e[low], e[low+1], .., e[high]`, the
    /// index varying fastest within each element.
    pub fn indexize_range(&mut self, low: i64, high: i64) -> &mut Self {
        let mut out = Vec::with_capacity(self.labels.len() * (high - low + 1).max(0) as usize);
        for label in &self.labels {
            for i in low..=high {
                out.push(format!("{label}[{i}]"));
            }
        }
        self.labels = out;
        self
    }

    /// Cartesian bracket concatenation, same axis order as
    /// [`dotcat_set`](Self::dotcat_set).
    pub fn indexize_set(&mut self, other: &LabelSet) -> &mut Self {
        self.combine(other, "[", "]")
    }

    fn combine(&mut self, other: &LabelSet, pre: &str, post: &str) -> &mut Self {
        let mut out = Vec::with_capacity(self.labels.len() * other.labels.len());
        for suffix in &other.labels {
            for label in &self.labels {
                out.push(format!("{label}{pre}{suffix}{post}"));
            }
        }
        self.labels = out;
        self
    }
}

impl std::fmt::Display for LabelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{label}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(labels: &[&str]) -> LabelSet {
        LabelSet::from_labels(labels.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn dotcat_string() {
        let mut s = set(&["a", "b"]);
        s.dotcat("x");
        assert_eq!(s.labels(), &["a.x", "b.x"]);
    }

    #[test]
    fn dotcat_set_axis_order() {
        let mut a = set(&["a1", "a2"]);
        a.dotcat_set(&set(&["b1", "b2", "b3"]));
        assert_eq!(
            a.labels(),
            &["a1.b1", "a2.b1", "a1.b2", "a2.b2", "a1.b3", "a2.b3"]
        );
    }

    #[test]
    fn dotcat_is_associative() {
        let a = set(&["a1", "a2"]);
        let b = set(&["b1", "b2"]);
        let c = set(&["c1", "c2"]);

        let mut left = a.clone();
        left.dotcat_set(&b);
        left.dotcat_set(&c);

        let mut bc = b.clone();
        bc.dotcat_set(&c);
        let mut right = a.clone();
        right.dotcat_set(&bc);

        assert_eq!(left, right);
    }

    #[test]
    fn indexize_forms() {
        let mut s = set(&["a"]);
        s.indexize_int(3);
        assert_eq!(s.labels(), &["a[3]"]);

        let mut s = set(&["a", "b"]);
        s.indexize_range(0, 2);
        assert_eq!(s.labels(), &["a[0]", "a[1]", "a[2]", "b[0]", "b[1]", "b[2]"]);

        let mut s = set(&["a", "b"]);
        s.indexize_set(&set(&["1", "2"]));
        assert_eq!(s.labels(), &["a[1]", "b[1]", "a[2]", "b[2]"]);
    }

    #[test]
    fn variable_binding_iteration() {
        let mut s = set(&["x", "y"]);
        s.set_variable("i");
        assert!(s.has_variable());
        let pairs: Vec<_> = s.iter().collect();
        assert_eq!(pairs, vec![("x", 0), ("y", 1)]);
    }
}
