//! Set types for field path tracking.

use super::path::{Path, PathElement};
use std::collections::{BTreeMap, BTreeSet};

/// Set is a prefix tree of field paths.
///
/// `members` holds the paths that end at this level; `children` holds the
/// subtrees of paths that continue past it. A path element can be both a
/// member and a child (a field owned as a whole that also has owned leaves).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Set {
    pub members: BTreeSet<PathElement>,
    pub children: BTreeMap<PathElement, Set>,
    root_in_set: bool,
}

impl Set {
    pub fn new() -> Self {
        Set::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_in_set && self.members.is_empty() && self.children.is_empty()
    }

    /// Returns true if the set contains the given path.
    pub fn has(&self, path: &Path) -> bool {
        match path.as_slice().split_first() {
            None => self.root_in_set,
            Some((first, rest)) => self.has_elements(first, rest),
        }
    }

    fn has_elements(&self, first: &PathElement, rest: &[PathElement]) -> bool {
        match rest.split_first() {
            None => self.members.contains(first),
            Some((next, rest)) => self
                .children
                .get(first)
                .is_some_and(|child| child.has_elements(next, rest)),
        }
    }

    /// Inserts a path into the set.
    pub fn insert(&mut self, path: &Path) {
        let mut current = self;
        let Some((last, parents)) = path.as_slice().split_last() else {
            current.root_in_set = true;
            return;
        };
        for pe in parents {
            current = current.children.entry(pe.clone()).or_default();
        }
        current.members.insert(last.clone());
    }

    pub fn union(&self, other: &Set) -> Set {
        let mut result = self.clone();
        result.union_into(other);
        result
    }

    fn union_into(&mut self, other: &Set) {
        self.root_in_set |= other.root_in_set;
        self.members.extend(other.members.iter().cloned());
        for (key, other_child) in &other.children {
            match self.children.get_mut(key) {
                Some(child) => child.union_into(other_child),
                None => {
                    self.children.insert(key.clone(), other_child.clone());
                }
            }
        }
    }

    pub fn intersection(&self, other: &Set) -> Set {
        let children = self
            .children
            .iter()
            .filter_map(|(key, child)| {
                let shared = child.intersection(other.children.get(key)?);
                (!shared.is_empty()).then(|| (key.clone(), shared))
            })
            .collect();
        Set {
            members: self.members.intersection(&other.members).cloned().collect(),
            children,
            root_in_set: self.root_in_set && other.root_in_set,
        }
    }

    /// Returns the paths of `self` that are not in `other`.
    pub fn difference(&self, other: &Set) -> Set {
        let children = self
            .children
            .iter()
            .filter_map(|(key, child)| {
                let rest = match other.children.get(key) {
                    Some(other_child) => child.difference(other_child),
                    None => child.clone(),
                };
                (!rest.is_empty()).then(|| (key.clone(), rest))
            })
            .collect();
        Set {
            members: self.members.difference(&other.members).cloned().collect(),
            children,
            root_in_set: self.root_in_set && !other.root_in_set,
        }
    }

    /// Calls `f` for every path in the set, in order.
    pub fn iterate<F>(&self, mut f: F)
    where
        F: FnMut(&Path),
    {
        let mut path = Path::new();
        if self.root_in_set {
            f(&path);
        }
        self.iterate_with_path(&mut path, &mut f);
    }

    fn iterate_with_path<F>(&self, current: &mut Path, f: &mut F)
    where
        F: FnMut(&Path),
    {
        for member in &self.members {
            current.push(member.clone());
            f(current);
            current.pop();
        }
        for (key, child) in &self.children {
            current.push(key.clone());
            child.iterate_with_path(current, f);
            current.pop();
        }
    }

    /// Returns every path in the set.
    pub fn paths(&self) -> Vec<Path> {
        let mut paths = Vec::new();
        self.iterate(|p| paths.push(p.clone()));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(names: &[&str]) -> Path {
        Path::from_field_names(names)
    }

    #[test]
    fn test_insert_and_has() {
        let mut set = Set::new();
        assert!(set.is_empty());

        set.insert(&p(&["metadata", "name"]));
        assert!(set.has(&p(&["metadata", "name"])));
        assert!(!set.has(&p(&["metadata"])));
        assert!(!set.has(&Path::new()));
    }

    #[test]
    fn test_set_operations() {
        let mut a = Set::new();
        a.insert(&p(&["spec", "replicas"]));
        a.insert(&p(&["spec", "paused"]));

        let mut b = Set::new();
        b.insert(&p(&["spec", "replicas"]));
        b.insert(&p(&["metadata", "labels"]));

        let both = a.intersection(&b);
        assert_eq!(both.paths(), vec![p(&["spec", "replicas"])]);

        let only_a = a.difference(&b);
        assert_eq!(only_a.paths(), vec![p(&["spec", "paused"])]);

        assert_eq!(a.union(&b).paths().len(), 3);
    }

    #[test]
    fn test_intersection_of_disjoint_subtrees_is_empty() {
        let mut a = Set::new();
        a.insert(&p(&["spec", "template", "spec", "containers"]));
        let mut b = Set::new();
        b.insert(&p(&["spec", "template", "metadata", "labels"]));
        assert!(a.intersection(&b).is_empty());
    }
}
