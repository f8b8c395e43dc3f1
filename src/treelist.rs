//! Persistent, structurally shared integer-keyed list with a default value.
//!
//! Each node holds `SIZE` direct slots and `SPLIT` lazily created child nodes.
//! Index `i >= SIZE` lives in child `(i - SIZE) % SPLIT` at index `(i - SIZE) / SPLIT`.
//! Cloning a list is a pointer copy; `set` copies only the nodes on the path to the key.

use std::fmt;
use std::rc::Rc;

const SIZE: usize = 16;
const SPLIT: usize = 16;

#[derive(Clone)]
struct Node<T>
{
    direct: [T; SIZE],
    children: [Option<Rc<Node<T>>>; SPLIT],
}

impl<T: Clone> Node<T>
{
    fn new(default: &T) -> Self
    {
        Node {
            direct: std::array::from_fn(|_| default.clone()),
            children: Default::default(),
        }
    }
}

pub struct TreeList<T>
{
    default: T,
    merge_fn: fn(&T, &T) -> T,
    root: Rc<Node<T>>,
}

impl<T: Clone> Clone for TreeList<T>
{
    fn clone(&self) -> Self
    {
        TreeList {
            default: self.default.clone(),
            merge_fn: self.merge_fn,
            root: Rc::clone(&self.root),
        }
    }
}

impl<T: Clone + PartialEq> TreeList<T>
{
    /// `merge_fn` must be idempotent (`f(x, x) == x`) and commutative.
    pub fn new(default: T, merge_fn: fn(&T, &T) -> T) -> Self
    {
        let root = Rc::new(Node::new(&default));
        TreeList { default, merge_fn, root }
    }

    pub fn get(&self, i: usize) -> &T
    {
        let mut node = &self.root;
        let mut i = i;
        loop
        {
            if i < SIZE
            {
                return &node.direct[i];
            }
            i -= SIZE;
            match &node.children[i % SPLIT]
            {
                Some(child) =>
                {
                    node = child;
                    i /= SPLIT;
                }
                None => return &self.default,
            }
        }
    }

    pub fn set(&mut self, i: usize, value: T)
    {
        if *self.get(i) == value
        {
            return;
        }
        let default = self.default.clone();
        Self::set_in(Rc::make_mut(&mut self.root), i, value, &default);
    }

    fn set_in(node: &mut Node<T>, i: usize, value: T, default: &T)
    {
        if i < SIZE
        {
            node.direct[i] = value;
            return;
        }
        let i = i - SIZE;
        let child = node.children[i % SPLIT].get_or_insert_with(|| Rc::new(Node::new(default)));
        Self::set_in(Rc::make_mut(child), i / SPLIT, value, default);
    }

    /// Element-wise merge. Subtrees whose merge result is unchanged are shared, not rebuilt.
    pub fn merge(&self, other: &TreeList<T>) -> TreeList<T>
    {
        let root = Self::merge_nodes(&self.root, Some(&other.root), &self.default, self.merge_fn);
        TreeList {
            default: self.default.clone(),
            merge_fn: self.merge_fn,
            root,
        }
    }

    fn merge_nodes(left: &Rc<Node<T>>, right: Option<&Rc<Node<T>>>, default: &T, f: fn(&T, &T) -> T) -> Rc<Node<T>>
    {
        if let Some(right) = right
        {
            if Rc::ptr_eq(left, right)
            {
                return Rc::clone(left);
            }
        }

        let direct: [T; SIZE] = std::array::from_fn(|i| match right
        {
            Some(r) => f(&left.direct[i], &r.direct[i]),
            None => f(&left.direct[i], default),
        });

        let children: [Option<Rc<Node<T>>>; SPLIT] = std::array::from_fn(|i| {
            let l = left.children[i].as_ref();
            let r = right.and_then(|r| r.children[i].as_ref());
            match (l, r)
            {
                (None, None) => None,
                (Some(l), r) => Some(Self::merge_nodes(l, r, default, f)),
                (None, Some(r)) => Some(Self::merge_nodes(r, None, default, f)),
            }
        });

        if Self::same_content(left, &direct, &children)
        {
            return Rc::clone(left);
        }
        if let Some(right) = right
        {
            if Self::same_content(right, &direct, &children)
            {
                return Rc::clone(right);
            }
        }
        Rc::new(Node { direct, children })
    }

    fn same_content(node: &Node<T>, direct: &[T; SIZE], children: &[Option<Rc<Node<T>>>; SPLIT]) -> bool
    {
        node.direct == *direct
            && node.children.iter().zip(children.iter()).all(|(a, b)| match (a, b)
            {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            })
    }

    fn nodes_equal(a: Option<&Rc<Node<T>>>, b: Option<&Rc<Node<T>>>, default: &T) -> bool
    {
        match (a, b)
        {
            (None, None) => true,
            (Some(a), Some(b)) if Rc::ptr_eq(a, b) => true,
            (Some(a), Some(b)) =>
            {
                a.direct == b.direct
                    && (0..SPLIT).all(|i| Self::nodes_equal(a.children[i].as_ref(), b.children[i].as_ref(), default))
            }
            (Some(n), None) | (None, Some(n)) =>
            {
                n.direct.iter().all(|v| v == default)
                    && n.children.iter().all(|c| Self::nodes_equal(c.as_ref(), None, default))
            }
        }
    }
}

/// Logical equality: a missing subtree equals one holding only default values.
impl<T: Clone + PartialEq> PartialEq for TreeList<T>
{
    fn eq(&self, other: &Self) -> bool
    {
        self.default == other.default && Self::nodes_equal(Some(&self.root), Some(&other.root), &self.default)
    }
}

impl<T: Clone + PartialEq + fmt::Debug> fmt::Debug for TreeList<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let mut entries = Vec::new();
        collect_set(&self.root, 0, 1, &self.default, &mut entries);
        entries.sort_by_key(|(i, _)| *i);
        f.debug_map().entries(entries).finish()
    }
}

/// Non-default entries of `node` and its children. Local slot `j` of a node
/// holds global index `base + stride * j`.
fn collect_set<'a, T: PartialEq>(node: &'a Node<T>, base: usize, stride: usize, default: &T, out: &mut Vec<(usize, &'a T)>)
{
    for (j, v) in node.direct.iter().enumerate()
    {
        if v != default
        {
            out.push((base + stride * j, v));
        }
    }
    for (c, child) in node.children.iter().enumerate()
    {
        if let Some(child) = child
        {
            collect_set(child, base + stride * (SIZE + c), stride * SPLIT, default, out);
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use rand::Rng;
    use std::collections::HashMap;

    fn and(a: &u8, b: &u8) -> u8
    {
        a & b
    }

    fn or(a: &bool, b: &bool) -> bool
    {
        *a || *b
    }

    #[test]
    fn set_then_get_returns_last_value()
    {
        let mut rng = rand::thread_rng();
        let mut list = TreeList::new(0xffu8, and);
        let mut expected = HashMap::new();
        for _ in 0..2000
        {
            let k = rng.gen_range(0..5000usize);
            let v = rng.gen_range(0..=255u8);
            list.set(k, v);
            expected.insert(k, v);
        }
        for (k, v) in &expected
        {
            assert_eq!(list.get(*k), v, "key {}", k);
        }
        assert_eq!(*list.get(100_000), 0xff);
    }

    #[test]
    fn clone_is_isolated()
    {
        let mut original = TreeList::new(false, or);
        original.set(3, true);
        original.set(700, true);
        let mut copy = original.clone();
        copy.set(3, false);
        copy.set(701, true);
        assert!(*original.get(3));
        assert!(!*original.get(701));
        assert!(!*copy.get(3));
        assert!(*copy.get(700));
        assert!(*copy.get(701));
    }

    #[test]
    fn setting_same_value_shares_root()
    {
        let mut list = TreeList::new(0u8, and);
        list.set(40, 7);
        let copy = list.clone();
        list.set(40, 7);
        assert!(Rc::ptr_eq(&list.root, &copy.root));
    }

    #[test]
    fn merge_is_idempotent_and_commutative()
    {
        let mut rng = rand::thread_rng();
        for _ in 0..50
        {
            let default = rng.gen_range(0..=255u8);
            let mut a = TreeList::new(default, and);
            let mut b = TreeList::new(default, and);
            for _ in 0..60
            {
                a.set(rng.gen_range(0..600usize), rng.gen_range(0..=255u8));
                b.set(rng.gen_range(0..600usize), rng.gen_range(0..=255u8));
            }
            let ab = a.merge(&b);
            assert_eq!(ab, b.merge(&a));
            assert_eq!(a.merge(&ab), ab);
            for k in 0..600
            {
                assert_eq!(*ab.get(k), a.get(k) & b.get(k));
            }
        }
    }

    #[test]
    fn merge_reuses_unchanged_input()
    {
        let mut a = TreeList::new(0xffu8, and);
        a.set(500, 1);
        a.set(2, 0x01);
        let mut b = a.clone();
        b.set(2, 0x03);
        assert!(!Rc::ptr_eq(&a.root, &b.root));
        let merged = a.merge(&b);
        assert!(Rc::ptr_eq(&merged.root, &a.root));
    }

    #[test]
    fn missing_subtree_equals_default_subtree()
    {
        let mut a = TreeList::new(0u8, and);
        let b = TreeList::new(0u8, and);
        a.set(300, 5);
        a.set(300, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn debug_lists_entries_in_subtries()
    {
        let mut list = TreeList::new(0u8, and);
        list.set(3, 7);
        list.set(500, 9);
        list.set(70_000, 4);
        assert_eq!(format!("{:?}", list), "{3: 7, 500: 9, 70000: 4}");
    }
}
