// Copyright 2026 the Term Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The abstract type lattice.
//!
//! Every X and Y slot carries one [`Type`]. Term-shaped types form a small
//! lattice under [`join`] (control-flow merge, moves *up*) and
//! [`meet`] (guard-test refinement, moves *down*). Non-term markers
//! (uninitialized slots, catch/try tags, match contexts, tuples under
//! construction) never mix with terms except by collapsing conservatively
//! at a join.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::program::{F64Bits, Label, Lit};

/// Tuple arity knowledge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TupleArity {
    /// Exactly `n` elements.
    Exact(u32),
    /// At least `n` elements.
    AtLeast(u32),
}

impl TupleArity {
    fn min(self) -> u32 {
        match self {
            Self::Exact(n) | Self::AtLeast(n) => n,
        }
    }
}

/// A term-shaped abstract type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermType {
    /// Any term.
    Any,
    /// `true` or `false`.
    Bool,
    /// A non-empty list cell.
    Cons,
    /// The empty list.
    Nil,
    /// A tuple with (partially) known arity.
    Tuple(TupleArity),
    /// An atom; `Some` pins the value.
    Atom(Option<String>),
    /// An integer; `Some` pins the value.
    Integer(Option<i64>),
    /// A float; `Some` pins the value (as raw bits).
    Float(Option<F64Bits>),
    /// Integer or float.
    Number,
    /// A map.
    Map,
    /// A binary or bit string.
    Binary,
    /// A specific literal term.
    Literal(Lit),
}

impl TermType {
    /// Collapses a literal to its concrete type head; other types are
    /// returned unchanged.
    #[must_use]
    pub fn headed(&self) -> TermType {
        match self {
            Self::Literal(l) => lit_type(l),
            other => other.clone(),
        }
    }
}

/// The concrete type head of a literal term.
#[must_use]
pub fn lit_type(l: &Lit) -> TermType {
    match l {
        Lit::Atom(a) => TermType::Atom(Some(a.clone())),
        Lit::Int(i) => TermType::Integer(Some(*i)),
        Lit::Float(x) => TermType::Float(Some(*x)),
        Lit::Nil => TermType::Nil,
        Lit::List(xs) => {
            if xs.is_empty() {
                TermType::Nil
            } else {
                TermType::Cons
            }
        }
        Lit::Tuple(xs) => TermType::Tuple(TupleArity::Exact(xs.len() as u32)),
        Lit::Binary(_) => TermType::Binary,
        Lit::Map(_) => TermType::Map,
    }
}

/// A set of handler labels, kept sorted and deduplicated.
pub type LabelSet = Vec<Label>;

/// Unions `b` into `a`, keeping `a` sorted and unique.
pub(crate) fn union_labels(a: &LabelSet, b: &LabelSet) -> LabelSet {
    let mut out = a.clone();
    for l in b {
        if let Err(pos) = out.binary_search(l) {
            out.insert(pos, *l);
        }
    }
    out
}

/// A binary match context.
///
/// Identity matters: two contexts are the same context only when their IDs
/// match. A join of two different contexts mints a fresh ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchCtx {
    /// Globally unique identity within one verification run.
    pub id: u64,
    /// Declared number of save slots.
    pub slots: u32,
    /// Bitmask of save slots that hold a valid position.
    pub valid: u64,
}

/// Mints match-context identities.
#[derive(Clone, Debug, Default)]
pub struct CtxIds(u64);

impl CtxIds {
    /// Returns a fresh, never-before-used ID.
    pub fn fresh(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// The abstract type of a register slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    /// The slot has never been written on some path (Y only).
    Uninitialized,
    /// The slot holds a GC-safe but otherwise opaque term (Y only).
    Initialized,
    /// The slot holds a catch tag for the given handler labels (Y only).
    CatchTag(LabelSet),
    /// The slot holds a try tag for the given handler labels (Y only).
    TryTag(LabelSet),
    /// The slot holds a binary match context.
    MatchContext(MatchCtx),
    /// The slot is the destination of an unfinished `put_tuple` run.
    TupleInProgress,
    /// Return-type marker for calls that always raise; never stored.
    Exception,
    /// The slot holds a term.
    Term {
        /// The term's abstract type.
        ty: TermType,
        /// `true` when the term is reachable only outside the root set and
        /// must not be stored in a Y register.
        fragile: bool,
    },
}

impl Type {
    /// A plain (non-fragile) term of type `ty`.
    #[must_use]
    pub fn term(ty: TermType) -> Self {
        Self::Term { ty, fragile: false }
    }

    /// A fragile term of type `ty`.
    #[must_use]
    pub fn fragile(ty: TermType) -> Self {
        Self::Term { ty, fragile: true }
    }

    /// Any term, the top of the term lattice.
    #[must_use]
    pub fn any() -> Self {
        Self::term(TermType::Any)
    }

    /// Returns `true` for catch and try tags.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        matches!(self, Self::CatchTag(_) | Self::TryTag(_))
    }
}

/// Joins two slot types at a control-flow merge.
///
/// The result is an upper bound of both inputs: any read or test that is
/// legal on the join is legal on both inputs. Fragility is sticky.
#[must_use]
pub fn join(a: &Type, b: &Type, ids: &mut CtxIds) -> Type {
    use Type::*;
    match (a, b) {
        (Uninitialized, _) | (_, Uninitialized) => Uninitialized,
        (CatchTag(s1), CatchTag(s2)) => CatchTag(union_labels(s1, s2)),
        (TryTag(s1), TryTag(s2)) => TryTag(union_labels(s1, s2)),
        (MatchContext(c1), MatchContext(c2)) => {
            let id = if c1.id == c2.id { c1.id } else { ids.fresh() };
            MatchContext(MatchCtx {
                id,
                slots: c1.slots.min(c2.slots),
                valid: c1.valid & c2.valid,
            })
        }
        (TupleInProgress, TupleInProgress) => TupleInProgress,
        (
            Term {
                ty: t1,
                fragile: f1,
            },
            Term {
                ty: t2,
                fragile: f2,
            },
        ) => Term {
            ty: join_terms(t1, t2),
            fragile: *f1 || *f2,
        },
        // Any other mix of markers and terms collapses to the weakest
        // readable thing: an opaque initialized slot.
        _ => Initialized,
    }
}

/// Joins two term types (least upper bound in the term lattice).
#[must_use]
pub fn join_terms(a: &TermType, b: &TermType) -> TermType {
    use TermType::*;
    if a == b {
        return a.clone();
    }
    // Distinct literals join through their concrete heads.
    let a = a.headed();
    let b = b.headed();
    match (&a, &b) {
        (Any, _) | (_, Any) => Any,
        (Bool, Bool) => Bool,
        (Cons, Cons) => Cons,
        (Nil, Nil) => Nil,
        (Map, Map) => Map,
        (Binary, Binary) => Binary,
        (Atom(x), Atom(y)) => {
            if x == y {
                Atom(x.clone())
            } else {
                Atom(None)
            }
        }
        (Integer(x), Integer(y)) => {
            if x == y {
                Integer(*x)
            } else {
                Integer(None)
            }
        }
        (Float(x), Float(y)) => {
            if x == y {
                Float(*x)
            } else {
                Float(None)
            }
        }
        (
            Integer(_) | Float(_) | Number,
            Integer(_) | Float(_) | Number,
        ) => Number,
        // Equal exact arities still widen to at_least; callers rely on the
        // join being stable under repeated merging.
        (Tuple(x), Tuple(y)) => Tuple(TupleArity::AtLeast(x.min().min(y.min()))),
        _ => Any,
    }
}

/// Refines `a` by guard-test knowledge `b` (greatest lower bound).
///
/// Returns `None` when the two are incompatible, meaning the test can
/// never succeed on this path.
#[must_use]
pub fn meet(a: &TermType, b: &TermType) -> Option<TermType> {
    use TermType::*;
    if a == b {
        return Some(a.clone());
    }
    let ah = a.headed();
    let bh = b.headed();
    match (&ah, &bh) {
        (Any, _) => Some(b.clone()),
        (_, Any) => Some(a.clone()),
        (Number, Integer(_) | Float(_)) => Some(bh),
        (Integer(_) | Float(_), Number) => Some(ah),
        (Atom(None), Atom(Some(_))) => Some(bh),
        (Atom(Some(_)), Atom(None)) => Some(ah),
        (Atom(Some(x)), Atom(Some(y))) => (x == y).then_some(ah),
        (Integer(None), Integer(Some(_))) => Some(bh),
        (Integer(Some(_)), Integer(None)) => Some(ah),
        (Integer(Some(x)), Integer(Some(y))) => (x == y).then_some(ah),
        (Float(None), Float(Some(_))) => Some(bh),
        (Float(Some(_)), Float(None)) => Some(ah),
        (Float(Some(x)), Float(Some(y))) => (x == y).then_some(ah),
        (Bool, Atom(Some(v))) | (Atom(Some(v)), Bool) => {
            (v == "true" || v == "false").then(|| Atom(Some(v.clone())))
        }
        (Bool, Atom(None)) | (Atom(None), Bool) => Some(Bool),
        (Tuple(x), Tuple(y)) => meet_tuples(*x, *y).map(Tuple),
        _ => {
            if ah == bh {
                Some(ah)
            } else {
                None
            }
        }
    }
}

fn meet_tuples(a: TupleArity, b: TupleArity) -> Option<TupleArity> {
    use TupleArity::*;
    match (a, b) {
        (Exact(n), Exact(m)) => (n == m).then_some(Exact(n)),
        (Exact(n), AtLeast(m)) | (AtLeast(m), Exact(n)) => (n >= m).then_some(Exact(n)),
        (AtLeast(n), AtLeast(m)) => Some(AtLeast(n.max(m))),
    }
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "term"),
            Self::Bool => write!(f, "bool"),
            Self::Cons => write!(f, "cons"),
            Self::Nil => write!(f, "nil"),
            Self::Tuple(TupleArity::Exact(n)) => write!(f, "{{tuple,{n}}}"),
            Self::Tuple(TupleArity::AtLeast(n)) => write!(f, "{{tuple,'>={n}'}}"),
            Self::Atom(None) => write!(f, "atom"),
            Self::Atom(Some(a)) => write!(f, "{{atom,{a}}}"),
            Self::Integer(None) => write!(f, "integer"),
            Self::Integer(Some(i)) => write!(f, "{{integer,{i}}}"),
            Self::Float(None) => write!(f, "float"),
            Self::Float(Some(x)) => write!(f, "{{float,{x}}}"),
            Self::Number => write!(f, "number"),
            Self::Map => write!(f, "map"),
            Self::Binary => write!(f, "binary"),
            Self::Literal(l) => write!(f, "{{literal,{l}}}"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initialized => write!(f, "initialized"),
            Self::CatchTag(ls) => write!(f, "{{catchtag,{}}}", Labels(ls)),
            Self::TryTag(ls) => write!(f, "{{trytag,{}}}", Labels(ls)),
            Self::MatchContext(c) => {
                write!(f, "{{match_context,{},{}}}", c.id, c.slots)
            }
            Self::TupleInProgress => write!(f, "tuple_in_progress"),
            Self::Exception => write!(f, "exception"),
            Self::Term { ty, fragile: false } => write!(f, "{ty}"),
            Self::Term { ty, fragile: true } => write!(f, "{{fragile,{ty}}}"),
        }
    }
}

struct Labels<'a>(&'a [Label]);

impl fmt::Display for Labels<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, l) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", l.0)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn t(ty: TermType) -> Type {
        Type::term(ty)
    }

    #[test]
    fn atom_values_collapse_to_their_head() {
        assert_eq!(
            join_terms(
                &TermType::Atom(Some("a".into())),
                &TermType::Atom(Some("b".into()))
            ),
            TermType::Atom(None)
        );
        assert_eq!(
            join_terms(
                &TermType::Atom(Some("a".into())),
                &TermType::Atom(Some("a".into()))
            ),
            TermType::Atom(Some("a".into()))
        );
    }

    #[test]
    fn numeric_joins_widen_to_number() {
        assert_eq!(
            join_terms(&TermType::Integer(Some(1)), &TermType::Float(None)),
            TermType::Number
        );
        assert_eq!(
            join_terms(&TermType::Number, &TermType::Integer(None)),
            TermType::Number
        );
    }

    #[test]
    fn tuple_joins_always_widen_to_at_least_min() {
        assert_eq!(
            join_terms(
                &TermType::Tuple(TupleArity::Exact(3)),
                &TermType::Tuple(TupleArity::Exact(3))
            ),
            TermType::Tuple(TupleArity::AtLeast(3))
        );
        assert_eq!(
            join_terms(
                &TermType::Tuple(TupleArity::Exact(2)),
                &TermType::Tuple(TupleArity::AtLeast(5))
            ),
            TermType::Tuple(TupleArity::AtLeast(2))
        );
    }

    #[test]
    fn fragility_is_sticky_across_joins() {
        let mut ids = CtxIds::default();
        let a = Type::fragile(TermType::Any);
        let b = t(TermType::Binary);
        assert_eq!(join(&a, &b, &mut ids), Type::fragile(TermType::Any));
    }

    #[test]
    fn uninitialized_wins_every_join() {
        let mut ids = CtxIds::default();
        assert_eq!(
            join(&Type::Uninitialized, &t(TermType::Any), &mut ids),
            Type::Uninitialized
        );
        assert_eq!(
            join(&Type::CatchTag(vec![Label(3)]), &Type::Uninitialized, &mut ids),
            Type::Uninitialized
        );
    }

    #[test]
    fn tag_joins_union_their_labels() {
        let mut ids = CtxIds::default();
        let a = Type::CatchTag(vec![Label(1), Label(4)]);
        let b = Type::CatchTag(vec![Label(2), Label(4)]);
        assert_eq!(
            join(&a, &b, &mut ids),
            Type::CatchTag(vec![Label(1), Label(2), Label(4)])
        );
    }

    #[test]
    fn context_joins_mint_fresh_ids_and_intersect_masks() {
        let mut ids = CtxIds::default();
        let a = Type::MatchContext(MatchCtx {
            id: 1,
            slots: 4,
            valid: 0b1010,
        });
        let b = Type::MatchContext(MatchCtx {
            id: 2,
            slots: 3,
            valid: 0b0110,
        });
        let Type::MatchContext(c) = join(&a, &b, &mut ids) else {
            panic!("expected a context");
        };
        assert_ne!(c.id, 1);
        assert_ne!(c.id, 2);
        assert_eq!(c.slots, 3);
        assert_eq!(c.valid, 0b0010);

        // Same identity joins in place.
        let Type::MatchContext(c) = join(&a, &a, &mut ids) else {
            panic!("expected a context");
        };
        assert_eq!(c.id, 1);
    }

    #[test]
    fn meet_refines_downward() {
        assert_eq!(
            meet(&TermType::Any, &TermType::Map),
            Some(TermType::Map)
        );
        assert_eq!(
            meet(&TermType::Number, &TermType::Integer(None)),
            Some(TermType::Integer(None))
        );
        assert_eq!(
            meet(
                &TermType::Tuple(TupleArity::AtLeast(2)),
                &TermType::Tuple(TupleArity::Exact(3))
            ),
            Some(TermType::Tuple(TupleArity::Exact(3)))
        );
        assert_eq!(
            meet(
                &TermType::Tuple(TupleArity::AtLeast(4)),
                &TermType::Tuple(TupleArity::Exact(3))
            ),
            None
        );
        assert_eq!(meet(&TermType::Map, &TermType::Binary), None);
    }

    #[test]
    fn literals_meet_through_their_heads() {
        let lit = TermType::Literal(Lit::Tuple(vec![Lit::Int(1), Lit::Int(2)]));
        assert_eq!(
            meet(&TermType::Tuple(TupleArity::AtLeast(1)), &lit),
            Some(TermType::Tuple(TupleArity::Exact(2)))
        );
    }
}
