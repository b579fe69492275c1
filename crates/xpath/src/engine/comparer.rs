//! Comparison dispatch and the untyped-atomic coercion rules of value and general
//! comparisons.

use core::cmp::Ordering;
use core::fmt;

use chrono::FixedOffset;

use crate::engine::calculator::temporal_instants;
use crate::engine::casting::cast_atomic;
use crate::engine::collation::CollationRef;
use crate::engine::numeric::{classify, compare_numeric};
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::{AtomicType, type_hierarchy};
use crate::xdm::XdmAtomicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// The operator that gives the same answer with the operands swapped.
    pub fn inverse(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    pub fn general_symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn value_symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        }
    }

    /// Applies the operator to an ordering; `None` stands for an unordered pair (NaN).
    pub fn test(self, ord: Option<Ordering>) -> bool {
        match ord {
            None => self == CompareOp::Ne,
            Some(o) => match self {
                CompareOp::Eq => o == Ordering::Equal,
                CompareOp::Ne => o != Ordering::Equal,
                CompareOp::Lt => o == Ordering::Less,
                CompareOp::Le => o != Ordering::Greater,
                CompareOp::Gt => o == Ordering::Greater,
                CompareOp::Ge => o != Ordering::Less,
            },
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value_symbol())
    }
}

/// Comparison strategy for a pair of primitive operand types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparer {
    Numeric,
    /// `xs:string`, `xs:anyURI` and cast untyped values, under a collation.
    String,
    Boolean,
    Duration,
    DateTime,
    Date,
    Time,
    QName,
    /// Resolved against the operand values on each comparison.
    Dynamic,
}

/// Runtime inputs a comparison may need.
#[derive(Debug, Clone, Copy)]
pub struct CompareEnv<'a> {
    pub collation: &'a CollationRef,
    /// `None` while folding at compile time.
    pub implicit_timezone: Option<FixedOffset>,
}

fn is_stringlike(t: AtomicType) -> bool {
    matches!(t, AtomicType::String | AtomicType::AnyUri | AtomicType::UntypedAtomic)
}

impl Comparer {
    /// Resolves the comparer for two primitive types, after untyped coercion.
    ///
    /// `None` means values of these types are never comparable. Abstract types give
    /// [`Comparer::Dynamic`] unless `must_resolve` is set.
    pub fn resolve(left: AtomicType, right: AtomicType, must_resolve: bool) -> Option<Comparer> {
        use AtomicType as T;
        if left.is_abstract() || right.is_abstract() {
            if must_resolve {
                return None;
            }
            let th = type_hierarchy();
            let within = |t: AtomicType, bound: AtomicType| !bound.is_abstract() || th.is_atomic_subtype(t, bound);
            let possible = AtomicType::ALL
                .into_iter()
                .filter(|t| !t.is_abstract() && within(*t, left) && within(*t, right))
                .any(|t| {
                    let l = if left.is_abstract() { t } else { left };
                    let r = if right.is_abstract() { t } else { right };
                    Comparer::resolve(l, r, true).is_some()
                });
            return possible.then_some(Comparer::Dynamic);
        }
        if left.is_numeric() && right.is_numeric() {
            return Some(Comparer::Numeric);
        }
        if is_stringlike(left) && is_stringlike(right) {
            return Some(Comparer::String);
        }
        if left.is_duration() && right.is_duration() {
            return Some(Comparer::Duration);
        }
        match (left, right) {
            (T::Boolean, T::Boolean) => Some(Comparer::Boolean),
            (T::DateTime, T::DateTime) => Some(Comparer::DateTime),
            (T::Date, T::Date) => Some(Comparer::Date),
            (T::Time, T::Time) => Some(Comparer::Time),
            (T::QName, T::QName) => Some(Comparer::QName),
            _ => None,
        }
    }

    /// Whether `op` is defined for the types this comparer handles, given both static
    /// operand types.
    pub fn supports(&self, op: CompareOp, left: AtomicType, right: AtomicType) -> bool {
        if !op.is_ordering() {
            return true;
        }
        match self {
            Comparer::QName => false,
            // only the two totally ordered subtypes of xs:duration
            Comparer::Duration => left == right && left != AtomicType::Duration,
            _ => true,
        }
    }

    pub fn compare(
        &self,
        op: CompareOp,
        a: &XdmAtomicValue,
        b: &XdmAtomicValue,
        env: &CompareEnv<'_>,
    ) -> Result<bool, Error> {
        let (lt, rt) = (a.atomic_type(), b.atomic_type());
        let concrete = match self {
            Comparer::Dynamic => Comparer::resolve(lt, rt, true).ok_or_else(|| incomparable(a, b))?,
            c => *c,
        };
        if !concrete.supports(op, lt, rt) {
            return Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("operator '{op}' is not defined for {lt} and {rt}"),
            ));
        }
        Ok(op.test(concrete.order(a, b, env)?))
    }

    fn order(&self, a: &XdmAtomicValue, b: &XdmAtomicValue, env: &CompareEnv<'_>) -> Result<Option<Ordering>, Error> {
        use XdmAtomicValue as V;
        match (self, a, b) {
            (Comparer::Numeric, _, _) => match (classify(a), classify(b)) {
                (Some(x), Some(y)) => Ok(compare_numeric(x, y)),
                _ => Err(incomparable(a, b)),
            },
            (
                Comparer::String,
                V::String(x) | V::AnyUri(x) | V::UntypedAtomic(x),
                V::String(y) | V::AnyUri(y) | V::UntypedAtomic(y),
            ) => Ok(Some(env.collation.compare(x, y))),
            (Comparer::Boolean, V::Boolean(x), V::Boolean(y)) => Ok(Some(x.cmp(y))),
            (Comparer::Duration, _, _) => {
                let parts = |v: &XdmAtomicValue| match v {
                    V::Duration { months, millis } => Some((*months, *millis)),
                    V::YearMonthDuration(m) => Some((*m, 0)),
                    V::DayTimeDuration(ms) => Some((0, *ms)),
                    _ => None,
                };
                match (parts(a), parts(b)) {
                    (Some(x), Some(y)) if x == y => Ok(Some(Ordering::Equal)),
                    (Some((mx, sx)), Some((my, sy))) => Ok(Some(mx.cmp(&my).then(sx.cmp(&sy)))),
                    _ => Err(incomparable(a, b)),
                }
            }
            (Comparer::DateTime | Comparer::Date | Comparer::Time, _, _) => {
                let (x, y) = temporal_instants(a, b, env.implicit_timezone)?;
                Ok(Some(x.cmp(&y)))
            }
            (
                Comparer::QName,
                V::QName { ns_uri: nx, local: lx, .. },
                V::QName { ns_uri: ny, local: ly, .. },
            ) => Ok(Some(if nx == ny && lx == ly { Ordering::Equal } else { Ordering::Less })),
            _ => Err(incomparable(a, b)),
        }
    }
}

fn incomparable(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Error {
    Error::dynamic(
        ErrorCode::XPTY0004,
        format!("cannot compare {} with {}", a.atomic_type(), b.atomic_type()),
    )
}

/// Static target type for an untyped operand of a general comparison.
///
/// Untyped against numeric becomes `xs:double`; untyped against untyped or string
/// becomes `xs:string`; otherwise the other operand's primitive type. `None` when the
/// other side is not known precisely enough to decide statically.
pub fn general_untyped_target(other: AtomicType) -> Option<AtomicType> {
    if other.is_numeric() {
        Some(AtomicType::Double)
    } else if other == AtomicType::UntypedAtomic {
        Some(AtomicType::String)
    } else if other.is_abstract() {
        None
    } else {
        Some(other.primitive())
    }
}

/// Applies the general-comparison coercion to one pair of atomized values.
pub(crate) fn coerce_general_pair(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
) -> Result<(XdmAtomicValue, XdmAtomicValue), Error> {
    let convert = |v: &XdmAtomicValue, other: &XdmAtomicValue| -> Result<XdmAtomicValue, Error> {
        match general_untyped_target(other.atomic_type()) {
            Some(t) => cast_atomic(v, t),
            None => Ok(v.clone()),
        }
    };
    match (a.is_untyped(), b.is_untyped()) {
        (false, false) => Ok((a.clone(), b.clone())),
        (true, false) => Ok((convert(a, b)?, b.clone())),
        (false, true) => Ok((a.clone(), convert(b, a)?)),
        (true, true) => Ok((cast_atomic(a, AtomicType::String)?, cast_atomic(b, AtomicType::String)?)),
    }
}

/// Value comparisons read untyped operands as strings.
pub(crate) fn coerce_value_operand(v: XdmAtomicValue) -> XdmAtomicValue {
    match v {
        XdmAtomicValue::UntypedAtomic(s) => XdmAtomicValue::String(s),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use XdmAtomicValue as V;

    fn env() -> CompareEnv<'static> {
        static CODEPOINT: CollationRef = CollationRef::Codepoint;
        CompareEnv { collation: &CODEPOINT, implicit_timezone: None }
    }

    #[test]
    fn inverse_is_an_involution() {
        for op in [CompareOp::Eq, CompareOp::Ne, CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge] {
            assert_eq!(op.inverse().inverse(), op);
        }
    }

    #[test]
    fn untyped_against_numeric_is_double() {
        let (a, b) = coerce_general_pair(&V::UntypedAtomic("10".into()), &V::Integer(9)).unwrap();
        assert_eq!(a, V::Double(10.0));
        assert!(Comparer::Numeric.compare(CompareOp::Gt, &a, &b, &env()).unwrap());
        let (a, _) = coerce_general_pair(&V::UntypedAtomic("x".into()), &V::UntypedAtomic("y".into())).unwrap();
        assert_eq!(a, V::String("x".into()));
    }

    #[test]
    fn nan_only_satisfies_ne() {
        let nan = V::Double(f64::NAN);
        assert!(!Comparer::Numeric.compare(CompareOp::Eq, &nan, &nan, &env()).unwrap());
        assert!(Comparer::Numeric.compare(CompareOp::Ne, &nan, &nan, &env()).unwrap());
    }

    #[test]
    fn resolution() {
        assert_eq!(Comparer::resolve(AtomicType::Integer, AtomicType::Double, false), Some(Comparer::Numeric));
        assert_eq!(Comparer::resolve(AtomicType::String, AtomicType::Integer, false), None);
        assert_eq!(Comparer::resolve(AtomicType::AnyAtomic, AtomicType::Integer, false), Some(Comparer::Dynamic));
        assert!(!Comparer::QName.supports(CompareOp::Lt, AtomicType::QName, AtomicType::QName));
        let err = Comparer::Dynamic
            .compare(CompareOp::Eq, &V::String("1".into()), &V::Integer(1), &env())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::XPTY0004);
    }
}
