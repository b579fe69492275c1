//! The closed set of system functions known to the compiler, with their signatures and
//! static result types.

use crate::compiler::properties::Dependencies;
use crate::consts::{FNS, INTERNAL_NS};
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::{AtomicType, Cardinality, ItemType, SequenceType, type_hierarchy};
use crate::xdm::ExpandedName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemFunction {
    Position,
    Last,
    True,
    False,
    Not,
    Boolean,
    Exists,
    Empty,
    Count,
    /// `subsequence($s, $start)` or `subsequence($s, $start, $length)`.
    Subsequence {
        with_length: bool,
    },
    Remove,
    Floor,
    Ceiling,
    Round,
    Abs,
    Number,
    String,
    Data,
    Sum,
    /// `ignore_nan` is only set by the minimax rewrite of general comparisons.
    Min {
        ignore_nan: bool,
    },
    Max {
        ignore_nan: bool,
    },
    Reverse,
    Head,
    Tail,
    StringLength,
    Concat {
        arity: usize,
    },
    /// Internal: true when the numeric argument has no fractional part.
    IsWholeNumber,
}

const ITEMS: SequenceType = SequenceType::ANY;
const ONE_NUMERIC: SequenceType = SequenceType { item_type: ItemType::NUMERIC, cardinality: Cardinality::EXACTLY_ONE };
const OPT_NUMERIC: SequenceType = SequenceType { item_type: ItemType::NUMERIC, cardinality: Cardinality::ZERO_OR_ONE };
const ONE_INTEGER: SequenceType = SequenceType::SINGLE_INTEGER;
const OPT_ITEM: SequenceType = SequenceType { item_type: ItemType::AnyItem, cardinality: Cardinality::ZERO_OR_ONE };
const OPT_STRING: SequenceType = SequenceType { item_type: ItemType::STRING, cardinality: Cardinality::ZERO_OR_ONE };

impl SystemFunction {
    /// Resolves a function by expanded name and arity.
    pub fn lookup(name: &ExpandedName, arity: usize) -> Result<SystemFunction, Error> {
        use SystemFunction::*;
        let unknown = || {
            Error::from_code(ErrorCode::XPST0017, format!("unknown function {name}#{arity}"))
        };
        match name.ns_uri.as_deref() {
            Some(INTERNAL_NS) => {
                return match (name.local.as_str(), arity) {
                    ("is-whole-number", 1) => Ok(IsWholeNumber),
                    _ => Err(unknown()),
                };
            }
            Some(FNS) => {}
            _ => return Err(unknown()),
        }
        let f = match (name.local.as_str(), arity) {
            ("position", 0) => Position,
            ("last", 0) => Last,
            ("true", 0) => True,
            ("false", 0) => False,
            ("not", 1) => Not,
            ("boolean", 1) => Boolean,
            ("exists", 1) => Exists,
            ("empty", 1) => Empty,
            ("count", 1) => Count,
            ("subsequence", 2) => Subsequence { with_length: false },
            ("subsequence", 3) => Subsequence { with_length: true },
            ("remove", 2) => Remove,
            ("floor", 1) => Floor,
            ("ceiling", 1) => Ceiling,
            ("round", 1) => Round,
            ("abs", 1) => Abs,
            ("number", 0 | 1) => Number,
            ("string", 0 | 1) => String,
            ("data", 1) => Data,
            ("sum", 1) => Sum,
            ("min", 1) => Min { ignore_nan: false },
            ("max", 1) => Max { ignore_nan: false },
            ("reverse", 1) => Reverse,
            ("head", 1) => Head,
            ("tail", 1) => Tail,
            ("string-length", 0 | 1) => StringLength,
            ("concat", n) if n >= 2 => Concat { arity: n },
            _ => return Err(unknown()),
        };
        Ok(f)
    }

    pub fn local_name(&self) -> &'static str {
        use SystemFunction::*;
        match self {
            Position => "position",
            Last => "last",
            True => "true",
            False => "false",
            Not => "not",
            Boolean => "boolean",
            Exists => "exists",
            Empty => "empty",
            Count => "count",
            Subsequence { .. } => "subsequence",
            Remove => "remove",
            Floor => "floor",
            Ceiling => "ceiling",
            Round => "round",
            Abs => "abs",
            Number => "number",
            String => "string",
            Data => "data",
            Sum => "sum",
            Min { .. } => "min",
            Max { .. } => "max",
            Reverse => "reverse",
            Head => "head",
            Tail => "tail",
            StringLength => "string-length",
            Concat { .. } => "concat",
            IsWholeNumber => "is-whole-number",
        }
    }

    pub fn name(&self) -> ExpandedName {
        let ns = if *self == SystemFunction::IsWholeNumber { INTERNAL_NS } else { FNS };
        ExpandedName::new(Some(ns), self.local_name())
    }

    /// Functions that read the context item when called without arguments.
    pub fn takes_context_item_by_default(&self) -> bool {
        matches!(self, SystemFunction::Number | SystemFunction::String | SystemFunction::StringLength)
    }

    /// Required type of argument `index`.
    pub fn argument_type(&self, index: usize) -> SequenceType {
        use SystemFunction::*;
        match (self, index) {
            (Subsequence { .. }, 0) | (Remove, 0) => ITEMS,
            (Subsequence { .. }, _) => ONE_NUMERIC,
            (Remove, _) => ONE_INTEGER,
            (Floor | Ceiling | Round | Abs | IsWholeNumber, _) => OPT_NUMERIC,
            (Number, _) => SequenceType::OPTIONAL_ATOMIC,
            (String, _) => OPT_ITEM,
            (StringLength, _) => OPT_STRING,
            (Concat { .. }, _) => SequenceType::OPTIONAL_ATOMIC,
            (Sum | Min { .. } | Max { .. }, _) => SequenceType::ATOMIC_SEQUENCE,
            _ => ITEMS,
        }
    }

    /// Whether the function ignores the order and duplicates of argument `index`.
    pub fn ignores_argument_order(&self, index: usize) -> bool {
        use SystemFunction::*;
        index == 0 && matches!(self, Not | Boolean | Exists | Empty | Min { .. } | Max { .. })
    }

    /// Whether the function ignores the order of argument `index` but counts duplicates.
    pub fn counts_argument(&self, index: usize) -> bool {
        index == 0 && matches!(self, SystemFunction::Count | SystemFunction::Sum)
    }

    pub fn intrinsic_dependencies(&self) -> Dependencies {
        match self {
            SystemFunction::Position => Dependencies::POSITION,
            SystemFunction::Last => Dependencies::LAST,
            _ => Dependencies::empty(),
        }
    }

    /// Static result type given the static types of the arguments.
    pub fn result_type(&self, args: &[(ItemType, Cardinality)]) -> (ItemType, Cardinality) {
        use SystemFunction::*;
        let one = Cardinality::EXACTLY_ONE;
        let arg0 = args.first().copied().unwrap_or((ItemType::Empty, Cardinality::EMPTY));
        let with_zero = |c: Cardinality| {
            if c.is_at_most_one() { Cardinality::ZERO_OR_ONE } else { c | Cardinality::ALLOWS_ZERO }
        };
        let numeric_of = |t: ItemType| match t.atomized() {
            ItemType::Atomic(AtomicType::UntypedAtomic) => ItemType::DOUBLE,
            ItemType::Atomic(a) if a.is_numeric() => ItemType::Atomic(a),
            ItemType::Empty => ItemType::Empty,
            _ => ItemType::NUMERIC,
        };
        match self {
            Position | Last | Count | StringLength => (ItemType::INTEGER, one),
            True | False | Not | Boolean | Exists | Empty | IsWholeNumber => (ItemType::BOOLEAN, one),
            Subsequence { .. } | Remove | Tail => (arg0.0, with_zero(arg0.1)),
            Reverse => arg0,
            Head => {
                let c = if arg0.1.is_empty_sequence() {
                    Cardinality::EMPTY
                } else if arg0.1.allows_zero() {
                    Cardinality::ZERO_OR_ONE
                } else {
                    one
                };
                (arg0.0, c)
            }
            Floor | Ceiling | Round | Abs => (numeric_of(arg0.0), arg0.1),
            Number => (ItemType::DOUBLE, one),
            String | Concat { .. } => (ItemType::STRING, one),
            Data => (arg0.0.atomized(), arg0.1),
            Sum => {
                let t = match numeric_of(arg0.0) {
                    ItemType::Empty => ItemType::INTEGER,
                    t if type_hierarchy().is_subtype(&t, &ItemType::NUMERIC) => t,
                    _ => ItemType::ANY_ATOMIC,
                };
                (t, one)
            }
            Min { .. } | Max { .. } => {
                let t = match arg0.0.atomized() {
                    ItemType::Atomic(AtomicType::UntypedAtomic) => ItemType::DOUBLE,
                    other => other,
                };
                (t, if arg0.1.allows_zero() { Cardinality::ZERO_OR_ONE } else { one })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_arity() {
        let f = SystemFunction::lookup(&ExpandedName::new(Some(FNS), "subsequence"), 3).unwrap();
        assert_eq!(f, SystemFunction::Subsequence { with_length: true });
        let err = SystemFunction::lookup(&ExpandedName::new(Some(FNS), "count"), 2).unwrap_err();
        assert_eq!(err.code, ErrorCode::XPST0017);
        let err = SystemFunction::lookup(&ExpandedName::local("count"), 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::XPST0017);
    }

    #[test]
    fn result_types_follow_arguments() {
        let (t, c) = SystemFunction::Floor.result_type(&[(ItemType::UNTYPED, Cardinality::EXACTLY_ONE)]);
        assert_eq!(t, ItemType::DOUBLE);
        assert_eq!(c, Cardinality::EXACTLY_ONE);
        let (_, c) = SystemFunction::Subsequence { with_length: false }
            .result_type(&[(ItemType::INTEGER, Cardinality::ONE_OR_MORE), (ItemType::DOUBLE, Cardinality::EXACTLY_ONE)]);
        assert_eq!(c, Cardinality::ZERO_OR_MORE);
    }
}
