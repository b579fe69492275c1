use core::fmt;

/// Built-in atomic types.
///
/// `AnyAtomic` is the root of the hierarchy; `Numeric` stands for the union of the four
/// numeric primitives. `Integer` is treated as quasi-primitive: it keeps its own
/// calculators and comparers instead of collapsing into `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AtomicType {
    AnyAtomic,
    UntypedAtomic,
    String,
    Boolean,
    AnyUri,
    QName,
    Numeric,
    Decimal,
    Integer,
    Float,
    Double,
    Duration,
    YearMonthDuration,
    DayTimeDuration,
    DateTime,
    Date,
    Time,
}

impl AtomicType {
    pub const ALL: [AtomicType; 17] = [
        AtomicType::AnyAtomic,
        AtomicType::UntypedAtomic,
        AtomicType::String,
        AtomicType::Boolean,
        AtomicType::AnyUri,
        AtomicType::QName,
        AtomicType::Numeric,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::Float,
        AtomicType::Double,
        AtomicType::Duration,
        AtomicType::YearMonthDuration,
        AtomicType::DayTimeDuration,
        AtomicType::DateTime,
        AtomicType::Date,
        AtomicType::Time,
    ];

    /// Immediate supertype in the built-in hierarchy.
    pub fn parent(self) -> Option<AtomicType> {
        use AtomicType::*;
        match self {
            AnyAtomic => None,
            Decimal | Float | Double => Some(Numeric),
            Integer => Some(Decimal),
            YearMonthDuration | DayTimeDuration => Some(Duration),
            _ => Some(AnyAtomic),
        }
    }

    /// The primitive type used to select calculators and comparers. Every built-in type
    /// modelled here is primitive or quasi-primitive.
    pub fn primitive(self) -> AtomicType {
        self
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AtomicType::Numeric
                | AtomicType::Decimal
                | AtomicType::Integer
                | AtomicType::Float
                | AtomicType::Double
        )
    }

    /// True for the abstract types that no value is ever annotated with.
    pub fn is_abstract(self) -> bool {
        matches!(self, AtomicType::AnyAtomic | AtomicType::Numeric)
    }

    pub fn is_duration(self) -> bool {
        matches!(
            self,
            AtomicType::Duration | AtomicType::YearMonthDuration | AtomicType::DayTimeDuration
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, AtomicType::DateTime | AtomicType::Date | AtomicType::Time)
    }

    /// Whether `<`, `>` and friends are defined between two values of this type.
    pub fn is_ordered(self) -> bool {
        !matches!(self, AtomicType::QName | AtomicType::Duration)
    }

    pub fn local_name(self) -> &'static str {
        use AtomicType::*;
        match self {
            AnyAtomic => "anyAtomicType",
            UntypedAtomic => "untypedAtomic",
            String => "string",
            Boolean => "boolean",
            AnyUri => "anyURI",
            QName => "QName",
            Numeric => "numeric",
            Decimal => "decimal",
            Integer => "integer",
            Float => "float",
            Double => "double",
            Duration => "duration",
            YearMonthDuration => "yearMonthDuration",
            DayTimeDuration => "dayTimeDuration",
            DateTime => "dateTime",
            Date => "date",
            Time => "time",
        }
    }

    pub fn from_local_name(local: &str) -> Option<AtomicType> {
        AtomicType::ALL.into_iter().find(|t| t.local_name() == local)
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.local_name())
    }
}
