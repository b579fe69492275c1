use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Static multiplicity of a sequence, as a set of permitted sizes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cardinality: u8 {
        const ALLOWS_ZERO = 0b001;
        const ALLOWS_ONE = 0b010;
        const ALLOWS_MANY = 0b100;

        const EMPTY = Self::ALLOWS_ZERO.bits();
        const EXACTLY_ONE = Self::ALLOWS_ONE.bits();
        const ZERO_OR_ONE = Self::ALLOWS_ZERO.bits() | Self::ALLOWS_ONE.bits();
        const ZERO_OR_MORE = Self::ALLOWS_ZERO.bits() | Self::ALLOWS_ONE.bits() | Self::ALLOWS_MANY.bits();
        const ONE_OR_MORE = Self::ALLOWS_ONE.bits() | Self::ALLOWS_MANY.bits();
    }
}

impl Cardinality {
    pub fn allows_zero(self) -> bool {
        self.contains(Cardinality::ALLOWS_ZERO)
    }

    pub fn allows_one(self) -> bool {
        self.contains(Cardinality::ALLOWS_ONE)
    }

    pub fn allows_many(self) -> bool {
        self.contains(Cardinality::ALLOWS_MANY)
    }

    /// Only the empty sequence is permitted.
    pub fn is_empty_sequence(self) -> bool {
        self == Cardinality::EMPTY
    }

    /// At most one item.
    pub fn is_at_most_one(self) -> bool {
        !self.allows_many()
    }

    /// `self` permits every size that `other` permits.
    pub fn subsumes(self, other: Cardinality) -> bool {
        self.contains(other)
    }

    /// Cardinality of the concatenation `(a, b)`.
    pub fn sum(self, other: Cardinality) -> Cardinality {
        let min = self.min_size() + other.min_size();
        let max = self.max_size().saturating_add(other.max_size());
        Cardinality::from_bounds(min, max)
    }

    /// Cardinality of a mapping that yields `other` items for each of `self` items.
    pub fn multiply(self, other: Cardinality) -> Cardinality {
        if self.is_empty_sequence() || other.is_empty_sequence() {
            return Cardinality::EMPTY;
        }
        let min = self.min_size() * other.min_size();
        let max = self.max_size().saturating_mul(other.max_size());
        Cardinality::from_bounds(min, max)
    }

    pub fn from_count(n: usize) -> Cardinality {
        match n {
            0 => Cardinality::EMPTY,
            1 => Cardinality::EXACTLY_ONE,
            _ => Cardinality::ALLOWS_MANY,
        }
    }

    fn min_size(self) -> u8 {
        if self.allows_zero() || self.is_empty() {
            0
        } else if self.allows_one() {
            1
        } else {
            2
        }
    }

    // 2 stands for "more than one"
    fn max_size(self) -> u8 {
        if self.allows_many() {
            2
        } else if self.allows_one() {
            1
        } else {
            0
        }
    }

    fn from_bounds(min: u8, max: u8) -> Cardinality {
        let mut c = Cardinality::empty();
        if min == 0 {
            c |= Cardinality::ALLOWS_ZERO;
        }
        if min <= 1 && max >= 1 {
            c |= Cardinality::ALLOWS_ONE;
        }
        if max >= 2 {
            c |= Cardinality::ALLOWS_MANY;
        }
        c
    }

    /// Occurrence indicator as written after a sequence type.
    pub fn occurrence_indicator(self) -> &'static str {
        if self.allows_many() {
            if self.allows_zero() { "*" } else { "+" }
        } else if self.allows_zero() {
            if self.allows_one() { "?" } else { "0" }
        } else {
            ""
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Cardinality::EMPTY => "empty",
            Cardinality::EXACTLY_ONE => "exactly one",
            Cardinality::ZERO_OR_ONE => "zero or one",
            Cardinality::ONE_OR_MORE => "one or more",
            Cardinality::ZERO_OR_MORE => "zero or more",
            _ => "more than one",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenation_and_mapping() {
        let one = Cardinality::EXACTLY_ONE;
        let opt = Cardinality::ZERO_OR_ONE;
        assert_eq!(one.sum(one), Cardinality::ALLOWS_MANY);
        assert_eq!(opt.sum(opt), Cardinality::ZERO_OR_MORE);
        assert_eq!(Cardinality::EMPTY.sum(one), one);
        assert_eq!(one.multiply(opt), opt);
        assert_eq!(Cardinality::ONE_OR_MORE.multiply(one), Cardinality::ONE_OR_MORE);
        assert_eq!(Cardinality::EMPTY.multiply(Cardinality::ONE_OR_MORE), Cardinality::EMPTY);
    }

    #[test]
    fn subsumption() {
        assert!(Cardinality::ZERO_OR_MORE.subsumes(Cardinality::ONE_OR_MORE));
        assert!(!Cardinality::ZERO_OR_ONE.subsumes(Cardinality::ONE_OR_MORE));
        assert_eq!(Cardinality::ZERO_OR_ONE.occurrence_indicator(), "?");
    }

    #[test]
    fn either_branch() {
        assert_eq!(Cardinality::EMPTY.union(Cardinality::EXACTLY_ONE), Cardinality::ZERO_OR_ONE);
        assert_eq!(Cardinality::ONE_OR_MORE.union(Cardinality::EMPTY), Cardinality::ZERO_OR_MORE);
    }
}
