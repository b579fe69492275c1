//! Numeric classification, promotion and rounding helpers shared by calculators,
//! comparers and the numeric system functions.

use core::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::XdmAtomicValue;

/// A numeric value tagged with its primitive type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum NumKind {
    Int(i64),
    Dec(Decimal),
    Float(f32),
    Double(f64),
}

impl NumKind {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn to_f64(self) -> f64 {
        match self {
            NumKind::Int(i) => i as f64,
            NumKind::Dec(d) => d.to_f64().unwrap_or(f64::NAN),
            NumKind::Float(f) => f64::from(f),
            NumKind::Double(d) => d,
        }
    }

    pub(crate) fn into_value(self) -> XdmAtomicValue {
        match self {
            NumKind::Int(i) => XdmAtomicValue::Integer(i),
            NumKind::Dec(d) => XdmAtomicValue::Decimal(d),
            NumKind::Float(f) => XdmAtomicValue::Float(f),
            NumKind::Double(d) => XdmAtomicValue::Double(d),
        }
    }
}

pub(crate) fn classify(v: &XdmAtomicValue) -> Option<NumKind> {
    match v {
        XdmAtomicValue::Integer(i) => Some(NumKind::Int(*i)),
        XdmAtomicValue::Decimal(d) => Some(NumKind::Dec(*d)),
        XdmAtomicValue::Float(f) => Some(NumKind::Float(*f)),
        XdmAtomicValue::Double(d) => Some(NumKind::Double(*d)),
        _ => None,
    }
}

/// Promotes two numerics to their common type: integer < decimal < float < double.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn unify_numeric(a: NumKind, b: NumKind) -> (NumKind, NumKind) {
    use NumKind::*;
    match (a, b) {
        (Double(_), _) | (_, Double(_)) => (Double(a.to_f64()), Double(b.to_f64())),
        (Float(x), Float(y)) => (Float(x), Float(y)),
        (Float(_), _) | (_, Float(_)) => {
            (Float(a.to_f64() as f32), Float(b.to_f64() as f32))
        }
        (Int(x), Int(y)) => (Int(x), Int(y)),
        (Int(x), Dec(y)) => (Dec(Decimal::from(x)), Dec(y)),
        (Dec(x), Int(y)) => (Dec(x), Dec(Decimal::from(y))),
        (Dec(x), Dec(y)) => (Dec(x), Dec(y)),
    }
}

/// Value ordering of two numerics; `None` when either side is NaN.
pub(crate) fn compare_numeric(a: NumKind, b: NumKind) -> Option<Ordering> {
    match unify_numeric(a, b) {
        (NumKind::Int(x), NumKind::Int(y)) => Some(x.cmp(&y)),
        (NumKind::Dec(x), NumKind::Dec(y)) => Some(x.cmp(&y)),
        (NumKind::Float(x), NumKind::Float(y)) => x.partial_cmp(&y),
        (x, y) => x.to_f64().partial_cmp(&y.to_f64()),
    }
}

/// `fn:number` semantics: never fails, returns NaN for anything without a numeric reading.
pub(crate) fn number(v: &XdmAtomicValue) -> f64 {
    match v {
        XdmAtomicValue::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => {
            parse_double(s).unwrap_or(f64::NAN)
        }
        other => classify(other).map_or(f64::NAN, NumKind::to_f64),
    }
}

/// Parses the `xs:double` lexical space (`INF`, `-INF`, `NaN`, decimal and scientific forms).
pub(crate) fn parse_double(s: &str) -> Option<f64> {
    let t = s.trim();
    match t {
        "INF" | "+INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let valid = !t.is_empty()
        && t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && t.chars().any(|c| c.is_ascii_digit());
    if !valid {
        return None;
    }
    t.parse::<f64>().ok()
}

pub(crate) fn is_whole(d: f64) -> bool {
    d.is_finite() && d.fract() == 0.0
}

/// Converts a numeric value to an integer position when it denotes one exactly.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn as_whole_i64(v: &XdmAtomicValue) -> Option<i64> {
    match classify(v)? {
        NumKind::Int(i) => Some(i),
        NumKind::Dec(d) => (d.fract().is_zero()).then(|| d.to_i64()).flatten(),
        k => {
            let f = k.to_f64();
            (is_whole(f) && f.abs() < 9.0e15).then_some(f as i64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rounding {
    Floor,
    Ceiling,
    /// Half rounds towards positive infinity.
    Round,
}

/// `fn:floor`, `fn:ceiling` and `fn:round`; the result keeps the operand's numeric type.
pub(crate) fn round_value(v: &XdmAtomicValue, mode: Rounding) -> Result<XdmAtomicValue, Error> {
    let k = classify(v).ok_or_else(|| {
        Error::dynamic(ErrorCode::XPTY0004, format!("{} is not numeric", v.atomic_type()))
    })?;
    Ok(match k {
        NumKind::Int(i) => XdmAtomicValue::Integer(i),
        NumKind::Dec(d) => XdmAtomicValue::Decimal(match mode {
            Rounding::Floor => d.floor(),
            Rounding::Ceiling => d.ceil(),
            Rounding::Round => (d + Decimal::new(5, 1)).floor(),
        }),
        NumKind::Float(f) => XdmAtomicValue::Float(round_f64(f64::from(f), mode) as f32),
        NumKind::Double(d) => XdmAtomicValue::Double(round_f64(d, mode)),
    })
}

fn round_f64(d: f64, mode: Rounding) -> f64 {
    if !d.is_finite() {
        return d;
    }
    match mode {
        Rounding::Floor => d.floor(),
        Rounding::Ceiling => d.ceil(),
        Rounding::Round => {
            let r = (d + 0.5).floor();
            // keep the sign of negative zero results (round(-0.4) is -0)
            if r == 0.0 && d < 0.0 { -0.0 } else { r }
        }
    }
}

pub(crate) fn abs_value(v: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    Ok(match classify(v) {
        Some(NumKind::Int(i)) => XdmAtomicValue::Integer(i.checked_abs().ok_or_else(|| {
            Error::dynamic(ErrorCode::FOAR0002, "integer overflow in abs")
        })?),
        Some(NumKind::Dec(d)) => XdmAtomicValue::Decimal(d.abs()),
        Some(NumKind::Float(f)) => XdmAtomicValue::Float(f.abs()),
        Some(NumKind::Double(d)) => XdmAtomicValue::Double(d.abs()),
        None => {
            return Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("{} is not numeric", v.atomic_type()),
            ));
        }
    })
}

pub(crate) fn decimal_from_f64(d: f64) -> Result<Decimal, Error> {
    Decimal::from_f64(d).ok_or_else(|| {
        Error::dynamic(ErrorCode::FOCA0002, format!("cannot represent {d} as xs:decimal"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_ladder() {
        let (a, b) = unify_numeric(NumKind::Int(2), NumKind::Dec(Decimal::new(25, 1)));
        assert_eq!(a, NumKind::Dec(Decimal::from(2)));
        assert_eq!(b, NumKind::Dec(Decimal::new(25, 1)));
        let (a, _) = unify_numeric(NumKind::Int(2), NumKind::Double(0.5));
        assert_eq!(a, NumKind::Double(2.0));
    }

    #[test]
    fn nan_is_unordered() {
        assert_eq!(compare_numeric(NumKind::Double(f64::NAN), NumKind::Int(1)), None);
        assert_eq!(compare_numeric(NumKind::Int(3), NumKind::Float(2.5)), Some(Ordering::Greater));
    }

    #[test]
    fn number_never_fails() {
        assert!(number(&XdmAtomicValue::String("abc".into())).is_nan());
        assert_eq!(number(&XdmAtomicValue::UntypedAtomic(" 12 ".into())), 12.0);
        assert_eq!(number(&XdmAtomicValue::Boolean(true)), 1.0);
    }

    #[test]
    fn rounding_keeps_type() {
        let r = round_value(&XdmAtomicValue::Double(2.5), Rounding::Round).unwrap();
        assert_eq!(r, XdmAtomicValue::Double(3.0));
        let r = round_value(&XdmAtomicValue::Double(-2.5), Rounding::Round).unwrap();
        assert_eq!(r, XdmAtomicValue::Double(-2.0));
        let f = round_value(&XdmAtomicValue::Decimal(Decimal::new(-15, 1)), Rounding::Floor).unwrap();
        assert_eq!(f, XdmAtomicValue::Decimal(Decimal::from(-2)));
    }
}
