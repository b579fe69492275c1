//! Arithmetic dispatch.
//!
//! A [`Calculator`] is resolved from `(operator, left primitive type, right primitive type)`.
//! When a static type is abstract (`xs:anyAtomicType`, `xs:numeric`) the compiler keeps a
//! dynamic calculator that resolves again against the actual operand values.

use core::fmt;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::engine::casting::cast_atomic;
use crate::engine::numeric::{NumKind, classify, unify_numeric};
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::{AtomicType, ItemType, type_hierarchy};
use crate::xdm::XdmAtomicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Plus,
    Minus,
    Times,
    Div,
    IDiv,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Plus => "+",
            ArithOp::Minus => "-",
            ArithOp::Times => "*",
            ArithOp::Div => "div",
            ArithOp::IDiv => "idiv",
            ArithOp::Mod => "mod",
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalculatorKind {
    Numeric,
    /// `yearMonthDuration ± yearMonthDuration`, `dayTimeDuration ± dayTimeDuration`
    DurationPair,
    DurationByNumber,
    NumberByDuration,
    /// Duration divided by a duration of the same family; the result is a decimal.
    DurationRatio,
    /// `date/dateTime/time ± duration`
    TemporalShift,
    /// `duration + date/dateTime/time`
    DurationShiftsTemporal,
    /// `date/dateTime/time - same type`
    TemporalDifference,
    /// Resolved against the operand values on each evaluation.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Calculator {
    pub op: ArithOp,
    pub kind: CalculatorKind,
    /// Static type of the result.
    pub result: AtomicType,
}

fn numeric_rank(t: AtomicType) -> Option<u8> {
    match t {
        AtomicType::Integer => Some(0),
        AtomicType::Decimal => Some(1),
        AtomicType::Float => Some(2),
        AtomicType::Double => Some(3),
        _ => None,
    }
}

fn resolve_concrete(op: ArithOp, left: AtomicType, right: AtomicType) -> Option<(CalculatorKind, AtomicType)> {
    use AtomicType as T;
    use ArithOp::*;
    use CalculatorKind as K;
    if let (Some(l), Some(r)) = (numeric_rank(left), numeric_rank(right)) {
        let wider = if l >= r { left } else { right };
        let result = match op {
            IDiv => T::Integer,
            Div if wider == T::Integer => T::Decimal,
            _ => wider,
        };
        return Some((K::Numeric, result));
    }
    let ym_or_dt = |t: AtomicType| matches!(t, T::YearMonthDuration | T::DayTimeDuration);
    match (left, right, op) {
        (l, r, Plus | Minus) if l == r && ym_or_dt(l) => Some((K::DurationPair, l)),
        (l, r, Div) if l == r && ym_or_dt(l) => Some((K::DurationRatio, T::Decimal)),
        (l, r, Times | Div) if ym_or_dt(l) && r.is_numeric() => Some((K::DurationByNumber, l)),
        (l, r, Times) if l.is_numeric() && ym_or_dt(r) => Some((K::NumberByDuration, r)),
        (T::DateTime | T::Date, r, Plus | Minus) if ym_or_dt(r) => Some((K::TemporalShift, left)),
        (T::Time, T::DayTimeDuration, Plus | Minus) => Some((K::TemporalShift, T::Time)),
        (l, T::DateTime | T::Date, Plus) if ym_or_dt(l) => Some((K::DurationShiftsTemporal, right)),
        (T::DayTimeDuration, T::Time, Plus) => Some((K::DurationShiftsTemporal, T::Time)),
        (l, r, Minus) if l == r && matches!(l, T::DateTime | T::Date | T::Time) => {
            Some((K::TemporalDifference, T::DayTimeDuration))
        }
        _ => None,
    }
}

fn concrete_subtypes(t: AtomicType) -> Vec<AtomicType> {
    // untyped operands are converted to xs:double before dispatch
    let t = if t == AtomicType::UntypedAtomic { AtomicType::Double } else { t };
    if !t.is_abstract() {
        return vec![t];
    }
    let th = type_hierarchy();
    AtomicType::ALL
        .into_iter()
        .filter(|c| !c.is_abstract() && *c != AtomicType::UntypedAtomic && th.is_atomic_subtype(*c, t))
        .collect()
}

impl Calculator {
    /// Resolves the calculator for two primitive operand types.
    ///
    /// Returns `None` when no combination of values of these types supports the operator.
    /// With `must_resolve` unset, abstract operand types yield a [`CalculatorKind::Dynamic`]
    /// calculator; with it set they yield `None`.
    pub fn resolve(op: ArithOp, left: AtomicType, right: AtomicType, must_resolve: bool) -> Option<Calculator> {
        let untyped = |t: AtomicType| t == AtomicType::UntypedAtomic;
        if !left.is_abstract() && !right.is_abstract() && !untyped(left) && !untyped(right) {
            return resolve_concrete(op, left, right).map(|(kind, result)| Calculator { op, kind, result });
        }
        if must_resolve {
            return None;
        }
        let th = type_hierarchy();
        let mut result: Option<ItemType> = None;
        for l in concrete_subtypes(left) {
            for r in concrete_subtypes(right) {
                if let Some((_, t)) = resolve_concrete(op, l, r) {
                    let t = ItemType::Atomic(t);
                    result = Some(match result {
                        None => t,
                        Some(acc) => th.common_supertype(&acc, &t),
                    });
                }
            }
        }
        let result = result?.atomic().unwrap_or(AtomicType::AnyAtomic);
        Some(Calculator { op, kind: CalculatorKind::Dynamic, result })
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == CalculatorKind::Dynamic
    }

    /// Applies the operator. `implicit_timezone` is `None` while folding at compile time;
    /// operations that need it then fail with a deferred error.
    pub fn compute(
        &self,
        a: &XdmAtomicValue,
        b: &XdmAtomicValue,
        implicit_timezone: Option<FixedOffset>,
    ) -> Result<XdmAtomicValue, Error> {
        use CalculatorKind as K;
        match self.kind {
            K::Dynamic => {
                let a = untyped_to_double(a)?;
                let b = untyped_to_double(b)?;
                let concrete =
                    Calculator::resolve(self.op, a.atomic_type(), b.atomic_type(), true).ok_or_else(|| {
                        Error::dynamic(
                            ErrorCode::XPTY0004,
                            format!(
                                "operator '{}' is not defined for {} and {}",
                                self.op,
                                a.atomic_type(),
                                b.atomic_type()
                            ),
                        )
                    })?;
                concrete.compute(&a, &b, implicit_timezone)
            }
            K::Numeric => numeric(self.op, a, b),
            K::DurationPair => duration_pair(self.op, a, b),
            K::DurationRatio => duration_ratio(a, b),
            K::DurationByNumber => scale_duration(self.op, a, b),
            K::NumberByDuration => scale_duration(ArithOp::Times, b, a),
            K::TemporalShift => shift_temporal(a, b, self.op == ArithOp::Minus),
            K::DurationShiftsTemporal => shift_temporal(b, a, false),
            K::TemporalDifference => {
                let (x, y) = temporal_instants(a, b, implicit_timezone)?;
                Ok(XdmAtomicValue::DayTimeDuration((x - y).num_milliseconds()))
            }
        }
    }
}

fn untyped_to_double(v: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    if v.is_untyped() { cast_atomic(v, AtomicType::Double) } else { Ok(v.clone()) }
}

fn div_by_zero() -> Error {
    Error::dynamic(ErrorCode::FOAR0001, "division by zero")
}

fn overflow(what: &str) -> Error {
    Error::dynamic(ErrorCode::FOAR0002, format!("numeric overflow in {what}"))
}

fn numeric(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    let (Some(x), Some(y)) = (classify(a), classify(b)) else {
        return Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("operator '{op}' expects numeric operands, got {} and {}", a.atomic_type(), b.atomic_type()),
        ));
    };
    let result = match unify_numeric(x, y) {
        (NumKind::Int(x), NumKind::Int(y)) => integer_op(op, x, y)?,
        (NumKind::Dec(x), NumKind::Dec(y)) => decimal_op(op, x, y)?,
        #[allow(clippy::cast_possible_truncation)]
        (NumKind::Float(x), NumKind::Float(y)) => match float_op(op, f64::from(x), f64::from(y))? {
            NumKind::Double(d) => NumKind::Float(d as f32),
            other => other,
        },
        (x, y) => float_op(op, x.to_f64(), y.to_f64())?,
    };
    Ok(result.into_value())
}

fn integer_op(op: ArithOp, x: i64, y: i64) -> Result<NumKind, Error> {
    let checked = |r: Option<i64>| r.map(NumKind::Int).ok_or_else(|| overflow("xs:integer arithmetic"));
    match op {
        ArithOp::Plus => checked(x.checked_add(y)),
        ArithOp::Minus => checked(x.checked_sub(y)),
        ArithOp::Times => checked(x.checked_mul(y)),
        ArithOp::Div => decimal_op(op, Decimal::from(x), Decimal::from(y)),
        ArithOp::IDiv | ArithOp::Mod if y == 0 => Err(div_by_zero()),
        ArithOp::IDiv => checked(x.checked_div(y)),
        ArithOp::Mod => checked(x.checked_rem(y)),
    }
}

fn decimal_op(op: ArithOp, x: Decimal, y: Decimal) -> Result<NumKind, Error> {
    let checked = |r: Option<Decimal>| r.map(NumKind::Dec).ok_or_else(|| overflow("xs:decimal arithmetic"));
    match op {
        ArithOp::Plus => checked(x.checked_add(y)),
        ArithOp::Minus => checked(x.checked_sub(y)),
        ArithOp::Times => checked(x.checked_mul(y)),
        ArithOp::Div | ArithOp::IDiv | ArithOp::Mod if y.is_zero() => Err(div_by_zero()),
        ArithOp::Div => checked(x.checked_div(y)),
        ArithOp::IDiv => x
            .checked_div(y)
            .and_then(|q| q.trunc().to_i64())
            .map(NumKind::Int)
            .ok_or_else(|| overflow("idiv")),
        ArithOp::Mod => checked(x.checked_rem(y)),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_op(op: ArithOp, x: f64, y: f64) -> Result<NumKind, Error> {
    Ok(NumKind::Double(match op {
        ArithOp::Plus => x + y,
        ArithOp::Minus => x - y,
        ArithOp::Times => x * y,
        ArithOp::Div => x / y,
        ArithOp::Mod => x % y,
        ArithOp::IDiv => {
            if y == 0.0 {
                return Err(div_by_zero());
            }
            let q = (x / y).trunc();
            if !q.is_finite() || q.abs() >= 9.2e18 {
                return Err(overflow("idiv"));
            }
            return Ok(NumKind::Int(q as i64));
        }
    }))
}

fn duration_pair(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let sign = if op == ArithOp::Minus { -1 } else { 1 };
    let overflow = || Error::dynamic(ErrorCode::FODT0002, "duration overflow");
    match (a, b) {
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => y
            .checked_mul(sign)
            .and_then(|y| x.checked_add(y))
            .map(V::YearMonthDuration)
            .ok_or_else(overflow),
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => y
            .checked_mul(i64::from(sign))
            .and_then(|y| x.checked_add(y))
            .map(V::DayTimeDuration)
            .ok_or_else(overflow),
        _ => Err(mismatch(op, a, b)),
    }
}

fn duration_ratio(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let (x, y) = match (a, b) {
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => (Decimal::from(*x), Decimal::from(*y)),
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => (Decimal::from(*x), Decimal::from(*y)),
        _ => return Err(mismatch(ArithOp::Div, a, b)),
    };
    if y.is_zero() {
        return Err(div_by_zero());
    }
    x.checked_div(y).map(V::Decimal).ok_or_else(|| overflow("duration division"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scale_duration(op: ArithOp, duration: &XdmAtomicValue, factor: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let f = classify(factor).map(NumKind::to_f64).ok_or_else(|| mismatch(op, duration, factor))?;
    if f.is_nan() {
        return Err(Error::dynamic(ErrorCode::FOCA0005, "NaN supplied as duration factor"));
    }
    if op == ArithOp::Div && f == 0.0 {
        return Err(Error::dynamic(ErrorCode::FODT0002, "duration divided by zero"));
    }
    let scale = |units: f64| -> Result<f64, Error> {
        let r = if op == ArithOp::Div { units / f } else { units * f };
        if !r.is_finite() || r.abs() >= 9.2e18 {
            return Err(Error::dynamic(ErrorCode::FODT0002, "duration overflow"));
        }
        Ok((r + 0.5).floor())
    };
    match duration {
        V::YearMonthDuration(m) => {
            let r = scale(f64::from(*m))?;
            if r.abs() > f64::from(i32::MAX) {
                return Err(Error::dynamic(ErrorCode::FODT0002, "duration overflow"));
            }
            Ok(V::YearMonthDuration(r as i32))
        }
        V::DayTimeDuration(ms) => Ok(V::DayTimeDuration(scale(*ms as f64)? as i64)),
        _ => Err(mismatch(op, duration, factor)),
    }
}

fn mismatch(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Error {
    Error::dynamic(
        ErrorCode::XPTY0004,
        format!("operator '{op}' is not defined for {} and {}", a.atomic_type(), b.atomic_type()),
    )
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (ny, nm) = if month == 12 { (year.checked_add(1)?, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt().map(|d| d.day())
}

/// Adds months, clamping the day to the end of the target month.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn add_months(date: NaiveDate, delta: i32) -> Option<NaiveDate> {
    let total = date.year().checked_mul(12)?.checked_add(date.month0() as i32)?.checked_add(delta)?;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(last_day_of_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

fn shift_temporal(temporal: &XdmAtomicValue, duration: &XdmAtomicValue, negate: bool) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let (months, millis) = match duration {
        V::YearMonthDuration(m) => (*m, 0),
        V::DayTimeDuration(ms) => (0, *ms),
        _ => return Err(mismatch(ArithOp::Plus, temporal, duration)),
    };
    let (months, millis) = if negate { (-months, -millis) } else { (months, millis) };
    let out_of_range = || Error::dynamic(ErrorCode::FODT0001, "date/time value out of range");
    let delta = TimeDelta::try_milliseconds(millis).ok_or_else(out_of_range)?;
    match temporal {
        V::DateTime(dt, tz) => {
            let date = add_months(dt.date(), months).ok_or_else(out_of_range)?;
            let shifted = date.and_time(dt.time()).checked_add_signed(delta).ok_or_else(out_of_range)?;
            Ok(V::DateTime(shifted, *tz))
        }
        V::Date(d, tz) => {
            let date = add_months(*d, months).ok_or_else(out_of_range)?;
            let shifted = date.and_time(NaiveTime::MIN).checked_add_signed(delta).ok_or_else(out_of_range)?;
            Ok(V::Date(shifted.date(), *tz))
        }
        V::Time(t, tz) if months == 0 => Ok(V::Time(t.overflowing_add_signed(delta).0, *tz)),
        _ => Err(mismatch(ArithOp::Plus, temporal, duration)),
    }
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1972, 12, 31).unwrap_or_default()
}

fn local_parts(v: &XdmAtomicValue) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    match v {
        XdmAtomicValue::DateTime(dt, tz) => Some((*dt, *tz)),
        XdmAtomicValue::Date(d, tz) => Some((d.and_time(NaiveTime::MIN), *tz)),
        XdmAtomicValue::Time(t, tz) => Some((reference_date().and_time(*t), *tz)),
        _ => None,
    }
}

/// Normalizes two temporal values of the same kind to UTC instants.
///
/// A value without timezone takes the implicit timezone, which is only needed when
/// exactly one side carries a timezone.
pub(crate) fn temporal_instants(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    implicit_timezone: Option<FixedOffset>,
) -> Result<(NaiveDateTime, NaiveDateTime), Error> {
    let (Some((x, tx)), Some((y, ty))) = (local_parts(a), local_parts(b)) else {
        return Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("{} and {} are not comparable date/time values", a.atomic_type(), b.atomic_type()),
        ));
    };
    if tx.is_none() && ty.is_none() {
        return Ok((x, y));
    }
    let implicit = || implicit_timezone.ok_or_else(|| Error::deferred("implicit timezone"));
    let ox = match tx {
        Some(o) => o,
        None => implicit()?,
    };
    let oy = match ty {
        Some(o) => o,
        None => implicit()?,
    };
    let to_utc = |t: NaiveDateTime, o: FixedOffset| t - TimeDelta::seconds(i64::from(o.local_minus_utc()));
    Ok((to_utc(x, ox), to_utc(y, oy)))
}

/// Unary minus. Untyped operands are read as `xs:double`.
pub fn negate(v: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    match untyped_to_double(v)? {
        V::Integer(i) => i.checked_neg().map(V::Integer).ok_or_else(|| overflow("negation")),
        V::Decimal(d) => Ok(V::Decimal(-d)),
        V::Float(f) => Ok(V::Float(-f)),
        V::Double(d) => Ok(V::Double(-d)),
        other => Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("unary minus is not defined for {}", other.atomic_type()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use XdmAtomicValue as V;

    fn calc(op: ArithOp, a: AtomicType, b: AtomicType) -> Calculator {
        Calculator::resolve(op, a, b, false).unwrap()
    }

    #[test]
    fn numeric_result_types() {
        assert_eq!(calc(ArithOp::Div, AtomicType::Integer, AtomicType::Integer).result, AtomicType::Decimal);
        assert_eq!(calc(ArithOp::Plus, AtomicType::Integer, AtomicType::Float).result, AtomicType::Float);
        assert_eq!(calc(ArithOp::IDiv, AtomicType::Double, AtomicType::Double).result, AtomicType::Integer);
    }

    #[test]
    fn abstract_operands_resolve_dynamically() {
        let c = calc(ArithOp::Plus, AtomicType::Numeric, AtomicType::Integer);
        assert!(c.is_dynamic());
        assert_eq!(c.result, AtomicType::Numeric);
        assert!(Calculator::resolve(ArithOp::Plus, AtomicType::Numeric, AtomicType::Integer, true).is_none());
        assert!(Calculator::resolve(ArithOp::Plus, AtomicType::Boolean, AtomicType::Integer, false).is_none());
        assert!(Calculator::resolve(ArithOp::Times, AtomicType::Date, AtomicType::Numeric, false).is_none());
    }

    #[test]
    fn integer_division_and_errors() {
        let c = calc(ArithOp::Div, AtomicType::Integer, AtomicType::Integer);
        assert_eq!(c.compute(&V::Integer(7), &V::Integer(2), None).unwrap(), V::Decimal(Decimal::new(35, 1)));
        assert_eq!(c.compute(&V::Integer(1), &V::Integer(0), None).unwrap_err().code, ErrorCode::FOAR0001);
        let m = calc(ArithOp::Mod, AtomicType::Integer, AtomicType::Integer);
        assert_eq!(m.compute(&V::Integer(-7), &V::Integer(2), None).unwrap(), V::Integer(-1));
        let d = calc(ArithOp::Div, AtomicType::Double, AtomicType::Integer);
        assert_eq!(d.compute(&V::Double(1.0), &V::Integer(0), None).unwrap(), V::Double(f64::INFINITY));
    }

    #[test]
    fn dynamic_calculator_converts_untyped() {
        let c = calc(ArithOp::Plus, AtomicType::AnyAtomic, AtomicType::AnyAtomic);
        let r = c.compute(&V::Integer(3), &V::UntypedAtomic("2".into()), None).unwrap();
        assert_eq!(r, V::Double(5.0));
    }

    #[test]
    fn month_arithmetic_clamps_day() {
        let c = calc(ArithOp::Plus, AtomicType::Date, AtomicType::YearMonthDuration);
        let jan31 = V::Date(NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(), None);
        let r = c.compute(&jan31, &V::YearMonthDuration(1), None).unwrap();
        assert_eq!(r, V::Date(NaiveDate::from_ymd_opt(2023, 2, 28).unwrap(), None));
    }

    #[test]
    fn difference_needs_timezone_only_when_mixed() {
        let c = calc(ArithOp::Minus, AtomicType::DateTime, AtomicType::DateTime);
        let t = |h| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(h, 0, 0).unwrap();
        let r = c.compute(&V::DateTime(t(12), None), &V::DateTime(t(10), None), None).unwrap();
        assert_eq!(r, V::DayTimeDuration(7_200_000));
        let utc = FixedOffset::east_opt(0);
        let err = c.compute(&V::DateTime(t(12), utc), &V::DateTime(t(10), None), None).unwrap_err();
        assert!(err.is_deferred());
        let r = c.compute(&V::DateTime(t(12), utc), &V::DateTime(t(10), None), utc).unwrap();
        assert_eq!(r, V::DayTimeDuration(7_200_000));
    }
}
