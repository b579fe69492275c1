use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::engine::numeric::{NumKind, classify, decimal_from_f64, parse_double};
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::AtomicType;
use crate::xdm::XdmAtomicValue;

fn invalid(target: AtomicType, lexical: &str) -> Error {
    Error::dynamic(ErrorCode::FORG0001, format!("cannot cast '{lexical}' to {target}"))
}

fn not_castable(from: AtomicType, to: AtomicType) -> Error {
    Error::dynamic(ErrorCode::XPTY0004, format!("casting from {from} to {to} is not allowed"))
}

/// Whether any value of `from` could possibly be cast to `to`.
pub fn cast_possible(from: AtomicType, to: AtomicType) -> bool {
    use AtomicType::*;
    if from == to || from.is_abstract() {
        return true;
    }
    match to {
        AnyAtomic | Numeric => false,
        String | UntypedAtomic => true,
        QName => false,
        _ if matches!(from, String | UntypedAtomic) => true,
        AnyUri => false,
        Boolean => from.is_numeric(),
        Integer | Decimal | Float | Double => from.is_numeric() || from == Boolean,
        Duration | YearMonthDuration | DayTimeDuration => from.is_duration(),
        DateTime => matches!(from, Date),
        Date | Time => matches!(from, DateTime),
    }
}

/// Casts an atomic value to the given target type.
pub fn cast_atomic(value: &XdmAtomicValue, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    use AtomicType as T;
    use XdmAtomicValue as V;
    let source = value.atomic_type();
    if source == target {
        return Ok(value.clone());
    }
    if target.is_abstract() {
        return Err(Error::from_code(
            ErrorCode::XPST0080,
            format!("cannot cast to abstract type {target}"),
        ));
    }
    match target {
        T::String => return Ok(V::String(value.lexical())),
        T::UntypedAtomic => return Ok(V::UntypedAtomic(value.lexical())),
        _ => {}
    }
    if let V::String(s) | V::UntypedAtomic(s) = value {
        return cast_from_lexical(s, target);
    }
    if !cast_possible(source, target) {
        return Err(not_castable(source, target));
    }
    match target {
        T::Boolean => {
            let n = classify(value).ok_or_else(|| not_castable(source, target))?;
            Ok(V::Boolean(match n {
                NumKind::Int(i) => i != 0,
                NumKind::Dec(d) => !d.is_zero(),
                k => {
                    let f = k.to_f64();
                    f != 0.0 && !f.is_nan()
                }
            }))
        }
        T::Integer | T::Decimal | T::Float | T::Double => numeric_cast(value, target),
        T::Duration | T::YearMonthDuration | T::DayTimeDuration => {
            let (months, millis) = match value {
                V::Duration { months, millis } => (*months, *millis),
                V::YearMonthDuration(m) => (*m, 0),
                V::DayTimeDuration(ms) => (0, *ms),
                _ => return Err(not_castable(source, target)),
            };
            Ok(match target {
                T::YearMonthDuration => V::YearMonthDuration(months),
                T::DayTimeDuration => V::DayTimeDuration(millis),
                _ => V::Duration { months, millis },
            })
        }
        T::DateTime => match value {
            V::Date(d, tz) => Ok(V::DateTime(d.and_time(NaiveTime::MIN), *tz)),
            _ => Err(not_castable(source, target)),
        },
        T::Date => match value {
            V::DateTime(dt, tz) => Ok(V::Date(dt.date(), *tz)),
            _ => Err(not_castable(source, target)),
        },
        T::Time => match value {
            V::DateTime(dt, tz) => Ok(V::Time(dt.time(), *tz)),
            _ => Err(not_castable(source, target)),
        },
        _ => Err(not_castable(source, target)),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn numeric_cast(value: &XdmAtomicValue, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let n = match value {
        V::Boolean(b) => NumKind::Int(i64::from(*b)),
        other => classify(other).ok_or_else(|| not_castable(other.atomic_type(), target))?,
    };
    Ok(match target {
        AtomicType::Double => V::Double(n.to_f64()),
        AtomicType::Float => V::Float(n.to_f64() as f32),
        AtomicType::Decimal => V::Decimal(match n {
            NumKind::Int(i) => Decimal::from(i),
            NumKind::Dec(d) => d,
            k => {
                let f = k.to_f64();
                if !f.is_finite() {
                    return Err(Error::dynamic(ErrorCode::FOCA0002, format!("cannot cast {f} to xs:decimal")));
                }
                decimal_from_f64(f)?
            }
        }),
        _ => V::Integer(match n {
            NumKind::Int(i) => i,
            NumKind::Dec(d) => d.trunc().to_i64().ok_or_else(|| {
                Error::dynamic(ErrorCode::FOCA0002, "decimal out of xs:integer range")
            })?,
            k => {
                let f = k.to_f64().trunc();
                if !f.is_finite() || f.abs() >= 9.2e18 {
                    return Err(Error::dynamic(ErrorCode::FOCA0002, format!("cannot cast {f} to xs:integer")));
                }
                f as i64
            }
        }),
    })
}

fn cast_from_lexical(raw: &str, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    use AtomicType as T;
    use XdmAtomicValue as V;
    let s = raw.trim();
    match target {
        T::AnyUri => Ok(V::AnyUri(s.to_string())),
        T::Boolean => match s {
            "true" | "1" => Ok(V::Boolean(true)),
            "false" | "0" => Ok(V::Boolean(false)),
            _ => Err(invalid(target, raw)),
        },
        T::Integer => parse_integer(s).map(V::Integer).ok_or_else(|| invalid(target, raw)),
        T::Decimal => parse_decimal(s).map(V::Decimal).ok_or_else(|| invalid(target, raw)),
        T::Double => parse_double(s).map(V::Double).ok_or_else(|| invalid(target, raw)),
        #[allow(clippy::cast_possible_truncation)]
        T::Float => parse_double(s).map(|d| V::Float(d as f32)).ok_or_else(|| invalid(target, raw)),
        T::Duration | T::YearMonthDuration | T::DayTimeDuration => {
            let (months, millis, has_ym, has_dt) = parse_duration(s).ok_or_else(|| invalid(target, raw))?;
            match target {
                T::YearMonthDuration if !has_dt => Ok(V::YearMonthDuration(months)),
                T::DayTimeDuration if !has_ym => Ok(V::DayTimeDuration(millis)),
                T::Duration => Ok(V::Duration { months, millis }),
                _ => Err(invalid(target, raw)),
            }
        }
        T::DateTime => {
            let (body, tz) = split_timezone(s).ok_or_else(|| invalid(target, raw))?;
            let (d, t) = body.split_once('T').ok_or_else(|| invalid(target, raw))?;
            let date = parse_date(d).ok_or_else(|| invalid(target, raw))?;
            let time = parse_time(t).ok_or_else(|| invalid(target, raw))?;
            Ok(V::DateTime(NaiveDateTime::new(date, time), tz))
        }
        T::Date => {
            let (body, tz) = split_timezone(s).ok_or_else(|| invalid(target, raw))?;
            Ok(V::Date(parse_date(body).ok_or_else(|| invalid(target, raw))?, tz))
        }
        T::Time => {
            let (body, tz) = split_timezone(s).ok_or_else(|| invalid(target, raw))?;
            Ok(V::Time(parse_time(body).ok_or_else(|| invalid(target, raw))?, tz))
        }
        T::QName => Err(not_castable(T::String, T::QName)),
        T::String | T::UntypedAtomic | T::AnyAtomic | T::Numeric => Err(invalid(target, raw)),
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.strip_prefix('+').unwrap_or(s).parse().ok()
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let ok = !body.is_empty()
        && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && body.bytes().filter(|b| *b == b'.').count() <= 1
        && body.bytes().any(|b| b.is_ascii_digit());
    if !ok {
        return None;
    }
    let normalized = s.strip_prefix('+').unwrap_or(s);
    let normalized = if normalized.ends_with('.') { &normalized[..normalized.len() - 1] } else { normalized };
    normalized.parse().ok()
}

/// Returns `(months, millis, has year/month part, has day/time part)`.
fn parse_duration(s: &str) -> Option<(i32, i64, bool, bool)> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let rest = rest.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => {
            if t.is_empty() {
                return None;
            }
            (d, Some(t))
        }
        None => (rest, None),
    };
    let mut months: i64 = 0;
    let mut millis: i64 = 0;
    let mut has_ym = false;
    let mut has_dt = false;
    let mut any = false;
    let mut num = String::new();
    for c in date_part.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }
        let n: i64 = num.parse().ok()?;
        num.clear();
        any = true;
        match c {
            'Y' => {
                months = months.checked_add(n.checked_mul(12)?)?;
                has_ym = true;
            }
            'M' => {
                months = months.checked_add(n)?;
                has_ym = true;
            }
            'D' => {
                millis = millis.checked_add(n.checked_mul(86_400_000)?)?;
                has_dt = true;
            }
            _ => return None,
        }
    }
    if !num.is_empty() {
        return None;
    }
    if let Some(t) = time_part {
        for c in t.chars() {
            if c.is_ascii_digit() || c == '.' {
                num.push(c);
                continue;
            }
            any = true;
            has_dt = true;
            match c {
                'H' => millis = millis.checked_add(num.parse::<i64>().ok()?.checked_mul(3_600_000)?)?,
                'M' => millis = millis.checked_add(num.parse::<i64>().ok()?.checked_mul(60_000)?)?,
                'S' => {
                    let secs: Decimal = num.parse().ok()?;
                    millis = millis.checked_add((secs * Decimal::from(1000)).trunc().to_i64()?)?;
                }
                _ => return None,
            }
            num.clear();
        }
        if !num.is_empty() {
            return None;
        }
    }
    if !any {
        return None;
    }
    let months = i32::try_from(months).ok()?;
    Some(if negative { (-months, -millis, has_ym, has_dt) } else { (months, millis, has_ym, has_dt) })
}

fn split_timezone(s: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(body) = s.strip_suffix('Z') {
        return Some((body, FixedOffset::east_opt(0)));
    }
    if s.len() > 6 {
        let (body, tail) = s.split_at(s.len() - 6);
        let bytes = tail.as_bytes();
        if (bytes[0] == b'+' || bytes[0] == b'-') && bytes[3] == b':' {
            let h: i32 = tail[1..3].parse().ok()?;
            let m: i32 = tail[4..6].parse().ok()?;
            if h > 14 || m > 59 {
                return None;
            }
            let secs = (h * 3600 + m * 60) * if bytes[0] == b'-' { -1 } else { 1 };
            return Some((body, Some(FixedOffset::east_opt(secs)?)));
        }
    }
    Some((s, None))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    if s == "24:00:00" {
        return Some(NaiveTime::MIN);
    }
    let t = NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok()?;
    // millisecond precision
    t.with_nanosecond(t.nanosecond() / 1_000_000 * 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_round_trip_for_temporal() {
        let v = cast_atomic(&XdmAtomicValue::String("2024-02-29T10:15:00.5+02:00".into()), AtomicType::DateTime)
            .unwrap();
        assert_eq!(v.lexical(), "2024-02-29T10:15:00.5+02:00");
        let d = cast_atomic(&v, AtomicType::Date).unwrap();
        assert_eq!(d.lexical(), "2024-02-29+02:00");
    }

    #[test]
    fn durations() {
        let v = cast_atomic(&XdmAtomicValue::UntypedAtomic("P1DT2H".into()), AtomicType::DayTimeDuration).unwrap();
        assert_eq!(v, XdmAtomicValue::DayTimeDuration(93_600_000));
        let err = cast_atomic(&XdmAtomicValue::String("P1Y".into()), AtomicType::DayTimeDuration).unwrap_err();
        assert_eq!(err.code, ErrorCode::FORG0001);
    }

    #[test]
    fn numeric_edges() {
        assert_eq!(
            cast_atomic(&XdmAtomicValue::Double(-2.7), AtomicType::Integer).unwrap(),
            XdmAtomicValue::Integer(-2)
        );
        assert_eq!(
            cast_atomic(&XdmAtomicValue::Double(f64::NAN), AtomicType::Integer).unwrap_err().code,
            ErrorCode::FOCA0002
        );
        assert_eq!(
            cast_atomic(&XdmAtomicValue::String("12x".into()), AtomicType::Integer).unwrap_err().code,
            ErrorCode::FORG0001
        );
        assert!(!cast_possible(AtomicType::Boolean, AtomicType::Date));
    }
}
