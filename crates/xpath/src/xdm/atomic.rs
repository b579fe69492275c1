use core::fmt;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;

use crate::types::AtomicType;

/// Atomic values of the supported XDM subset.
///
/// Durations keep their day/time component in milliseconds. Temporal values keep an
/// optional timezone; a missing timezone is resolved against the implicit timezone of
/// the dynamic context when two values are compared or subtracted.
#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Integer(i64),
    Decimal(Decimal),
    Float(f32),
    Double(f64),
    QName {
        ns_uri: Option<String>,
        prefix: Option<String>,
        local: String,
    },
    Duration {
        months: i32,
        millis: i64,
    },
    YearMonthDuration(i32),
    DayTimeDuration(i64),
    DateTime(NaiveDateTime, Option<FixedOffset>),
    Date(NaiveDate, Option<FixedOffset>),
    Time(NaiveTime, Option<FixedOffset>),
}

impl XdmAtomicValue {
    pub fn atomic_type(&self) -> AtomicType {
        match self {
            XdmAtomicValue::Boolean(_) => AtomicType::Boolean,
            XdmAtomicValue::String(_) => AtomicType::String,
            XdmAtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            XdmAtomicValue::AnyUri(_) => AtomicType::AnyUri,
            XdmAtomicValue::Integer(_) => AtomicType::Integer,
            XdmAtomicValue::Decimal(_) => AtomicType::Decimal,
            XdmAtomicValue::Float(_) => AtomicType::Float,
            XdmAtomicValue::Double(_) => AtomicType::Double,
            XdmAtomicValue::QName { .. } => AtomicType::QName,
            XdmAtomicValue::Duration { .. } => AtomicType::Duration,
            XdmAtomicValue::YearMonthDuration(_) => AtomicType::YearMonthDuration,
            XdmAtomicValue::DayTimeDuration(_) => AtomicType::DayTimeDuration,
            XdmAtomicValue::DateTime(..) => AtomicType::DateTime,
            XdmAtomicValue::Date(..) => AtomicType::Date,
            XdmAtomicValue::Time(..) => AtomicType::Time,
        }
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, XdmAtomicValue::UntypedAtomic(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            XdmAtomicValue::Integer(_)
                | XdmAtomicValue::Decimal(_)
                | XdmAtomicValue::Float(_)
                | XdmAtomicValue::Double(_)
        )
    }

    pub fn is_nan(&self) -> bool {
        match self {
            XdmAtomicValue::Double(d) => d.is_nan(),
            XdmAtomicValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Value identity including the type annotation. Unlike `==`, NaN is identical to
    /// itself and `Integer(3)` differs from `UntypedAtomic("3")`.
    pub fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (XdmAtomicValue::Double(a), XdmAtomicValue::Double(b)) => a.to_bits() == b.to_bits(),
            (XdmAtomicValue::Float(a), XdmAtomicValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Canonical lexical form (the result of casting to `xs:string`).
    pub fn lexical(&self) -> String {
        match self {
            XdmAtomicValue::Boolean(b) => b.to_string(),
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => {
                s.clone()
            }
            XdmAtomicValue::Integer(i) => i.to_string(),
            XdmAtomicValue::Decimal(d) => format_decimal(*d),
            XdmAtomicValue::Float(f) => format_double(f64::from(*f)),
            XdmAtomicValue::Double(d) => format_double(*d),
            XdmAtomicValue::QName { prefix, local, .. } => match prefix {
                Some(p) if !p.is_empty() => format!("{p}:{local}"),
                _ => local.clone(),
            },
            XdmAtomicValue::Duration { months, millis } => format_duration(*months, *millis),
            XdmAtomicValue::YearMonthDuration(m) => {
                if *m == 0 {
                    "P0M".to_string()
                } else {
                    format_duration(*m, 0)
                }
            }
            XdmAtomicValue::DayTimeDuration(ms) => {
                if *ms == 0 {
                    "PT0S".to_string()
                } else {
                    format_duration(0, *ms)
                }
            }
            XdmAtomicValue::DateTime(dt, tz) => {
                format!("{}T{}{}", dt.date().format("%Y-%m-%d"), format_time(dt.time()), format_tz(*tz))
            }
            XdmAtomicValue::Date(d, tz) => format!("{}{}", d.format("%Y-%m-%d"), format_tz(*tz)),
            XdmAtomicValue::Time(t, tz) => format!("{}{}", format_time(*t), format_tz(*tz)),
        }
    }
}

impl fmt::Display for XdmAtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmAtomicValue::String(s) => write!(f, "\"{s}\""),
            XdmAtomicValue::UntypedAtomic(s) => write!(f, "untyped(\"{s}\")"),
            other => write!(f, "{}({})", other.atomic_type().local_name(), other.lexical()),
        }
    }
}

pub(crate) fn format_decimal(d: Decimal) -> String {
    let n = d.normalize();
    let s = n.to_string();
    if s == "-0" { "0".to_string() } else { s }
}

/// XPath canonical form for `xs:double`: plain notation in `[1e-6, 1e6)`, scientific
/// with an explicit fraction outside of it.
pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "INF".to_string() } else { "-INF".to_string() };
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }
    let abs = d.abs();
    if (1e-6..1e6).contains(&abs) {
        return format!("{d}");
    }
    let sci = format!("{d:E}");
    match sci.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
        _ => sci,
    }
}

fn format_duration(months: i32, millis: i64) -> String {
    let negative = months < 0 || millis < 0;
    let months = months.unsigned_abs();
    let millis = millis.unsigned_abs();
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    let (y, m) = (months / 12, months % 12);
    if y > 0 {
        out.push_str(&format!("{y}Y"));
    }
    if m > 0 {
        out.push_str(&format!("{m}M"));
    }
    let total_secs = millis / 1000;
    let frac = millis % 1000;
    let (d, rem) = (total_secs / 86_400, total_secs % 86_400);
    let (h, rem) = (rem / 3600, rem % 3600);
    let (mi, s) = (rem / 60, rem % 60);
    if d > 0 {
        out.push_str(&format!("{d}D"));
    }
    if h > 0 || mi > 0 || s > 0 || frac > 0 {
        out.push('T');
        if h > 0 {
            out.push_str(&format!("{h}H"));
        }
        if mi > 0 {
            out.push_str(&format!("{mi}M"));
        }
        if s > 0 || frac > 0 {
            if frac > 0 {
                let f = format!("{frac:03}");
                out.push_str(&format!("{s}.{}S", f.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{s}S"));
            }
        }
    }
    if out.ends_with('P') {
        out.push_str("T0S");
    }
    out
}

fn format_time(t: NaiveTime) -> String {
    let base = t.format("%H:%M:%S").to_string();
    let ms = t.nanosecond() / 1_000_000;
    if ms == 0 {
        base
    } else {
        let f = format!("{ms:03}");
        format!("{base}.{}", f.trim_end_matches('0'))
    }
}

fn format_tz(tz: Option<FixedOffset>) -> String {
    match tz {
        None => String::new(),
        Some(off) => {
            let secs = off.local_minus_utc();
            if secs == 0 {
                "Z".to_string()
            } else {
                let sign = if secs < 0 { '-' } else { '+' };
                let abs = secs.abs();
                format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_canonical_forms() {
        assert_eq!(format_double(5.0), "5");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(1e20), "1.0E20");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::NEG_INFINITY), "-INF");
    }

    #[test]
    fn duration_canonical_forms() {
        assert_eq!(XdmAtomicValue::DayTimeDuration(90_061_500).lexical(), "P1DT1H1M1.5S");
        assert_eq!(XdmAtomicValue::YearMonthDuration(-14).lexical(), "-P1Y2M");
        assert_eq!(XdmAtomicValue::DayTimeDuration(0).lexical(), "PT0S");
    }

    #[test]
    fn identity_distinguishes_annotation() {
        let typed = XdmAtomicValue::Integer(3);
        let untyped = XdmAtomicValue::UntypedAtomic("3".into());
        assert!(!typed.identical(&untyped));
        assert!(XdmAtomicValue::Double(f64::NAN).identical(&XdmAtomicValue::Double(f64::NAN)));
    }
}
