//! Text renderings for binary-encoded types that have no std/chrono
//! counterpart in tokio-postgres: `interval`, `timetz`, `money`, `inet`,
//! `cidr`, and enum labels.

use std::error::Error;
use std::fmt::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio_postgres::types::{FromSql, Kind, Type};

type DecodeError = Box<dyn Error + Sync + Send>;

const USECS_PER_SEC: i64 = 1_000_000;
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// A value rendered in its PostgreSQL text form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgText(pub String);

impl<'a> FromSql<'a> for PgText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let text = if *ty == Type::INTERVAL {
            interval(raw)?
        } else if *ty == Type::TIMETZ {
            timetz(raw)?
        } else if *ty == Type::MONEY {
            money(raw)?
        } else if *ty == Type::INET || *ty == Type::CIDR {
            inet(raw, *ty == Type::CIDR)?
        } else {
            std::str::from_utf8(raw)?.to_string()
        };
        Ok(PgText(text))
    }

    fn accepts(ty: &Type) -> bool {
        [Type::INTERVAL, Type::TIMETZ, Type::MONEY, Type::INET, Type::CIDR].contains(ty)
            || matches!(ty.kind(), Kind::Enum(_))
    }
}

fn be_i64(raw: &[u8], at: usize) -> Result<i64, DecodeError> {
    raw.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(i64::from_be_bytes)
        .ok_or_else(|| "value truncated".into())
}

fn be_i32(raw: &[u8], at: usize) -> Result<i32, DecodeError> {
    raw.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_be_bytes)
        .ok_or_else(|| "value truncated".into())
}

/// `HH:MM:SS[.ffffff]` with trailing fractional zeros trimmed
fn clock(micros: i64) -> String {
    let secs = micros / USECS_PER_SEC;
    let frac = micros % USECS_PER_SEC;
    let mut out = format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    if frac != 0 {
        let digits = format!("{:06}", frac);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out
}

fn unit(out: &mut String, value: i32, singular: &str, plural: &str) {
    if value != 0 {
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{} {}", value, if value == 1 { singular } else { plural });
    }
}

/// Binary layout: i64 microseconds, i32 days, i32 months
pub fn interval(raw: &[u8]) -> Result<String, DecodeError> {
    let micros = be_i64(raw, 0)?;
    let days = be_i32(raw, 8)?;
    let months = be_i32(raw, 12)?;

    let mut out = String::new();
    unit(&mut out, months / 12, "year", "years");
    unit(&mut out, months % 12, "mon", "mons");
    unit(&mut out, days, "day", "days");

    if micros != 0 || out.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        if micros < 0 {
            out.push('-');
        }
        out.push_str(&clock(micros.unsigned_abs() as i64));
    }
    Ok(out)
}

/// Binary layout: i64 microseconds since midnight, i32 zone in seconds
/// west of UTC
pub fn timetz(raw: &[u8]) -> Result<String, DecodeError> {
    let micros = be_i64(raw, 0)?;
    let east = -be_i32(raw, 8)?;

    let mut out = clock(micros);
    let abs = east.unsigned_abs();
    let _ = write!(out, "{}{:02}", if east < 0 { '-' } else { '+' }, abs / 3600);
    if abs % 3600 != 0 {
        let _ = write!(out, ":{:02}", (abs / 60) % 60);
    }
    Ok(out)
}

/// Binary layout: i64 in hundredths of the currency unit. Rendered
/// without currency symbol or grouping so the value stays parseable.
pub fn money(raw: &[u8]) -> Result<String, DecodeError> {
    let cents = be_i64(raw, 0)?;
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    Ok(format!("{}{}.{:02}", sign, abs / 100, abs % 100))
}

/// Binary layout: family, prefix bits, is_cidr flag, address length,
/// address bytes. `inet` omits the prefix when it covers the whole address.
pub fn inet(raw: &[u8], is_cidr: bool) -> Result<String, DecodeError> {
    if raw.len() < 4 {
        return Err("inet header truncated".into());
    }
    let (family, bits, len) = (raw[0], raw[1], raw[3] as usize);
    let bytes = raw.get(4..4 + len).ok_or("inet address truncated")?;

    let (addr, max_bits) = match family {
        PGSQL_AF_INET => {
            let octets: [u8; 4] = bytes.try_into().map_err(|_| "bad IPv4 length")?;
            (IpAddr::V4(Ipv4Addr::from(octets)), 32)
        }
        PGSQL_AF_INET6 => {
            let octets: [u8; 16] = bytes.try_into().map_err(|_| "bad IPv6 length")?;
            (IpAddr::V6(Ipv6Addr::from(octets)), 128)
        }
        other => return Err(format!("unknown inet family {}", other).into()),
    };

    if is_cidr || bits != max_bits {
        Ok(format!("{}/{}", addr, bits))
    } else {
        Ok(addr.to_string())
    }
}
