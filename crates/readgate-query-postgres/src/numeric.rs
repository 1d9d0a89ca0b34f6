//! Lossless decoding of `NUMERIC` values.
//!
//! The binary wire format is a header of four big-endian 16-bit fields
//! (`ndigits`, `weight`, `sign`, `dscale`) followed by `ndigits` base-10000
//! digit groups. `weight` is the power of 10000 of the first group.

use std::error::Error;
use std::fmt::Write;
use tokio_postgres::types::{FromSql, Type};

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_POS_INF: u16 = 0xD000;
const SIGN_NEG_INF: u16 = 0xF000;

/// A `NUMERIC` rendered as its exact decimal text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgNumeric(pub String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        decode(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

/// Decode the binary `NUMERIC` representation into decimal text
pub fn decode(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() < 8 {
        return Err("numeric header truncated".into());
    }

    let ndigits = read_u16(raw, 0) as i16;
    let weight = read_u16(raw, 2) as i16 as i32;
    let sign = read_u16(raw, 4);
    let dscale = read_u16(raw, 6) as usize;

    match sign {
        SIGN_NAN => return Ok("NaN".to_string()),
        SIGN_POS_INF => return Ok("Infinity".to_string()),
        SIGN_NEG_INF => return Ok("-Infinity".to_string()),
        SIGN_POSITIVE | SIGN_NEGATIVE => {}
        other => return Err(format!("invalid numeric sign: {:#06x}", other).into()),
    }

    if ndigits < 0 || raw.len() != 8 + 2 * ndigits as usize {
        return Err("numeric digit count does not match payload".into());
    }

    let mut digits = Vec::with_capacity(ndigits as usize);
    for i in 0..ndigits as usize {
        let group = read_u16(raw, 8 + 2 * i);
        if group >= 10_000 {
            return Err(format!("invalid numeric digit group: {}", group).into());
        }
        digits.push(group);
    }
    let group_at = |idx: i32| -> u16 {
        if idx < 0 {
            0
        } else {
            digits.get(idx as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == SIGN_NEGATIVE && !digits.is_empty() {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight {
            let group = group_at(idx);
            if idx == 0 {
                let _ = write!(out, "{}", group);
            } else {
                let _ = write!(out, "{:04}", group);
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", group_at(idx));
            idx += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}
