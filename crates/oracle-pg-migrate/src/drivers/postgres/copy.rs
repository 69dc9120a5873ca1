//! Text-format `COPY ... FROM STDIN` encoding.
//!
//! Columns are tab-separated, rows newline-terminated, NULL is `\N`.

use crate::core::value::SqlValue;

/// Append one row to `buf`.
pub fn encode_row(buf: &mut String, row: &[SqlValue]) {
    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            buf.push('\t');
        }
        encode_value(buf, value);
    }
    buf.push('\n');
}

/// Append one value to `buf`.
pub fn encode_value(buf: &mut String, value: &SqlValue) {
    match value {
        SqlValue::Null => buf.push_str("\\N"),
        SqlValue::Bool(b) => buf.push(if *b { 't' } else { 'f' }),
        SqlValue::I64(i) => buf.push_str(&i.to_string()),
        SqlValue::F32(f) => push_float(buf, f64::from(*f), f.to_string()),
        SqlValue::F64(f) => push_float(buf, *f, f.to_string()),
        SqlValue::Decimal(d) => buf.push_str(&d.to_string()),
        SqlValue::Text(s) | SqlValue::Interval(s) => escape_into(buf, s),
        // bytea hex input; the backslash itself needs escaping in COPY text
        SqlValue::Bytes(b) => {
            buf.push_str("\\\\x");
            buf.push_str(&hex::encode(b));
        }
        SqlValue::Date(d) => buf.push_str(&d.format("%Y-%m-%d").to_string()),
        SqlValue::DateTime(dt) => buf.push_str(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::DateTimeOffset(dt) => {
            buf.push_str(&dt.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string())
        }
    }
}

fn push_float(buf: &mut String, value: f64, rendered: String) {
    if value.is_nan() {
        buf.push_str("NaN");
    } else if value.is_infinite() {
        buf.push_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
    } else {
        buf.push_str(&rendered);
    }
}

fn escape_into(buf: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '\t' => buf.push_str("\\t"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            _ => buf.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn encode(value: SqlValue) -> String {
        let mut buf = String::new();
        encode_value(&mut buf, &value);
        buf
    }

    #[test]
    fn test_row_layout() {
        let mut buf = String::new();
        encode_row(
            &mut buf,
            &[SqlValue::I64(7), SqlValue::Null, SqlValue::Text("x".into())],
        );
        assert_eq!(buf, "7\t\\N\tx\n");
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(encode(SqlValue::Text("a\tb\nc\rd\\e".into())), "a\\tb\\nc\\rd\\\\e");
    }

    #[test]
    fn test_bytes_as_hex() {
        assert_eq!(encode(SqlValue::Bytes(vec![0xde, 0xad, 0x01])), "\\\\xdead01");
    }

    #[test]
    fn test_special_floats() {
        assert_eq!(encode(SqlValue::F64(f64::NAN)), "NaN");
        assert_eq!(encode(SqlValue::F64(f64::INFINITY)), "Infinity");
        assert_eq!(encode(SqlValue::F32(f32::NEG_INFINITY)), "-Infinity");
        assert_eq!(encode(SqlValue::F64(1.5)), "1.5");
    }

    #[test]
    fn test_scalars() {
        assert_eq!(encode(SqlValue::Bool(true)), "t");
        assert_eq!(encode(SqlValue::Decimal(Decimal::from_str("12.50").unwrap())), "12.50");
        assert_eq!(encode(SqlValue::Interval("3 days 04:05:06".into())), "3 days 04:05:06");
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(encode(SqlValue::Date(date)), "2024-02-29");

        let dt = date.and_hms_milli_opt(13, 4, 5, 250).unwrap();
        assert_eq!(encode(SqlValue::DateTime(dt)), "2024-02-29 13:04:05.250");

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dto = offset.from_local_datetime(&date.and_hms_opt(1, 2, 3).unwrap()).unwrap();
        assert_eq!(encode(SqlValue::DateTimeOffset(dto)), "2024-02-29 01:02:03+02:00");
    }
}
