//! Conversions between SimpleDb values and `mysql_async` values

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::Value as MySqlValue;
use mysql_async::consts::ColumnType;
use simpledb_core::Value;


/// Convert a bound parameter into a `mysql_async` value
pub(crate) fn value_to_mysql(value: &Value) -> MySqlValue {
    match value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(v) => MySqlValue::Int(*v as i64),
        Value::Int32(v) => MySqlValue::Int(*v as i64),
        Value::Int64(v) => MySqlValue::Int(*v),
        Value::UInt64(v) => MySqlValue::UInt(*v),
        Value::Float32(v) => MySqlValue::Float(*v),
        Value::Float64(v) => MySqlValue::Double(*v),
        Value::Decimal(v) | Value::String(v) => MySqlValue::Bytes(v.as_bytes().to_vec()),
        Value::Bytes(v) => MySqlValue::Bytes(v.clone()),
        Value::Uuid(v) => MySqlValue::Bytes(v.to_string().into_bytes()),
        Value::Date(d) => MySqlValue::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::Time(t) => MySqlValue::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            micros(t.nanosecond()),
        ),
        Value::DateTime(dt) => datetime_to_mysql(dt),
        Value::DateTimeUtc(dt) => datetime_to_mysql(&dt.naive_utc()),
        Value::Json(v) => MySqlValue::Bytes(v.to_string().into_bytes()),
    }
}

fn datetime_to_mysql(dt: &NaiveDateTime) -> MySqlValue {
    MySqlValue::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        micros(dt.nanosecond()),
    )
}

/// Nanoseconds to microseconds, folding chrono's leap-second range
fn micros(nanos: u32) -> u32 {
    (nanos / 1_000).min(999_999)
}

/// `TINYINT(1)` and `BIT(1)` are MySQL's conventional boolean columns
pub(crate) fn is_flag_column(col_type: ColumnType, length: u32) -> bool {
    length == 1
        && matches!(
            col_type,
            ColumnType::MYSQL_TYPE_TINY | ColumnType::MYSQL_TYPE_BIT
        )
}

/// Read an integer from a flag column as a boolean
pub(crate) fn as_flag(value: Value) -> Value {
    match value {
        Value::Int64(v) => Value::Bool(v != 0),
        other => other,
    }
}

/// Convert a `mysql_async` value into a SimpleDb value
///
/// The text protocol returns everything as bytes, so the column type decides
/// how the bytes are interpreted. The binary protocol already returns typed
/// values.
pub(crate) fn mysql_to_value(val: MySqlValue, col_type: ColumnType) -> Value {
    match val {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => bytes_to_value(bytes, col_type),
        MySqlValue::Int(i) => Value::Int64(i),
        MySqlValue::UInt(u) => i64::try_from(u).map(Value::Int64).unwrap_or(Value::UInt64(u)),
        MySqlValue::Float(f) => Value::Float32(f),
        MySqlValue::Double(d) => Value::Float64(d),
        MySqlValue::Date(year, month, day, hour, min, sec, micro) => {
            let Some(date) = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32) else {
                // Zero dates ('0000-00-00') have no chrono representation.
                return Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                ));
            };
            if col_type == ColumnType::MYSQL_TYPE_DATE {
                return Value::Date(date);
            }
            date.and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                .map(Value::DateTime)
                .unwrap_or(Value::Date(date))
        }
        MySqlValue::Time(negative, days, hours, mins, secs, micros) => {
            if !negative && days == 0 {
                if let Some(t) =
                    NaiveTime::from_hms_micro_opt(hours as u32, mins as u32, secs as u32, micros)
                {
                    return Value::Time(t);
                }
            }
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn bytes_to_value(bytes: Vec<u8>, col_type: ColumnType) -> Value {
    if col_type == ColumnType::MYSQL_TYPE_BIT {
        return bit_to_value(&bytes);
    }
    let s = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => return Value::Bytes(e.into_bytes()),
    };
    match col_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_YEAR => match s.parse::<i64>() {
            Ok(v) => Value::Int64(v),
            Err(_) => s.parse::<u64>().map(Value::UInt64).unwrap_or(Value::String(s)),
        },
        ColumnType::MYSQL_TYPE_FLOAT => {
            s.parse::<f32>().map(Value::Float32).unwrap_or(Value::String(s))
        }
        ColumnType::MYSQL_TYPE_DOUBLE => {
            s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
        }
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => Value::Decimal(s),
        ColumnType::MYSQL_TYPE_DATE => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Value::Date)
            .unwrap_or(Value::String(s)),
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .map(Value::DateTime)
                .unwrap_or(Value::String(s))
        }
        ColumnType::MYSQL_TYPE_TIME => NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
            .map(Value::Time)
            .unwrap_or(Value::String(s)),
        ColumnType::MYSQL_TYPE_JSON => serde_json::from_str(&s)
            .map(Value::Json)
            .unwrap_or(Value::String(s)),
        _ => Value::String(s),
    }
}

/// BIT(n) arrives as big-endian bytes, at most eight of them
fn bit_to_value(bytes: &[u8]) -> Value {
    if bytes.len() > 8 {
        return Value::Bytes(bytes.to_vec());
    }
    let bits = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    i64::try_from(bits).map(Value::Int64).unwrap_or(Value::UInt64(bits))
}
