use std::io::Cursor;

use chrono::NaiveDate;
use chrono_tz::Tz;

use super::Type;
use super::deserialize::{ClickHouseNativeDeserializer, DeserializerState};
use super::serialize::ClickHouseNativeSerializer;
use crate::{Decimal, Error, Result, Value, decode_value, encode_value};

async fn roundtrip_values(type_: &Type, values: &[Value]) -> Result<Vec<Value>> {
    let mut output = vec![];

    type_.serialize_prefix_async(&mut output).await?;
    type_.serialize_column(values, &mut output).await?;
    let mut input = Cursor::new(output);
    let mut state = DeserializerState::default();
    type_.deserialize_prefix_async(&mut input, &mut state).await?;
    let deserialized = type_.deserialize_column(&mut input, values.len(), &mut state).await?;

    Ok(deserialized)
}

#[tokio::test]
async fn roundtrip_unsigned() {
    let values = &[Value::UInt8(0), Value::UInt8(255)];
    assert_eq!(&values[..], roundtrip_values(&Type::UInt8, values).await.unwrap());
    let values = &[Value::UInt16(12), Value::UInt16(u16::MAX)];
    assert_eq!(&values[..], roundtrip_values(&Type::UInt16, values).await.unwrap());
    let values = &[Value::UInt32(12), Value::UInt32(u32::MAX)];
    assert_eq!(&values[..], roundtrip_values(&Type::UInt32, values).await.unwrap());
}

#[tokio::test]
async fn roundtrip_u64_full_range() {
    let values =
        &[Value::UInt64(0), Value::UInt64(9_223_372_036_854_775_807), Value::UInt64(u64::MAX)];
    assert_eq!(&values[..], roundtrip_values(&Type::UInt64, values).await.unwrap());
}

#[tokio::test]
async fn u64_max_decodes_as_magnitude() {
    let decoded = decode_value(&Type::UInt64, &[0xFF; 8]).await.unwrap();
    assert_eq!(decoded, Value::UInt64(18_446_744_073_709_551_615));
    assert_eq!(decoded.to_string(), "18446744073709551615");
}

#[tokio::test]
async fn roundtrip_signed() {
    let values = &[Value::Int8(i8::MIN), Value::Int8(-30), Value::Int8(i8::MAX)];
    assert_eq!(&values[..], roundtrip_values(&Type::Int8, values).await.unwrap());
    let values = &[Value::Int16(-30000), Value::Int16(30000)];
    assert_eq!(&values[..], roundtrip_values(&Type::Int16, values).await.unwrap());
    let values = &[Value::Int32(i32::MIN), Value::Int32(900_000)];
    assert_eq!(&values[..], roundtrip_values(&Type::Int32, values).await.unwrap());
    let values = &[Value::Int64(i64::MIN), Value::Int64(0), Value::Int64(i64::MAX)];
    assert_eq!(&values[..], roundtrip_values(&Type::Int64, values).await.unwrap());
}

#[tokio::test]
async fn int64_overflow_fails_to_encode() {
    let err = encode_value(&Type::Int64, Value::UInt64(1 << 63)).await.unwrap_err();
    assert!(matches!(err, Error::Encode(_)));
    let bytes = encode_value(&Type::Int64, Value::Int64(-1)).await.unwrap();
    assert_eq!(bytes, vec![0xFF; 8]);
}

#[tokio::test]
async fn roundtrip_floats() {
    let values = &[Value::Float32(1.5), Value::Float32(-0.25)];
    assert_eq!(&values[..], roundtrip_values(&Type::Float32, values).await.unwrap());
    let values = &[Value::Float64(1.0 / 3.0), Value::Float64(f64::MAX)];
    assert_eq!(&values[..], roundtrip_values(&Type::Float64, values).await.unwrap());
}

#[tokio::test]
async fn roundtrip_bool() {
    let values = &[Value::Bool(true), Value::Bool(false)];
    assert_eq!(&values[..], roundtrip_values(&Type::Bool, values).await.unwrap());
}

#[tokio::test]
async fn roundtrip_strings() {
    let values = &[Value::string("hello"), Value::string(""), Value::String(vec![0xFF, 0x00])];
    assert_eq!(&values[..], roundtrip_values(&Type::String, values).await.unwrap());
}

#[tokio::test]
async fn fixed_string_pads_and_preserves_zeros() {
    let type_ = Type::FixedSizedString(8);
    let bytes = encode_value(&type_, Value::string("test")).await.unwrap();
    assert_eq!(bytes, b"test\0\0\0\0");

    let decoded = decode_value(&type_, &bytes).await.unwrap();
    assert_eq!(decoded, Value::FixedString(b"test\0\0\0\0".to_vec()));
    assert_eq!(decoded.trim_fixed(), Value::string("test"));

    let err = encode_value(&type_, Value::string("far too long")).await.unwrap_err();
    assert!(matches!(err, Error::Encode(_)));
}

#[tokio::test]
async fn roundtrip_dates() {
    let date = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
    let values = &[Value::Date(date), Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())];
    assert_eq!(&values[..], roundtrip_values(&Type::Date, values).await.unwrap());

    let tz: Tz = "Europe/Amsterdam".parse().unwrap();
    let dt = chrono::DateTime::from_timestamp(1_577_836_800, 0).unwrap().with_timezone(&tz);
    let values = &[Value::DateTime(dt)];
    assert_eq!(&values[..], roundtrip_values(&Type::DateTime(Some(tz)), values).await.unwrap());
}

#[tokio::test]
async fn datetime_uses_connection_zone() {
    let tz: Tz = "Asia/Tokyo".parse().unwrap();
    let mut input = Cursor::new(1_577_836_800u32.to_le_bytes().to_vec());
    let mut state = DeserializerState { timezone: tz };
    let values = Type::DateTime(None).deserialize_column(&mut input, 1, &mut state).await.unwrap();
    let Value::DateTime(dt) = &values[0] else { panic!("expected datetime") };
    assert_eq!(dt.timezone(), tz);
    assert_eq!(values[0].to_string(), "2020-01-01 09:00:00");
}

#[tokio::test]
async fn decimal128_is_exact() {
    let type_ = Type::Decimal { precision: 38, scale: 3 };
    let bytes = encode_value(&type_, Value::string("123456789.123")).await.unwrap();
    assert_eq!(bytes.len(), 16);
    let decoded = decode_value(&type_, &bytes).await.unwrap();
    assert_eq!(decoded.to_string(), "123456789.123");
    assert_eq!(decoded, Value::Decimal(Decimal::new(123_456_789_123, 38, 3).unwrap()));
}

#[tokio::test]
async fn decimal_widths() {
    for (precision, width) in [(9, 4), (18, 8), (38, 16)] {
        let type_ = Type::Decimal { precision, scale: 2 };
        let bytes = encode_value(&type_, Value::string("-12.34")).await.unwrap();
        assert_eq!(bytes.len(), width);
        assert_eq!(decode_value(&type_, &bytes).await.unwrap().to_string(), "-12.34");
    }
    let narrow = Type::Decimal { precision: 4, scale: 2 };
    assert!(encode_value(&narrow, Value::string("123.45")).await.is_err());
}

#[tokio::test]
async fn nullable_layout() {
    let type_ = Type::Nullable(Box::new(Type::Int8));
    let mut output = vec![];
    type_.serialize_column(&[Value::Int8(5), Value::Null], &mut output).await.unwrap();
    // null map, then the inner column with a default in the null slot
    assert_eq!(output, vec![0, 1, 5, 0]);

    let values = &[Value::Null, Value::Int8(-3), Value::Null];
    assert_eq!(&values[..], roundtrip_values(&type_, values).await.unwrap());
}

#[tokio::test]
async fn nullable_null_is_absent() {
    let type_ = Type::Nullable(Box::new(Type::Int8));
    assert_eq!(decode_value(&type_, &[1, 0]).await.unwrap(), Value::Null);
    assert_eq!(decode_value(&type_, &[0, 0]).await.unwrap(), Value::Int8(0));
}

#[tokio::test]
async fn roundtrip_nullable_composites() {
    let type_ = Type::Nullable(Box::new(Type::FixedSizedString(3)));
    let values = &[Value::FixedString(b"ab\0".to_vec()), Value::Null];
    assert_eq!(&values[..], roundtrip_values(&type_, values).await.unwrap());

    let type_ = Type::Nullable(Box::new(Type::Date));
    let values = &[Value::Null, Value::Date(NaiveDate::from_ymd_opt(2020, 1, 3).unwrap())];
    assert_eq!(&values[..], roundtrip_values(&type_, values).await.unwrap());

    let type_ = Type::Nullable(Box::new(Type::Decimal { precision: 10, scale: 2 }));
    let values = &[Value::Null, Value::Decimal(Decimal::new(1234, 10, 2).unwrap())];
    assert_eq!(&values[..], roundtrip_values(&type_, values).await.unwrap());
}

#[tokio::test]
async fn nullable_nothing() {
    let type_: Type = "Nullable(Nothing)".parse().unwrap();
    assert_eq!(decode_value(&type_, &[1, 0]).await.unwrap(), Value::Null);
    let values = &[Value::Null, Value::Null];
    assert_eq!(&values[..], roundtrip_values(&type_, values).await.unwrap());
}

#[tokio::test]
async fn roundtrip_enum() {
    let type_: Type = "Enum8('increment' = 1, 'gauge' = 2)".parse().unwrap();
    let values = &[Value::Enum8("gauge".into(), 2), Value::Enum8("increment".into(), 1)];
    assert_eq!(&values[..], roundtrip_values(&type_, values).await.unwrap());
    assert!(decode_value(&type_, &[7]).await.is_err());
}

#[tokio::test]
async fn low_cardinality_decodes() {
    let type_: Type = "LowCardinality(String)".parse().unwrap();
    let mut input = vec![];
    input.extend(1u64.to_le_bytes()); // version
    input.extend((1u64 << 9).to_le_bytes()); // additional keys, UInt8 indices
    input.extend(2u64.to_le_bytes());
    input.extend([3, b'a', b'b', b'c', 1, b'x']);
    input.extend(3u64.to_le_bytes());
    input.extend([1, 0, 1]);

    let mut reader = Cursor::new(input);
    let mut state = DeserializerState::default();
    type_.deserialize_prefix_async(&mut reader, &mut state).await.unwrap();
    let values = type_.deserialize_column(&mut reader, 3, &mut state).await.unwrap();
    assert_eq!(values, vec![Value::string("x"), Value::string("abc"), Value::string("x")]);
}

#[tokio::test]
async fn low_cardinality_nullable_index_zero() {
    let type_: Type = "LowCardinality(Nullable(String))".parse().unwrap();
    let mut input = vec![];
    input.extend(1u64.to_le_bytes());
    input.extend(((1u64 << 9) | 1).to_le_bytes()); // UInt16 indices
    input.extend(2u64.to_le_bytes());
    input.extend([0, 2, b'o', b'k']);
    input.extend(2u64.to_le_bytes());
    input.extend([0, 0, 1, 0]);

    let mut reader = Cursor::new(input);
    let mut state = DeserializerState::default();
    type_.deserialize_prefix_async(&mut reader, &mut state).await.unwrap();
    let values = type_.deserialize_column(&mut reader, 2, &mut state).await.unwrap();
    assert_eq!(values, vec![Value::Null, Value::string("ok")]);
}

#[tokio::test]
async fn low_cardinality_insert_is_rejected() {
    let type_: Type = "LowCardinality(String)".parse().unwrap();
    assert!(matches!(encode_value(&type_, Value::string("a")).await, Err(Error::Encode(_))));
}

#[tokio::test]
async fn truncated_payload_is_decode_failure() {
    assert!(decode_value(&Type::Int32, &[1, 2]).await.is_err());
    assert!(decode_value(&Type::Int8, &[1, 2]).await.is_err());
}

#[test]
fn parse_and_display_types() {
    for name in [
        "UInt8",
        "Int64",
        "Float32",
        "Bool",
        "String",
        "FixedString(8)",
        "Date",
        "DateTime",
        "DateTime('Europe/Amsterdam')",
        "Decimal(38, 3)",
        "Nullable(Int8)",
        "Nullable(FixedString(5))",
        "Nullable(Nothing)",
        "LowCardinality(Nullable(String))",
        "Enum8('a' = 1, 'b\\'c' = -2)",
    ] {
        let type_: Type = name.parse().unwrap();
        assert_eq!(type_.to_string(), name);
    }
}

#[test]
fn parse_decimal_aliases() {
    assert_eq!("Decimal32(4)".parse::<Type>().unwrap(), Type::Decimal { precision: 9, scale: 4 });
    assert_eq!("Decimal64(2)".parse::<Type>().unwrap(), Type::Decimal { precision: 18, scale: 2 });
    assert_eq!("Decimal128(3)".parse::<Type>().unwrap(), Type::Decimal {
        precision: 38,
        scale:     3,
    });
    assert!(matches!("Decimal256(3)".parse::<Type>(), Err(Error::UnsupportedType(_))));
    assert!(matches!("Decimal(5, 6)".parse::<Type>(), Err(Error::TypeParse(_))));
}

#[test]
fn parse_enum_with_commas_in_labels() {
    let type_: Type = "Enum16('a, b' = 1000, 'c=d' = 2)".parse().unwrap();
    assert_eq!(type_, Type::Enum16(vec![("a, b".into(), 1000), ("c=d".into(), 2)]));
}

#[test]
fn unsupported_types_are_named() {
    for name in ["Array(UInt8)", "UUID", "DateTime64(3)", "Map(String, UInt8)", "Int128"] {
        match name.parse::<Type>() {
            Err(Error::UnsupportedType(t)) => assert_eq!(t, name),
            other => panic!("expected unsupported type for {name}, got {other:?}"),
        }
    }
    assert!(matches!("Nullable(Nullable(Int8))".parse::<Type>(), Err(Error::TypeParse(_))));
    assert!("FixedString(x)".parse::<Type>().is_err());
}

#[test]
fn strip_low_cardinality_keeps_nullable() {
    let type_: Type = "LowCardinality(Nullable(String))".parse().unwrap();
    assert_eq!(type_.strip_low_cardinality(), &Type::Nullable(Box::new(Type::String)));
    assert_eq!(type_.strip_low_cardinality().strip_null(), &Type::String);
}
