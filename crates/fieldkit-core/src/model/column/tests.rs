use super::*;
use crate::{model::ColumnSet, record::ValueSet};
use fieldkit_io::{BitArray, BitReader, BitWriter, Charset};
use proptest::prelude::*;
use std::sync::Arc;
use time::macros::{datetime, offset};

fn write(column: &Column, value: Option<&Value>, lossless: bool) -> BitArray {
    let mut writer = BitWriter::new();
    column.write(value, &mut writer, lossless).expect("write");

    writer.finish()
}

fn read(column: &Column, bits: &BitArray, lossless: bool) -> Option<Value> {
    let mut reader = BitReader::new(bits);
    let value = column.read(&mut reader, lossless).expect("read");
    assert!(reader.at_end(), "trailing bits after {}", column.name());

    value
}

fn round_trip(column: &Column, value: &Value, lossless: bool) -> Value {
    let bits = write(column, Some(value), lossless);
    assert!(bits.len() >= column.min_size(lossless));
    assert!(bits.len() <= column.max_size(lossless));

    read(column, &bits, lossless).expect("present")
}

// ============================================================================
// Integer
// ============================================================================

#[test]
fn sized_integer_bounds() {
    let signed = IntegerColumn::sized(8, true).expect("int8");
    assert_eq!(signed.bounds(), (-128, 127));

    let unsigned = IntegerColumn::sized(24, false).expect("uint24");
    assert_eq!(unsigned.bounds(), (0, (1 << 24) - 1));

    assert_eq!(IntegerColumn::INT64.bounds(), (i64::MIN, i64::MAX));
    assert!(IntegerColumn::sized(0, true).is_err());
    assert!(IntegerColumn::sized(64, false).is_err());
}

#[test]
fn ranged_integer_uses_fewest_bits() {
    let kind = IntegerColumn::ranged(-5, 10).expect("range");
    assert_eq!(kind.size(), 4);

    let column = Column::new("Score", ColumnKind::Integer(kind), false).expect("column");
    assert_eq!(write(&column, Some(&Value::Integer(-5)), true).len(), 4);
    assert_eq!(round_trip(&column, &Value::Integer(10), true), Value::Integer(10));

    let err = column.validate(&Value::Integer(11)).expect_err("above range");
    assert_eq!(err.column, "Score");
}

#[test]
fn optional_column_writes_presence_bit() {
    let column = Column::integer("Count", true).expect("column");
    let absent = write(&column, None, false);
    assert_eq!(absent.len(), 1);
    assert_eq!(read(&column, &absent, false), None);

    assert_eq!(write(&column, Some(&Value::Integer(3)), false).len(), 65);
}

#[test]
fn required_column_rejects_missing_value() {
    let column = Column::integer("Count", false).expect("column");
    let mut writer = BitWriter::new();
    let err = column.write(None, &mut writer, false).expect_err("missing");
    assert!(err.is_validation());
}

#[test]
fn mismatched_value_type_is_rejected() {
    let column = Column::boolean("Flag", false).expect("column");
    let err = column.validate(&Value::from("yes")).expect_err("string in boolean");
    assert!(err.constraint.contains("expected a boolean value"));
}

proptest! {
    #[test]
    fn integers_round_trip_within_bounds(bits in 1u32..=63, signed in any::<bool>(), seed in any::<i64>()) {
        let kind = IntegerColumn::sized(bits, signed).expect("sized");
        let (low, high) = kind.bounds();
        let span = (high as i128 - low as i128 + 1) as u128;
        let value = (low as i128 + (seed as u128 % span) as i128) as i64;

        let column = Column::new("N", ColumnKind::Integer(kind), false).expect("column");
        prop_assert_eq!(round_trip(&column, &Value::Integer(value), false), Value::Integer(value));
    }
}

// ============================================================================
// Float
// ============================================================================

#[test]
fn single_precision_is_lossy_only_on_lossy_writes() {
    let column = Column::new("Reading", ColumnKind::Float(FloatColumn::SINGLE), false).expect("column");
    assert!(column.can_be_lossy());
    assert_eq!(column.max_size(false), 32);
    assert_eq!(column.max_size(true), 64);

    let precise = Value::Float(0.1);
    assert_eq!(round_trip(&column, &precise, true), precise);

    let lossy = round_trip(&column, &precise, false);
    assert_ne!(lossy, precise);
    assert_eq!(lossy, Value::Float(f64::from(0.1f32)));
}

#[test]
fn single_precision_overflow_is_rejected() {
    let column = Column::new("Reading", ColumnKind::Float(FloatColumn::SINGLE), false).expect("column");
    let mut writer = BitWriter::new();
    let err = column
        .write(Some(&Value::Float(1e300)), &mut writer, false)
        .expect_err("overflow");
    assert!(err.is_validation());
    assert!(err.message.starts_with("column 'Reading'"));
}

#[test]
fn unsigned_float_rejects_negatives() {
    let column = Column::new(
        "Accuracy",
        ColumnKind::Float(FloatColumn::new(false, false)),
        false,
    )
    .expect("column");
    assert!(column.validate(&Value::Float(-1.0)).is_err());
    assert!(column.validate(&Value::Float(2.5)).is_ok());
}

proptest! {
    #[test]
    fn f32_values_survive_lossy_writes(value in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
        let column = Column::new("F", ColumnKind::Float(FloatColumn::SINGLE), false).expect("column");
        let value = Value::Float(f64::from(value));
        prop_assert_eq!(round_trip(&column, &value, false), value);
    }

    #[test]
    fn doubles_survive_lossless_writes(value in any::<f64>()) {
        let column = Column::new("F", ColumnKind::Float(FloatColumn::SINGLE), false).expect("column");
        let value = Value::Float(value);
        prop_assert_eq!(round_trip(&column, &value, true), value);
    }
}

// ============================================================================
// String, bytes
// ============================================================================

#[test]
fn string_length_counts_encoded_bytes() {
    let column = Column::string("Name", false, 6).expect("column");
    assert!(column.validate(&Value::from("Grüße")).is_err());
    assert!(column.validate(&Value::from("Grüß")).is_ok());

    let value = Value::from("Grüß");
    assert_eq!(round_trip(&column, &value, false), value);
    assert_eq!(column.min_size(false), 3);
    assert_eq!(column.max_size(false), 3 + 6 * 8);
}

#[test]
fn empty_string_round_trips() {
    let column = Column::string("Note", true, StringColumn::DEFAULT_MAX_LENGTH).expect("column");
    assert_eq!(round_trip(&column, &Value::from(""), false), Value::from(""));
}

#[test]
fn bytes_round_trip_and_limit() {
    let kind = BytesColumn::new(4).expect("bytes");
    let column = Column::new("Blob", ColumnKind::Bytes(kind), false).expect("column");

    let value = Value::Bytes(vec![0xDE, 0xAD, 0x00, 0x01]);
    assert_eq!(round_trip(&column, &value, false), value);
    assert!(column.validate(&Value::Bytes(vec![0; 5])).is_err());
    assert_eq!(column.format(&value), "dead0001");
    assert_eq!(column.parse("dead0001").expect("hex"), value);
}

#[test]
fn string_column_charset_is_kept() {
    let kind = StringColumn::new(10, Charset::Utf8).expect("kind");
    assert_eq!(kind.charset(), Charset::Utf8);
    assert_eq!(kind.max_length(), 10);
}

// ============================================================================
// Time
// ============================================================================

#[test]
fn lossless_time_keeps_millis_and_offset() {
    let column = Column::new("At", ColumnKind::Time(TimeColumn::new(false, false)), false).expect("column");
    let value = Value::Time(datetime!(2024-03-09 14:05:06.789 +05:30));

    assert_eq!(round_trip(&column, &value, true), value);
    assert_eq!(column.max_size(true), 76);
}

#[test]
fn lossy_time_drops_millis_and_offset() {
    let column = Column::new("At", ColumnKind::Time(TimeColumn::new(false, false)), false).expect("column");
    let value = Value::Time(datetime!(2024-03-09 14:05:06.789 +05:30));

    let lossy = round_trip(&column, &value, false);
    assert_eq!(lossy, Value::Time(datetime!(2024-03-09 08:35:06 UTC)));
    assert_eq!(column.max_size(false), 40);
}

#[test]
fn sub_millisecond_times_are_rejected() {
    let column = Column::new("At", ColumnKind::Time(TimeColumn::LOSSLESS), false).expect("column");
    let value = Value::Time(datetime!(2024-03-09 14:05:06.0000005 UTC));
    assert!(column.validate(&value).is_err());
}

#[test]
fn time_text_form_is_rfc3339() {
    let column = Column::new("At", ColumnKind::Time(TimeColumn::LOSSLESS), false).expect("column");
    let value = Value::Time(datetime!(2024-03-09 14:05:06.5 UTC).to_offset(offset!(-3)));

    let text = column.format(&value);
    assert_eq!(text, "2024-03-09T11:05:06.5-03:00");
    assert_eq!(column.parse(&text).expect("parse"), value);
}

// ============================================================================
// List
// ============================================================================

fn tag_list(min: usize, max: usize) -> Column {
    let element = Column::string("Tag", false, 8).expect("element");
    let list = ListColumn::new(element, min, max).expect("list");

    Column::new("Tags", ColumnKind::List(list), false).expect("column")
}

#[test]
fn list_elements_must_be_required() {
    let element = Column::integer("N", true).expect("element");
    assert!(ListColumn::new(element, 0, 3).is_err());
}

#[test]
fn list_length_bounds_are_enforced() {
    let column = tag_list(1, 3);
    assert!(column.validate(&Value::List(vec![])).is_err());
    assert!(column.validate(&Value::List(vec!["a".into(); 4])).is_err());

    let err = column
        .validate(&Value::List(vec![Value::from("a"), Value::from("far too long")]))
        .expect_err("element too long");
    assert!(err.constraint.starts_with("element 1"));
}

#[test]
fn list_round_trips_in_binary_and_text() {
    let column = tag_list(0, 5);
    let value = Value::List(vec![Value::from("a,b"), Value::from(""), Value::from("c\\")]);

    assert_eq!(round_trip(&column, &value, false), value);
    assert_eq!(column.parse(&column.format(&value)).expect("parse"), value);
    assert_eq!(column.parse("").expect("empty"), Value::List(vec![]));
}

fn line_value(column: &Column, points: &[(f64, f64)]) -> Value {
    let Some(point) = (match column.kind() {
        ColumnKind::List(list) => list.point_column(),
        _ => None,
    }) else {
        panic!("line column expected");
    };

    let points = points
        .iter()
        .map(|&(latitude, longitude)| {
            let mut value = point.new_value();
            value.set(RecordColumn::LATITUDE, latitude).expect("lat");
            value.set(RecordColumn::LONGITUDE, longitude).expect("lon");
            Value::Record(value)
        })
        .collect();

    Value::List(points)
}

#[test]
fn line_length_takes_sixteen_bits() {
    let column = Column::line("Track", false, false, false).expect("line");
    let ColumnKind::List(list) = column.kind() else {
        panic!("list expected");
    };
    assert!(list.is_line());
    assert_eq!(list.max_length(), 65_535);
    assert!(list.point_column().expect("points").columns().column(RecordColumn::ALTITUDE).is_none());

    assert_eq!(write(&column, Some(&Value::List(vec![])), true).len(), 16);
    assert!(!ListColumn::new(Column::integer("N", false).expect("n"), 0, 4).expect("list").is_line());
}

#[test]
fn line_round_trips_in_binary_and_text() {
    let column = Column::line("Track", true, true, true).expect("line");
    let value = line_value(&column, &[(51.5, -0.125), (51.25, -0.5), (-33.875, 151.25)]);

    assert_eq!(round_trip(&column, &value, true), value);
    assert_eq!(column.parse(&column.format(&value)).expect("parse"), value);

    let single = Column::line("Track", false, false, false).expect("line");
    let value = line_value(&single, &[(51.5, -0.125)]);
    assert_eq!(round_trip(&single, &value, false), value);
    assert_eq!(single.format(&value), "51.5;-0.125");
}

// ============================================================================
// Record
// ============================================================================

#[test]
fn location_columns_follow_flags() {
    let location = RecordColumn::location(true, true, false).expect("location");
    assert!(location.is_location());
    assert_eq!(location.columns().len(), 3);
    assert!(location.columns().column(RecordColumn::ACCURACY).is_none());

    let full = RecordColumn::location(false, true, true).expect("location");
    assert_eq!(full.columns().len(), 4);
    assert!(full.columns().can_be_lossy());
}

#[test]
fn nested_record_round_trips() {
    let location = RecordColumn::location(true, false, true).expect("location");
    let mut value = location.new_value();
    value.set(RecordColumn::LATITUDE, 51.5).expect("lat");
    value.set(RecordColumn::LONGITUDE, -0.12).expect("lon");

    let column = Column::new("Where", ColumnKind::Record(location), false).expect("column");
    let value = Value::Record(value);
    assert_eq!(round_trip(&column, &value, true), value);
}

#[test]
fn nested_record_must_match_its_columns() {
    let location = RecordColumn::location(true, false, false).expect("location");
    let column = Column::new("Where", ColumnKind::Record(location), false).expect("column");

    let mut other = ColumnSet::new("Other");
    other.add_column(Column::integer("N", false).expect("n")).expect("add");
    let stranger = ValueSet::new(Arc::new(other));
    assert!(column.validate(&Value::Record(stranger)).is_err());
}

#[test]
fn equals_with_can_ignore_names() {
    let a = Column::string("A", false, 8).expect("a");
    let b = Column::string("B", false, 8).expect("b");
    assert!(!a.equals_with(&b, true));
    assert!(a.equals_with(&b, false));

    let c = Column::string("A", true, 8).expect("c");
    assert!(!a.equals_with(&c, false));
}

// ============================================================================
// Virtual
// ============================================================================

#[test]
fn virtual_labels_map_codes() {
    let target = Column::new(
        "Weather",
        ColumnKind::Integer(IntegerColumn::ranged(0, 2).expect("range")),
        false,
    )
    .expect("column");
    let labels = VirtualColumn::labels("WeatherLabel", [(0, "sunny"), (1, "cloudy")]);

    assert_eq!(labels.derive(&target, &Value::Integer(1)), Some("cloudy".into()));
    assert_eq!(labels.derive(&target, &Value::Integer(2)), None);
    assert_eq!(labels.derive(&target, &Value::from("x")), None);

    let flag = Column::boolean("Dry", false).expect("flag");
    let yes_no = VirtualColumn::labels("DryLabel", [(0, "no"), (1, "yes")]);
    assert_eq!(yes_no.derive(&flag, &Value::Boolean(true)), Some("yes".into()));

    let text = VirtualColumn::new("WeatherText", VirtualMapping::Text);
    assert_eq!(text.derive(&target, &Value::Integer(2)), Some("2".into()));
}
