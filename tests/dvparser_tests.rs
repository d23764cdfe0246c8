//! DIF/VIF parser scenarios against the public extractor API.

use wmbus_rs::dvparser::{
    extract_dv_date, extract_dv_double, extract_dv_hex_string, parse_dv, Entries,
};
use wmbus_rs::util::hex::hex_to_bytes;

fn parse(hex: &str) -> (bool, Entries) {
    let mut entries = Entries::new();
    let ok = parse_dv(&mut entries, &hex_to_bytes(hex), 0);
    (ok, entries)
}

#[test]
fn mixed_records_with_fillers_and_mfct_tail() {
    let (ok, entries) = parse(
        "2F 2F 0B 13 56 34 12 8B 82 00 93 3E 67 45 23 0D FD 10 0A 30 31 32 33 34 35 36 37 38 39 0F 88 2F",
    );
    assert!(ok);

    assert_eq!(extract_dv_double(&entries, "0B13").unwrap().1, 123.456);
    assert_eq!(extract_dv_double(&entries, "8B8200933E").unwrap().1, 234.567);
    assert_eq!(
        extract_dv_hex_string(&entries, "0DFD10").unwrap().1,
        "30313233343536373839"
    );
}

#[test]
fn date_records() {
    let (_, entries) = parse("82 04 6C 5F 1C");
    assert_eq!(
        extract_dv_date(&entries, "82046C").unwrap().1.to_string(),
        "2010-12-31 00:00:00"
    );

    let (_, entries) = parse("42 6C FE 04");
    assert_eq!(
        extract_dv_date(&entries, "426C").unwrap().1.to_string(),
        "2007-04-30 00:00:00"
    );
}

#[test]
fn year_wrap_goes_beyond_2100() {
    let (_, entries) = parse("42 6C E1 F1");
    assert_eq!(
        extract_dv_date(&entries, "426C").unwrap().1.to_string(),
        "2127-01-01 00:00:00"
    );
}

#[test]
fn every_key_is_unique() {
    let (ok, entries) = parse("0B 13 11 00 00 0B 13 22 00 00 0B 13 33 00 00");
    assert!(ok);

    let mut keys: Vec<&str> = entries.keys().collect();
    assert_eq!(keys.len(), 3);
    keys.dedup();
    assert_eq!(keys.len(), 3, "raw keys repeat but map keys must not");

    assert!(entries.get("0B13").is_some());
    assert!(entries.get("0B13_2").is_some());
    assert!(entries.get("0B13_3").is_some());
}

#[test]
fn offsets_point_into_the_body() {
    let (_, entries) = parse("2F 2F 0B 13 56 34 12 04 13 2F 4E 00 00");
    assert_eq!(entries.get("0B13").unwrap().offset, 2);
    assert_eq!(entries.get("0413").unwrap().offset, 7);
}

#[test]
fn truncated_and_unknown_input_keeps_prefix() {
    // Truncated value bytes.
    let (ok, entries) = parse("0B 13 56 34 12 0B 13 56");
    assert!(!ok);
    assert_eq!(entries.len(), 1);

    // Reserved primary VIF 0x6F stops the walk.
    let (ok, entries) = parse("0B 13 56 34 12 02 6F 00 00");
    assert!(!ok);
    assert_eq!(entries.len(), 1);
}
