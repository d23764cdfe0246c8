//! Address expression grammar and telegram matching through the public
//! API, including the sequence semantics pinned for mixed positive and
//! filter-out expressions.

use wmbus_rs::address::{
    does_telegram_match_expressions, is_valid_sequence_of_address_expressions,
    split_address_expressions, Address, AddressExpression, IdentityMode,
};

fn addresses(s: &str) -> Vec<Address> {
    split_address_expressions(s)
        .into_iter()
        .map(|e| Address::new(&e.id, e.mfct, e.version, e.device_type))
        .collect()
}

#[test]
fn sequences_validate() {
    for ok in ["12345678", "*", "!12345678", "12345*", "!123456*", "2222*,!22224444"] {
        assert!(is_valid_sequence_of_address_expressions(ok), "{}", ok);
    }
    for bad in ["", "1234567", "123456789", "!!12345678", "12345678*", "**", "123**"] {
        assert!(!is_valid_sequence_of_address_expressions(bad), "{}", bad);
    }
}

#[test]
fn filter_out_applies_to_whole_telegram() {
    // The wildcard accepts the second address, but the first address hits
    // the filter-out, which vetoes the telegram as a group decision.
    let addrs = addresses("11111111.M=KAM.V=1b.T=16,22222222.M=XXX.V=aa.T=99");
    let exprs = split_address_expressions("*,!1*.V=1b");

    let r = does_telegram_match_expressions(&addrs, &exprs);
    assert!(!r.matched);
    assert!(r.used_wildcard);
}

#[test]
fn wildcard_flag_reflects_how_acceptance_happened() {
    let addrs = addresses("11111111,22222222");

    let r = does_telegram_match_expressions(&addrs, &split_address_expressions("12345678,22*"));
    assert!(r.matched);
    assert!(r.used_wildcard);

    let r =
        does_telegram_match_expressions(&addrs, &split_address_expressions("12345678,22222222"));
    assert!(r.matched);
    assert!(!r.used_wildcard);
}

#[test]
fn identity_append_pins_meter_to_one_device() {
    let telegram = addresses("12345678.M=KAM.V=1b.T=16");
    let mut exprs = split_address_expressions("12*");

    let identity =
        AddressExpression::append_identity(IdentityMode::Full, &telegram, &mut exprs).unwrap();
    assert!(identity.required);
    assert_eq!(exprs.len(), 2);

    // Same device: accepted.
    assert!(does_telegram_match_expressions(&telegram, &exprs).matched);

    // Same prefix, different version: the pinned identity refuses.
    let other = addresses("12345678.M=KAM.V=1c.T=16");
    assert!(!does_telegram_match_expressions(&other, &exprs).matched);
}

#[test]
fn primary_station_addresses() {
    let exprs = split_address_expressions("p5");
    let addrs = vec![Address::new("p5", 0xffff, 0xff, 0xff)];
    assert!(does_telegram_match_expressions(&addrs, &exprs).matched);

    let addrs = vec![Address::new("p6", 0xffff, 0xff, 0xff)];
    assert!(!does_telegram_match_expressions(&addrs, &exprs).matched);
}
