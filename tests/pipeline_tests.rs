//! End to end pipeline: encrypted frames through template instantiation,
//! key handling, field decoding and listener fan-out.

use std::cell::RefCell;
use std::rc::Rc;

use wmbus_rs::crypto::AesKey;
use wmbus_rs::driver::{DriverInfo, DriverRegistry, FieldInfo, MeterType};
use wmbus_rs::dvparser::MeasurementType;
use wmbus_rs::manager::MeterManager;
use wmbus_rs::matcher::FieldMatcher;
use wmbus_rs::meter::MeterInfo;
use wmbus_rs::telegram::decrypt::encrypt_tpl_mode5;
use wmbus_rs::translate::{MapType, TranslateLookup, TranslateMap, TranslateRule};
use wmbus_rs::units::{Quantity, Unit};
use wmbus_rs::util::hex::hex_to_bytes;
use wmbus_rs::vif::VifRange;

const KEY: &str = "00112233445566778899aabbccddeeff";

fn registry() -> DriverRegistry {
    let mut reg = DriverRegistry::new();
    reg.register(
        DriverInfo::new("aquastream", MeterType::WaterMeter)
            .detect("KAM", 0x1b, 0x16)
            .field(FieldInfo::new(
                "total",
                Quantity::Volume,
                FieldMatcher::build()
                    .measurement(MeasurementType::Instantaneous)
                    .vif_range(VifRange::Volume),
            ))
            .field(FieldInfo::new(
                "max_flow",
                Quantity::Flow,
                FieldMatcher::build()
                    .measurement(MeasurementType::Maximum)
                    .vif_range(VifRange::VolumeFlow),
            ))
            .field(
                FieldInfo::new("status", Quantity::Text, FieldMatcher::build()
                    .vif_range(VifRange::ErrorFlags))
                    .lookup(TranslateLookup::new().add(
                        TranslateRule::new("ERROR_FLAGS", MapType::BitToString)
                            .mask(0xffff)
                            .add(TranslateMap::set(0x0001, "DRY"))
                            .add(TranslateMap::set(0x0002, "REVERSE")),
                    )),
            ),
    );
    reg
}

/// total 123.456 m3, max flow 0.231 m3h, error flags DRY.
const RECORDS: &str = "2F2F0B135634121B3B31020002FD170100";

fn plain_frame(id: &str) -> Vec<u8> {
    let idb = hex_to_bytes(id);
    let mut f = vec![0u8, 0x44, 0x2c, 0x2d, idb[3], idb[2], idb[1], idb[0], 0x1b, 0x16];
    f.push(0x78);
    f.extend_from_slice(&hex_to_bytes(RECORDS));
    f[0] = (f.len() - 1) as u8;
    f
}

fn encrypted_frame(id: &str) -> Vec<u8> {
    let key = AesKey::from_hex(KEY).unwrap();
    let mut body = hex_to_bytes(RECORDS);
    while body.len() % 16 != 0 {
        body.push(0x2F);
    }

    let idb = hex_to_bytes(id);
    let addr8 = [0x2c, 0x2d, idb[3], idb[2], idb[1], idb[0], 0x1b, 0x16];
    let acc = 0x5a;
    let encrypted = encrypt_tpl_mode5(&body, &key, &addr8, acc).unwrap();

    let mut f = vec![0u8, 0x44];
    f.extend_from_slice(&addr8);
    f.push(0x7A);
    f.push(acc);
    f.push(0x00);
    let cfg: u16 = 0x0500 | (((body.len() / 16) as u16) << 4);
    f.extend_from_slice(&cfg.to_le_bytes());
    f.extend_from_slice(&encrypted);
    f[0] = (f.len() - 1) as u8;
    f
}

fn assert_decoded(mgr: &MeterManager, index: usize) {
    let meter = mgr.meter(index).unwrap();
    assert_eq!(meter.numeric_value("total", Unit::M3), Some(123.456));
    assert_eq!(meter.numeric_value("total", Unit::L), Some(123456.0));
    assert_eq!(meter.numeric_value("max_flow", Unit::M3h), Some(0.231));
    assert_eq!(meter.string_value("status"), Some("DRY"));
}

#[test]
fn plain_telegram_through_concrete_meter() {
    let mut mgr = MeterManager::new(registry());
    mgr.add_meter(&MeterInfo::parse("tapwater", "aquastream", "12345678", "").unwrap())
        .unwrap();

    assert!(mgr.handle_telegram(&plain_frame("12345678")));
    assert_decoded(&mgr, 1);
}

#[test]
fn encrypted_telegram_needs_the_key() {
    let mut mgr = MeterManager::new(registry());
    mgr.add_meter(&MeterInfo::parse("tapwater", "aquastream", "12345678", KEY).unwrap())
        .unwrap();

    assert!(mgr.handle_telegram(&encrypted_frame("12345678")));
    assert_decoded(&mgr, 1);
}

#[test]
fn wrong_key_leaves_telegram_unhandled() {
    let mut mgr = MeterManager::new(registry());
    mgr.add_meter(
        &MeterInfo::parse(
            "tapwater",
            "aquastream",
            "12345678",
            "ffffffffffffffffffffffffffffffff",
        )
        .unwrap(),
    )
    .unwrap();

    assert!(!mgr.handle_telegram(&encrypted_frame("12345678")));
    assert_eq!(mgr.meter(1).unwrap().num_updates(), 0);
}

#[test]
fn template_with_key_spawns_decrypting_meters() {
    let mut mgr = MeterManager::new(registry());
    mgr.add_meter_template(MeterInfo::parse("zone", "auto", "12*", KEY).unwrap());

    assert!(mgr.handle_telegram(&encrypted_frame("12345678")));
    assert!(mgr.handle_telegram(&encrypted_frame("12999999")));
    assert_eq!(mgr.meters().len(), 2);
    assert_decoded(&mgr, 1);
    assert_decoded(&mgr, 2);
    assert!(mgr.has_all_meters_received_a_telegram());

    // Both meters resolved their driver via the detection triplet.
    assert_eq!(mgr.meter(1).unwrap().driver_name(), "aquastream");
}

#[test]
fn listener_fanout_and_update_order() {
    let events: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let mut mgr = MeterManager::new(registry());
    let e = events.clone();
    mgr.when_meter_added(move |m| e.borrow_mut().push(format!("added {}", m.name())));
    let e = events.clone();
    mgr.when_meter_updated(move |m| e.borrow_mut().push(format!("updated {}", m.name())));
    let e = events.clone();
    mgr.on_telegram(move |_, handled| e.borrow_mut().push(format!("telegram {}", handled)));

    mgr.add_meter_template(MeterInfo::parse("zone", "aquastream", "12*", KEY).unwrap());
    mgr.handle_telegram(&encrypted_frame("12345678"));
    mgr.handle_telegram(&encrypted_frame("12345678"));

    assert_eq!(
        *events.borrow(),
        vec![
            "added zone".to_string(),
            "updated zone".to_string(),
            "telegram true".to_string(),
            "updated zone".to_string(),
            "telegram true".to_string(),
        ]
    );
}

#[test]
fn analysis_reports_best_driver() {
    let mut reg = registry();
    reg.register(
        DriverInfo::new("volumeonly", MeterType::WaterMeter).field(FieldInfo::new(
            "total",
            Quantity::Volume,
            FieldMatcher::build().vif_range(VifRange::Volume),
        )),
    );
    let mgr = MeterManager::new(reg);

    let result = mgr
        .analyze_telegram(&encrypted_frame("12345678"), Some(KEY))
        .unwrap();
    assert_eq!(result.driver, "aquastream");
    assert_eq!(result.understood_fields, 3);
    assert_eq!(result.total_entries, 3);
}
