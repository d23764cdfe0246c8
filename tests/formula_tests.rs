//! Formula evaluation over live meter fields: references resolve against
//! the most recent decoded values and convert into the requested unit.

use wmbus_rs::driver::{DriverInfo, DriverRegistry, FieldInfo, MeterType};
use wmbus_rs::dvparser::MeasurementType;
use wmbus_rs::formula::Formula;
use wmbus_rs::manager::MeterManager;
use wmbus_rs::matcher::FieldMatcher;
use wmbus_rs::meter::MeterInfo;
use wmbus_rs::units::{Quantity, Unit};
use wmbus_rs::util::hex::hex_to_bytes;
use wmbus_rs::vif::VifRange;

fn frame(id: &str, records: &str) -> Vec<u8> {
    let idb = hex_to_bytes(id);
    let mut f = vec![0u8, 0x44, 0x2c, 0x2d, idb[3], idb[2], idb[1], idb[0], 0x1b, 0x04];
    f.push(0x78);
    f.extend_from_slice(&hex_to_bytes(records));
    f[0] = (f.len() - 1) as u8;
    f
}

fn heat_registry() -> DriverRegistry {
    let mut reg = DriverRegistry::new();
    reg.register(
        DriverInfo::new("thermix", MeterType::HeatMeter)
            .detect("KAM", 0x1b, 0x04)
            .field(FieldInfo::new(
                "flow_temperature",
                Quantity::Temperature,
                FieldMatcher::build()
                    .measurement(MeasurementType::Instantaneous)
                    .vif_range(VifRange::FlowTemperature),
            ))
            .field(FieldInfo::new(
                "external_temperature",
                Quantity::Temperature,
                FieldMatcher::build()
                    .measurement(MeasurementType::Instantaneous)
                    .vif_range(VifRange::ExternalTemperature),
            ))
            .field(FieldInfo::new(
                "total_energy_consumption",
                Quantity::Energy,
                FieldMatcher::build()
                    .measurement(MeasurementType::Instantaneous)
                    .vif_range(VifRange::EnergyWh),
            ))
            // A field computed from the others on every update.
            .field(
                FieldInfo::new("approx_power", Quantity::Power, FieldMatcher::default())
                    .calculate("total_energy_consumption_kwh / 229 h"),
            ),
    );
    reg
}

/// flow 31 C, external 19 C, total 229 kwh.
const RECORDS: &str = "025B1F000266BE000406E5000000";

#[test]
fn meter_field_references() {
    let mut mgr = MeterManager::new(heat_registry());
    let mi = MeterInfo::parse("boiler", "thermix", "12345678", "").unwrap();
    mgr.add_meter(&mi).unwrap();
    assert!(mgr.handle_telegram(&frame("12345678", RECORDS)));

    let meter = mgr.meter(1).unwrap();
    assert_eq!(meter.numeric_value("flow_temperature", Unit::C), Some(31.0));
    assert_eq!(meter.numeric_value("external_temperature", Unit::C), Some(19.0));

    let f = Formula::parse("flow_temperature_c", Some(meter)).unwrap();
    assert_eq!(f.calculate(Unit::C, Some(meter), None).unwrap(), 31.0);

    let f = Formula::parse(
        "flow_temperature_c + external_temperature_c",
        Some(meter),
    )
    .unwrap();
    assert_eq!(f.calculate(Unit::C, Some(meter), None).unwrap(), 50.0);
}

#[test]
fn meter_field_with_constant() {
    let mut mgr = MeterManager::new(heat_registry());
    let mi = MeterInfo::parse("boiler", "thermix", "12345678", "").unwrap();
    mgr.add_meter(&mi).unwrap();
    mgr.handle_telegram(&frame("12345678", RECORDS));

    let meter = mgr.meter(1).unwrap();
    let f = Formula::parse("total_energy_consumption_kwh + 18 kwh", Some(meter)).unwrap();
    assert_eq!(f.calculate(Unit::Kwh, Some(meter), None).unwrap(), 247.0);
}

#[test]
fn calculated_driver_field() {
    let mut mgr = MeterManager::new(heat_registry());
    let mi = MeterInfo::parse("boiler", "thermix", "12345678", "").unwrap();
    mgr.add_meter(&mi).unwrap();
    mgr.handle_telegram(&frame("12345678", RECORDS));

    // 229 kwh over 229 h = 1 kw.
    let meter = mgr.meter(1).unwrap();
    assert_eq!(meter.numeric_value("approx_power", Unit::Kw), Some(1.0));
}

#[test]
fn unknown_field_is_a_parse_error() {
    let mut mgr = MeterManager::new(heat_registry());
    mgr.add_meter(&MeterInfo::parse("boiler", "thermix", "12345678", "").unwrap())
        .unwrap();
    let meter = mgr.meter(1).unwrap();

    assert!(Formula::parse("bogus_field_kwh + 1 kwh", Some(meter)).is_err());
}

#[test]
fn field_reference_converts_units() {
    let mut mgr = MeterManager::new(heat_registry());
    mgr.add_meter(&MeterInfo::parse("boiler", "thermix", "12345678", "").unwrap())
        .unwrap();
    mgr.handle_telegram(&frame("12345678", RECORDS));

    let meter = mgr.meter(1).unwrap();
    // 229 kwh referenced as mj.
    let f = Formula::parse("total_energy_consumption_mj", Some(meter)).unwrap();
    let v = f.calculate(Unit::Mj, Some(meter), None).unwrap();
    assert!((v - 824.4).abs() < 1e-9);
}
