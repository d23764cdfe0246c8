//! # wmbus-rs - Wireless M-Bus / M-Bus telegram decoding for utility meters
//!
//! This crate decodes wM-Bus and wired M-Bus telegrams (EN 13757) emitted
//! by water, heat, electricity and gas meters, dispatches each telegram to
//! a matching meter, extracts named measurements with physical units and
//! optionally evaluates user supplied formulas over those measurements.
//!
//! ## Pipeline
//!
//! A raw frame flows through these stages:
//!
//! 1. [`telegram`] parses the DLL/ELL/AFL/TPL layers, resolves keys and
//!    decrypts the body.
//! 2. [`dvparser`] splits the body into typed data records keyed by their
//!    DIF/VIF signature.
//! 3. [`manager`] routes the telegram via [`address`] expressions to one
//!    or more meters.
//! 4. Each [`meter`] walks its driver's declared fields, binds them with
//!    the [`matcher`], computes [`formula`] fields, and converts values
//!    with the [`units`] algebra before emitting its update callback.
//!
//! Transports (serial, TCP, file tailing), output formatting and the
//! shipped driver catalog live outside this crate; drivers plug in
//! through [`driver::DriverRegistry`].
//!
//! ## Usage
//!
//! ```rust
//! use wmbus_rs::driver::{DriverInfo, DriverRegistry, FieldInfo, MeterType};
//! use wmbus_rs::dvparser::MeasurementType;
//! use wmbus_rs::matcher::FieldMatcher;
//! use wmbus_rs::manager::MeterManager;
//! use wmbus_rs::meter::MeterInfo;
//! use wmbus_rs::units::Quantity;
//! use wmbus_rs::vif::VifRange;
//!
//! let mut registry = DriverRegistry::new();
//! registry.register(
//!     DriverInfo::new("aquastream", MeterType::WaterMeter)
//!         .detect("KAM", 0x1b, 0x16)
//!         .field(FieldInfo::new(
//!             "total",
//!             Quantity::Volume,
//!             FieldMatcher::build()
//!                 .measurement(MeasurementType::Instantaneous)
//!                 .vif_range(VifRange::Volume),
//!         )),
//! );
//!
//! let mut manager = MeterManager::new(registry);
//! manager.add_meter_template(MeterInfo::parse("flat", "auto", "*", "").unwrap());
//! // manager.handle_telegram(&frame) for every received frame.
//! ```

pub mod address;
pub mod crypto;
pub mod driver;
pub mod dvparser;
pub mod formula;
pub mod linkmode;
pub mod manager;
pub mod matcher;
pub mod meter;
pub mod telegram;
pub mod translate;
pub mod units;
pub mod util;
pub mod vif;

pub use address::{Address, AddressExpression, IdentityMode};
pub use driver::{DriverInfo, DriverRegistry, FieldInfo};
pub use dvparser::{DVEntry, DifVifKey, Entries, MeasurementType};
pub use formula::Formula;
pub use manager::MeterManager;
pub use matcher::FieldMatcher;
pub use meter::{Meter, MeterInfo};
pub use telegram::{Telegram, TelegramError};
pub use units::{Quantity, Unit};
pub use vif::{VifCombinable, VifRange};
