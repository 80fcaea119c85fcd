//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving vision pipeline messages
//! - `mqtt_egress` - MQTT publisher for egress events
//! - `egress_channel` - Typed channel for MQTT egress messages
//! - `egress` - Notification output to file (JSONL format)
//! - `belt` - Seatbelt sensor monitoring over sysfs GPIO
//! - `enrollment` - Enrolled passenger store (JSON file)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod belt;
pub mod egress;
pub mod egress_channel;
pub mod enrollment;
pub mod mqtt;
pub mod mqtt_egress;
pub mod prometheus;

// Re-export commonly used types
pub use belt::BeltMonitor;
pub use egress::Egress;
pub use egress_channel::{
    create_egress_channel, CabinSnapshotPayload, EgressMessage, EgressSender, NotificationPayload,
    SeatSnapshot,
};
pub use enrollment::load_enrollment;
pub use mqtt_egress::MqttPublisher;
