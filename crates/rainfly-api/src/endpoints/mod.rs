// Feature endpoints
//
// Thin wrappers that map a method call onto a fixed request shape and
// unwrap one field of the response. They hold a clone of the controller
// and carry no state of their own.

pub mod api;
pub mod programs;
pub mod provisioning;
pub mod restrictions;
pub mod watering;
pub mod zones;

pub use api::Api;
pub use programs::Programs;
pub use provisioning::Provisioning;
pub use restrictions::Restrictions;
pub use watering::Watering;
pub use zones::Zones;
