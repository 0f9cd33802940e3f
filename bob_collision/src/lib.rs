//! Bob collision: ground sensing, lever rays and the KCC body mover.
#![forbid(unsafe_code)]

pub mod mover;
pub mod query;
pub mod sensor;

pub use mover::{BodyMover, MoveResult, MoverProfile};
pub use query::{RayHit, SpatialQuery};
pub use sensor::{measure_lever, BrakeLever, ColliderGeometry, GroundSensor, NORMAL_RAY_DISTANCE};
