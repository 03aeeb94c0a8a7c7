//! gwr-schemas
//!
//! Gateway configuration entities shared by every other crate: the closed
//! [`Entity`] union, [`EntityKind`] with its static dependency order, and
//! [`ForeignRef`] associations.

mod entity;
mod foreign;
mod kind;

pub use entity::{
    Association, Certificate, Consumer, Entity, EntityRecord, Plugin, Route, Service, Target,
    Upstream,
};
pub use foreign::{same_optional_target, ForeignRef};
pub use kind::EntityKind;
