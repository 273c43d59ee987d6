use thiserror::Error;

pub mod config;
pub mod element;
pub mod property;
pub mod user;

pub use element::{Edge, Element, ElementId, Entity, IdentifierType, SeedMatching};
pub use property::{Properties, PropertyValue, ValueClass};
pub use user::User;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("expected a {expected} value but found {actual}")]
    ClassMismatch { expected: ValueClass, actual: ValueClass },

    #[error("unknown value class: {0}")]
    UnknownClass(String),
}
