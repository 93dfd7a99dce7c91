mod catalog;
mod schema;

pub use catalog::*;
pub use schema::{FieldKind, FieldSpec, NodeSpec, SocketType};
