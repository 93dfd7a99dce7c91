pub mod events;
pub mod nodes;
pub mod registry;
