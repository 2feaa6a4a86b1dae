//! Stream groups
//!
//! One `Group` per stream key ties the inbound source to every player and
//! relay push target; `GroupManager` owns the table of groups.

pub mod hub;
pub mod key;
pub mod manager;
mod relay;

pub use hub::{Group, GroupDeps};
pub use key::StreamKey;
pub use manager::GroupManager;
