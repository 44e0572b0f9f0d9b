//! Virtual folder list and permission model.

pub mod controller;
pub mod permissions;

pub use controller::{FolderListController, FOLDER_CREATED, FOLDER_DELETED};
pub use permissions::{has_capability, EffectivePermission};
