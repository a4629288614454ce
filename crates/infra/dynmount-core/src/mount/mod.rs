mod fstab;
mod linux;
mod manager;
mod types;
pub mod utils;

#[cfg(test)]
mod mock;

pub use fstab::Fstab;
pub use linux::SystemMounter;
pub use manager::MountPrimitives;
pub use types::{MountEntry, UnmountFlags};

#[cfg(test)]
pub use mock::{MockMounter, MountCall};
