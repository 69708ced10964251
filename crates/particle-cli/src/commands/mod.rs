//! Command implementations for the particle CLI

pub mod call;
pub mod device;
pub mod devices;
pub mod events;
pub mod variable;

pub use call::call;
pub use device::device;
pub use devices::devices;
pub use events::events;
pub use variable::get;
