//! Processing node abstraction shared by the decode and reassembly stages.

pub mod traits;

pub use traits::Node;
