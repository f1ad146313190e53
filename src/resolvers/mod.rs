//! Default implementations of [crate::resolver::Resolver]

pub mod authority;
pub mod fixed;
pub mod system;
