//! Default implementations of [crate::probe::Connector]

pub mod tcp;
