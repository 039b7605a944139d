//! Seismic Hazard - logic-tree PSHA, disaggregation and GCIM ground motion selection

pub mod batch;
pub mod core;
pub mod data;
pub mod disagg;
pub mod gms;
pub mod hazard;
pub mod tree;
