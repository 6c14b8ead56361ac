//! Test modules for the executor crate.


pub mod transactions;
