pub mod action;
pub mod black_scholes;
pub mod error;
pub mod interpolation;
pub mod metrics;
pub mod output;
pub mod position;
pub mod simulator;
pub mod solver;
pub mod status;
pub mod surface;
pub mod timeline;
pub mod types;
