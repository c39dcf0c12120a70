pub mod accumulator;
pub mod audit;
pub mod capture;
pub mod classify;
pub mod config;
pub mod debounce;
pub mod fields;
pub mod inbox;
pub mod location;
pub mod orchestrator;
pub mod paths;
pub mod pointer;
pub mod roster;
pub mod shaping;
pub mod store;
pub mod util;
