pub mod config;
pub mod diff;
pub mod errors;
pub mod ir;
pub mod logging;
pub mod mining;
pub mod schema;
pub mod scope;
pub mod session;
