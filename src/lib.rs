pub mod config;
pub mod errors;
pub mod form;
pub mod lang;
pub mod logging;
pub mod tracker;
