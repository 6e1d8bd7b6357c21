pub mod aggregate;
pub mod config;
pub mod error;
pub mod output;
pub mod params;
pub mod readers;
pub mod series;
pub mod stats;
pub mod table;
pub mod timezone;
