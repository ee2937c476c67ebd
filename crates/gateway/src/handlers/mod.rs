pub mod auth;
pub mod bills;
pub mod boxes;
pub mod shops;
pub mod telemetry;
