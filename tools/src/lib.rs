//! Tool worker and the capabilities it can execute.

pub mod weather;
pub mod worker;

pub use weather::GetWeather;
pub use worker::ToolWorker;
