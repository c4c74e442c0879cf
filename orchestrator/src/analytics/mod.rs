//! Read-side analytics over the Context Store.
//!
//! Everything here works on a snapshot of episodes and never writes back.

pub mod monitor;
pub mod performance;
pub mod reflexive;

pub use monitor::{MonitorHandle, ReflexiveMonitor};
pub use performance::{PerformanceReport, ProviderPerformance};
pub use reflexive::{assess, ProviderFlag, ReflexiveAssessment, Trend};
