pub mod controller;
pub mod device_session;
pub mod drain_latch;
pub mod error_signal;
