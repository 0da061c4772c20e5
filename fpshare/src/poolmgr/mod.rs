pub mod admin;
pub mod cache;
pub mod fetcher;
pub mod fscache;
pub mod gpm;
pub mod metrics;
pub mod pool;
pub mod pool_pod_controller;
pub mod reaper;
