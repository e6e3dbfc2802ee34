pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod observer;
pub mod scheduler;
pub mod service;
pub mod tenant;
pub mod wal;
