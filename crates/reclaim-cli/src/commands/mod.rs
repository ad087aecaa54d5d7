pub mod campaign;
pub mod event;
pub mod service;
pub mod sweep;
