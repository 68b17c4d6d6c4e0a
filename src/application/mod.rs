pub mod commission;
pub mod order_service;
pub mod scheduler;
pub mod settings;
