pub mod analytics;
pub mod attendance;
pub mod department;
pub mod employee;
pub mod health;
pub mod performance;
