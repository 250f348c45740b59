pub mod access;
pub mod analytics;
pub mod booking;
pub mod filtering;
pub mod lifecycle;
