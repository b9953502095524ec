pub mod db;
pub mod estimate;
pub mod food_log;
pub mod goals;
pub mod models;
pub mod service;
pub mod summary;
