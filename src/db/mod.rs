pub mod flat_file;
pub mod health_data;
