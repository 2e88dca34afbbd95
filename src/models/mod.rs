pub mod health_data;
pub mod validation;
