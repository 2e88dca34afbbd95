pub mod health_data;
pub mod privacy;
pub mod service_info;
