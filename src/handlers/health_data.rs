pub mod upload_health_data;
