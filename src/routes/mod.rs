use actix_web::web;

pub mod health_data;
pub mod privacy;
pub mod service_info;

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions {
    pub expose_privacy_test: bool,
}

pub fn init_routes(cfg: &mut web::ServiceConfig, options: RouteOptions) {
    cfg.service(service_info::root);

    let mut v1 = web::scope("/v1").service(health_data::upload_detailed);
    // Lets a caller confirm which real id is behind a stored pseudonym
    if options.expose_privacy_test {
        v1 = v1.service(web::scope("/privacy").service(privacy::anonymization_test));
    }
    cfg.service(v1);
}
