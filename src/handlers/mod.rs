pub mod landing;
pub mod metrics_handler;
mod test_handlers;

pub use metrics_handler::AppState;

use actix_web::web;

/// `/`, `/metrics`, `/cache/stats`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(landing::handle_landing))
        .route("/metrics", web::get().to(metrics_handler::handle_metrics))
        .route("/cache/stats", web::get().to(metrics_handler::handle_cache_stats));
}
