// landing.rs
use actix_web::{HttpResponse, Responder};

const LANDING_PAGE: &str = r#"<html>
<head><title>SAP System Exporter</title></head>
<body>
<h1>SAP System Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/cache/stats">Cache statistics</a></p>
</body>
</html>
"#;

pub async fn handle_landing() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(LANDING_PAGE)
}
