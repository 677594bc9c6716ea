#[cfg(test)]
mod tests {
    use crate::collector::registry::build_collectors;
    use crate::collector::test_util::sap_control;
    use crate::config::ExporterConfig;
    use crate::handlers::{configure, AppState};
    use crate::sapcontrol::fake_web_service::{endpoint_of, process, FakeWebService};
    use actix_web::{test, web, App};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn state(fake: FakeWebService) -> web::Data<AppState> {
        let (_, sap) = sap_control(fake);
        let collectors = build_collectors(&ExporterConfig::default(), sap.clone(), None);
        web::Data::new(AppState {
            collectors,
            sap,
            scrape_timeout: Duration::from_secs(5),
        })
    }

    #[actix_rt::test]
    async fn test_metrics_endpoint() {
        let mut fake = FakeWebService::with_instances(2);
        fake.processes
            .insert(endpoint_of(0), vec![process("disp+work", "SAPControl-GREEN")]);
        let app = test::init_service(App::new().app_data(state(fake)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("# TYPE sap_start_service_instances gauge"));
        assert!(text.contains("sap_start_service_processesperinstance_green{"));
        assert!(text.contains("sap_cache_misses_total{cache=\"instances\"}"));
        // 2 instances, all ABAP
        assert!(text.contains("instance_name=\"D01\""));
    }

    #[actix_rt::test]
    async fn test_failing_collectors_do_not_fail_the_scrape() {
        let fake = FakeWebService::with_instances(2);
        fake.fail_list.store(true, Ordering::SeqCst);
        let app = test::init_service(App::new().app_data(state(fake)).configure(configure)).await;

        // collectors run concurrently, later scrapes see the cached failure
        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/metrics").to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }
        let req = test::TestRequest::get().uri("/metrics").to_request();
        let text = String::from_utf8(test::call_and_read_body(&app, req).await.to_vec()).unwrap();
        assert!(!text.contains("sap_start_service_instances"));
        assert!(text.contains("sap_cache_entries{cache=\"instances\"} 1"));
    }

    #[actix_rt::test]
    async fn test_cache_stats_endpoint() {
        let data = state(FakeWebService::with_instances(1));
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/cache/stats").to_request();
        let reports: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reports[0]["cache"], "instances");
        assert_eq!(reports[0]["entries"], 1);
        assert_eq!(reports[0]["stats"]["misses"], 1);
        assert_eq!(reports[1]["cache"], "processes");
    }

    #[actix_rt::test]
    async fn test_landing_page() {
        let app = test::init_service(
            App::new()
                .app_data(state(FakeWebService::with_instances(0)))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("href=\"/metrics\""));
    }
}
