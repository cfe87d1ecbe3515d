// src/handlers/index.rs
use actix_web::{ web, HttpResponse };
use serde_json::json;
use std::sync::Arc;
use crate::crawler::{ PipelineMonitor, PipelineStatus };

pub type Monitors = Vec<Arc<dyn PipelineMonitor>>;

pub async fn index(monitors: web::Data<Monitors>) -> HttpResponse {
    let pipelines: Vec<PipelineStatus> = monitors.iter().map(|m| m.status()).collect();
    HttpResponse::Ok().json(json!({ "status": "ok", "pipelines": pipelines }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::server::Kind;
    use actix_web::{ test, App };

    struct FixedMonitor;

    impl PipelineMonitor for FixedMonitor {
        fn status(&self) -> PipelineStatus {
            PipelineStatus { kind: Kind::Discord, servers: 12, dirty: 3 }
        }
    }

    #[actix_web::test]
    async fn test_index_reports_pipelines() {
        let monitors: Monitors = vec![Arc::new(FixedMonitor)];
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(monitors))
                .route("/", web::get().to(index))
        ).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pipelines"][0]["kind"], "discord");
        assert_eq!(body["pipelines"][0]["servers"], 12);
        assert_eq!(body["pipelines"][0]["dirty"], 3);
    }
}
