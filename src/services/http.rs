use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::photos::PhotoStore;
use super::ServiceError;
use crate::repositories::Storage;

mod clients;
mod photos;
mod visits;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub photo_store: Arc<dyn PhotoStore>,
    pub max_photo_bytes: usize,
}

/// Local photo directory exposed read-only under `public_path`.
pub struct StaticPhotos {
    pub public_path: String,
    pub directory: PathBuf,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) | ServiceError::Upload(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match self {
            ServiceError::Storage { context, details } => {
                log::error!("{}: {}", context, details);
                context
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

/// Path ids must be integers; anything else is rejected before lookup.
fn parse_id(raw: &str, what: &str) -> Result<i32, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::Validation(format!("Invalid {} ID", what)))
}

fn parse_positive(name: &str, raw: Option<&str>) -> Result<Option<u32>, ServiceError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => match value.parse::<u32>() {
            Ok(number) if number > 0 => Ok(Some(number)),
            _ => Err(ServiceError::Validation(format!(
                "{} must be a positive integer",
                name
            ))),
        },
    }
}

pub fn router(state: AppState, static_photos: Option<StaticPhotos>) -> Router {
    // Generous enough that an oversize photo still reaches the handler and
    // gets a proper JSON rejection.
    let photo_body_limit = DefaultBodyLimit::max(state.max_photo_bytes.saturating_mul(2));

    let api = Router::new()
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/{id}",
            get(clients::get_client)
                .patch(clients::update_client)
                .delete(clients::delete_client),
        )
        .route(
            "/clients/{id}/photo",
            post(photos::upload_client_photo).layer(photo_body_limit),
        )
        .route("/visits", get(visits::list_visits).post(visits::create_visit))
        .route(
            "/visits/{id}",
            get(visits::get_visit)
                .patch(visits::update_visit)
                .delete(visits::delete_visit),
        );

    let mut app = Router::new()
        .nest("/api", api)
        .route("/health", get(|| async { "OK" }));

    if let Some(static_photos) = static_photos {
        app = app.nest_service(
            &static_photos.public_path,
            ServeDir::new(static_photos.directory),
        );
    }

    app.with_state(state).layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    state: AppState,
    static_photos: Option<StaticPhotos>,
    listen: &str,
) -> Result<(), anyhow::Error> {
    let app = router(state, static_photos);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::repositories::MemStorage;
    use crate::services::photos::LocalPhotoStore;
    use crate::settings::DEFAULT_MAX_PHOTO_BYTES;

    const BOUNDARY: &str = "clientbook-test-boundary";

    fn test_app(dir: &Path) -> Router {
        let state = AppState {
            storage: Arc::new(MemStorage::new()),
            photo_store: Arc::new(LocalPhotoStore::new(dir, "/uploads")),
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
        };

        router(
            state,
            Some(StaticPhotos {
                public_path: "/uploads".to_string(),
                directory: dir.to_path_buf(),
            }),
        )
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        (status, body)
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    /// Each part is `(field name, file name, content type, bytes)`.
    fn multipart_request(uri: &str, parts: &[(&str, &str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content_type, data) in parts {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, name, file_name, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn create_ann(app: &Router) -> Value {
        let (status, client) = send(
            app,
            json_request(
                Method::POST,
                "/api/clients",
                json!({"firstName": "Ann", "lastName": "Lee", "phone": "555-0001"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        client
    }

    #[tokio::test]
    async fn client_and_visit_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        let client = create_ann(&app).await;
        assert_eq!(client["id"], 1);
        assert_eq!(client["status"], "active");
        assert_eq!(client["email"], Value::Null);

        let (status, visit) = send(
            &app,
            json_request(
                Method::POST,
                "/api/visits",
                json!({"clientId": 1, "date": "2024-01-10", "price": "42.50"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(visit["price"], "42.50");
        assert_eq!(visit["date"], "2024-01-10T19:00:00Z");

        let (status, visits) = send(&app, get_request("/api/visits?clientId=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(visits["total"], 1);
        assert_eq!(visits["visits"][0]["id"], visit["id"]);
    }

    #[tokio::test]
    async fn visit_for_missing_client_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/visits",
                json!({"clientId": 9, "date": "2024-01-10"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Client not found");

        let (_, visits) = send(&app, get_request("/api/visits")).await;
        assert_eq!(visits["total"], 0);
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        let (status, body) = send(&app, get_request("/api/clients/abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid client ID");

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/clients",
                json!({"firstName": "Ann", "phone": "555-0001"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("lastName"));

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/visits",
                json!({"clientId": 1, "date": "someday"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid date: someday");

        let (status, _) = send(&app, get_request("/api/clients?page=0&limit=10")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, get_request("/api/clients?status=vip")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, get_request("/api/visits/7")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Visit not found");
    }

    #[tokio::test]
    async fn update_and_delete_client() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let client = create_ann(&app).await;

        let (status, unchanged) =
            send(&app, json_request(Method::PATCH, "/api/clients/1", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(unchanged, client);

        let (status, updated) = send(
            &app,
            json_request(
                Method::PATCH,
                "/api/clients/1",
                json!({"status": "inactive", "city": "Springfield", "id": 42}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], 1);
        assert_eq!(updated["status"], "inactive");
        assert_eq!(updated["city"], "Springfield");
        assert_eq!(updated["createdAt"], client["createdAt"]);

        send(
            &app,
            json_request(
                Method::POST,
                "/api/visits",
                json!({"clientId": 1, "date": "2024-01-10"}),
            ),
        )
        .await;

        let (status, body) = send(&app, delete_request("/api/clients/1")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = send(&app, get_request("/api/clients/1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, visits) = send(&app, get_request("/api/visits")).await;
        assert_eq!(visits["total"], 0);

        let (status, _) = send(&app, delete_request("/api/clients/1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_clients_sorts_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        for (first, last) in [("Ann", "Lee"), ("Cal", "Adams"), ("Bea", "Moss")] {
            send(
                &app,
                json_request(
                    Method::POST,
                    "/api/clients",
                    json!({"firstName": first, "lastName": last, "phone": "555"}),
                ),
            )
            .await;
        }

        let (_, page) = send(&app, get_request("/api/clients?page=2&limit=2")).await;
        assert_eq!(page["total"], 3);
        assert_eq!(page["clients"].as_array().unwrap().len(), 1);
        assert_eq!(page["clients"][0]["lastName"], "Moss");

        let (_, sorted) = send(
            &app,
            get_request("/api/clients?sortBy=firstName&sortDirection=desc"),
        )
        .await;
        assert_eq!(sorted["clients"][0]["firstName"], "Cal");

        let (_, fallback) = send(&app, get_request("/api/clients?sortBy=favoriteColor")).await;
        assert_eq!(fallback["clients"][0]["lastName"], "Adams");

        let (_, found) = send(&app, get_request("/api/clients?search=MOS")).await;
        assert_eq!(found["total"], 1);
    }

    #[tokio::test]
    async fn visit_update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        create_ann(&app).await;

        let (_, visit) = send(
            &app,
            json_request(
                Method::POST,
                "/api/visits",
                json!({"clientId": 1, "date": "2024-01-10", "formula": "7N", "price": 60}),
            ),
        )
        .await;
        let uri = format!("/api/visits/{}", visit["id"]);

        let (status, updated) = send(
            &app,
            json_request(
                Method::PATCH,
                &uri,
                json!({"price": null, "notes": "Root touch-up", "date": "2024-02-01"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["price"], Value::Null);
        assert_eq!(updated["formula"], "7N");
        assert_eq!(updated["notes"], "Root touch-up");
        assert_eq!(updated["date"], "2024-02-01T19:00:00Z");

        let (status, body) = send(
            &app,
            json_request(Method::PATCH, &uri, json!({"clientId": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Client not found");

        let (status, _) = send(&app, delete_request(&uri)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, get_request(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            json_request(Method::PATCH, &uri, json!({"clientId": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Visit not found");
    }

    #[tokio::test]
    async fn search_visits_within_one_client() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        create_ann(&app).await;
        send(
            &app,
            json_request(
                Method::POST,
                "/api/clients",
                json!({"firstName": "Bob", "lastName": "Ray", "phone": "555-0002"}),
            ),
        )
        .await;

        for (client_id, service, notes) in [
            (1, "Balayage", Value::Null),
            (1, "Trim", json!("Wants balayage in spring")),
            (1, "Gloss", Value::Null),
            (2, "Balayage", Value::Null),
        ] {
            let (status, _) = send(
                &app,
                json_request(
                    Method::POST,
                    "/api/visits",
                    json!({
                        "clientId": client_id,
                        "date": "2024-01-10",
                        "service": service,
                        "notes": notes,
                    }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, visits) =
            send(&app, get_request("/api/visits?clientId=1&search=BALAYAGE")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(visits["total"], 2);
        for visit in visits["visits"].as_array().unwrap() {
            assert_eq!(visit["clientId"], 1);
        }

        let (_, visits) = send(&app, get_request("/api/visits?search=gloss")).await;
        assert_eq!(visits["total"], 1);
        assert_eq!(visits["visits"][0]["service"], "Gloss");
    }

    #[tokio::test]
    async fn huge_page_number_returns_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        create_ann(&app).await;

        let (status, page) = send(
            &app,
            get_request("/api/clients?page=4294967295&limit=4294967295"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["clients"], json!([]));
    }

    #[tokio::test]
    async fn photo_upload_stores_and_serves_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        create_ann(&app).await;

        let png = vec![7u8; 1024 * 1024];
        let (status, body) = send(
            &app,
            multipart_request(
                "/api/clients/1/photo",
                &[("photo", "portrait.png", "image/png", png.as_slice())],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let photo_url = body["photoUrl"].as_str().unwrap().to_string();
        assert!(photo_url.starts_with("/uploads/clients/1/"));
        assert!(photo_url.ends_with(".png"));
        assert_eq!(body["client"]["photoUrl"], photo_url);

        let (_, client) = send(&app, get_request("/api/clients/1")).await;
        assert_eq!(client["photoUrl"], photo_url);

        let response = app.clone().oneshot(get_request(&photo_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let served = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(served.len(), png.len());
    }

    #[tokio::test]
    async fn photo_upload_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        create_ann(&app).await;

        let too_big = vec![0u8; 6 * 1024 * 1024];
        let (status, body) = send(
            &app,
            multipart_request(
                "/api/clients/1/photo",
                &[("photo", "big.png", "image/png", too_big.as_slice())],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "File too large. Maximum size is 5 MB.");

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/clients/1/photo",
                &[("photo", "notes.pdf", "application/pdf", &b"%PDF"[..])],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Invalid file type. Only JPG, PNG, and GIF files are allowed."
        );

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/clients/1/photo",
                &[
                    ("photo", "a.png", "image/png", &b"a"[..]),
                    ("photo", "b.png", "image/png", &b"b"[..]),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Multiple files not supported");

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/clients/1/photo",
                &[("avatar", "a.png", "image/png", &b"a"[..])],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No file uploaded");

        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/clients/1/photo", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            multipart_request(
                "/api/clients/8/photo",
                &[("photo", "a.png", "image/png", &b"a"[..])],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Client not found");

        let (_, client) = send(&app, get_request("/api/clients/1")).await;
        assert_eq!(client["photoUrl"], Value::Null);
    }

    #[tokio::test]
    async fn health_check() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        let (status, body) = send(&app, get_request("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
