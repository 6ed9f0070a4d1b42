//! Defines routes for bucket and object operations.
//!
//! ## Structure
//! - **Service-level endpoints**
//!   - `GET    /`        — list buckets
//!   - `GET    /healthz` — liveness (no auth)
//!   - `GET    /readyz`  — readiness (no auth)
//!
//! - **Bucket-level endpoints**
//!   - `GET    /{bucket}` — list object ids
//!   - `POST   /{bucket}` — upload one or more objects (multipart `object` fields)
//!
//! - **Object-level endpoints**
//!   - `GET    /{bucket}/{id}`      — download object (honors `If-None-Match`)
//!   - `POST   /{bucket}/{id}`      — replace an existing object
//!   - `DELETE /{bucket}/{id}`      — delete object
//!   - `GET    /{bucket}/{id}/meta` — object metadata as JSON
//!
//! Every route answers `OPTIONS` for CORS preflight, and every response
//! carries the CORS headers browsers need to send `X-ClientId`/`X-Token`.

use crate::{
    AppState,
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object, get_meta, get_object, list_buckets, list_objects, preflight,
            update_object, upload_objects,
        },
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    middleware,
    response::Response,
    routing::get,
};

const ALLOWED_HEADERS: &str =
    "Origin, X-Requested-With, Content-Type, Accept, X-ClientId, X-Token";

/// Build and return the router for all storage routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(list_buckets).options(preflight))
        // Object-level routes
        .route("/{bucket}/{id}/meta", get(get_meta).options(preflight))
        .route(
            "/{bucket}/{id}",
            get(get_object)
                .post(update_object)
                .delete(delete_object)
                .options(preflight),
        )
        // Bucket-level routes
        .route(
            "/{bucket}",
            get(list_objects).post(upload_objects).options(preflight),
        )
        .layer(middleware::map_response(cors_headers))
        // Objects have no size cap; lift axum's 2MB default for multipart bodies.
        .layer(DefaultBodyLimit::disable())
}

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        auth_service::{Authorizer, CredentialStore},
        storage_service::StorageService,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use chrono::Local;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    struct TestApp {
        _dir: tempfile::TempDir,
        state: AppState,
    }

    impl TestApp {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let credentials =
                CredentialStore::from_json(r#"{"alice":"s3cret"}"#).expect("credentials");
            let state = AppState {
                storage: StorageService::new(dir.path()),
                authorizer: Authorizer::new(Arc::new(credentials)),
            };
            Self { _dir: dir, state }
        }

        fn token(&self) -> String {
            self.state
                .authorizer
                .issue_token("alice", Local::now().naive_local())
                .unwrap()
        }

        async fn send(&self, request: Request<Body>) -> Response {
            routes()
                .with_state(self.state.clone())
                .oneshot(request)
                .await
                .unwrap()
        }

        fn authed(&self, method: Method, uri: &str) -> axum::http::request::Builder {
            Request::builder()
                .method(method)
                .uri(uri)
                .header("x-clientid", "alice")
                .header("x-token", self.token())
        }
    }

    fn multipart_body(files: &[(&str, &str, &str)]) -> Body {
        let mut body = String::new();
        for (filename, mime, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"object\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    fn multipart_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_credentials_are_unauthorized() {
        let app = TestApp::new();
        let response = app
            .send(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .send(
                Request::builder()
                    .uri("/")
                    .header("x-clientid", "alice")
                    .header("x-token", "bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let app = TestApp::new();
        let response = app
            .send(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn preflight_carries_cors_headers() {
        let app = TestApp::new();
        let response = app
            .send(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/docs/abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
                .to_str()
                .unwrap()
                .contains("X-Token")
        );
    }

    #[tokio::test]
    async fn upload_list_fetch_and_revalidate() {
        let app = TestApp::new();

        let response = app
            .send(
                app.authed(Method::POST, "/docs")
                    .header(header::CONTENT_TYPE, multipart_type())
                    .body(multipart_body(&[
                        ("a.txt", "text/plain", "hello"),
                        ("b.json", "application/json", "{}"),
                    ]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let ids: Vec<String> = body_json(response).await;
        assert_eq!(ids.len(), 2);

        let response = app
            .send(app.authed(Method::GET, "/").body(Body::empty()).unwrap())
            .await;
        let buckets: Vec<String> = body_json(response).await;
        assert_eq!(buckets, vec!["docs"]);

        let response = app
            .send(app.authed(Method::GET, "/docs").body(Body::empty()).unwrap())
            .await;
        let mut listed: Vec<String> = body_json(response).await;
        listed.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(listed, expected);

        let uri = format!("/docs/{}", ids[0]);
        let response = app
            .send(app.authed(Method::GET, &uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let etag = response.headers()[header::ETAG].clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello");

        let response = app
            .send(
                app.authed(Method::GET, &uri)
                    .header(header::IF_NONE_MATCH, etag.clone())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], etag);

        let response = app
            .send(
                app.authed(Method::GET, &format!("{uri}/meta"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let meta: serde_json::Value = body_json(response).await;
        assert_eq!(meta["user"], "alice");
        assert_eq!(meta["mime"], "text/plain");
    }

    #[tokio::test]
    async fn upload_larger_than_default_body_limit() {
        let app = TestApp::new();
        let large = "x".repeat(3 * 1024 * 1024);
        let response = app
            .send(
                app.authed(Method::POST, "/docs")
                    .header(header::CONTENT_TYPE, multipart_type())
                    .body(multipart_body(&[("big.bin", "application/octet-stream", &large)]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let ids: Vec<String> = body_json(response).await;
        assert_eq!(ids.len(), 1);

        let response = app
            .send(
                app.authed(Method::GET, &format!("/docs/{}", ids[0]))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), large.len());
    }

    #[tokio::test]
    async fn upload_without_object_field_is_bad_request() {
        let app = TestApp::new();
        let response = app
            .send(
                app.authed(Method::POST, "/docs")
                    .header(header::CONTENT_TYPE, multipart_type())
                    .body(multipart_body(&[]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_requires_existing_object() {
        let app = TestApp::new();
        let response = app
            .send(
                app.authed(Method::POST, "/docs/missing.txt")
                    .header(header::CONTENT_TYPE, multipart_type())
                    .body(multipart_body(&[("m.txt", "text/plain", "x")]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app.state
            .storage
            .write_object("docs", Some("note.txt"), None, "v1".into(), "alice")
            .await
            .unwrap();
        let response = app
            .send(
                app.authed(Method::POST, "/docs/note.txt")
                    .header(header::CONTENT_TYPE, multipart_type())
                    .body(multipart_body(&[("note.txt", "text/markdown", "v2")]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let id: String = body_json(response).await;
        assert_eq!(id, "note.txt");

        let meta = app.state.storage.get_meta("docs", "note.txt").await.unwrap();
        assert_eq!(meta.mime_type, "text/markdown");
    }

    #[tokio::test]
    async fn delete_then_fetch_is_not_found() {
        let app = TestApp::new();
        app.state
            .storage
            .write_object("docs", Some("a.txt"), None, "x".into(), "alice")
            .await
            .unwrap();

        let response = app
            .send(app.authed(Method::DELETE, "/docs/a.txt").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        for uri in ["/docs/a.txt", "/docs/a.txt/meta"] {
            let response = app
                .send(app.authed(Method::GET, uri).body(Body::empty()).unwrap())
                .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let response = app
            .send(app.authed(Method::DELETE, "/docs/a.txt").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_unknown_bucket_is_not_found() {
        let app = TestApp::new();
        let response = app
            .send(app.authed(Method::GET, "/nope").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
