use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use imaginate::core::config::{AppConfig, DeployEnv};
use imaginate::core::context::AppContext;
use imaginate::core::generation::{
    Artifact, ContentInfo, HttpPublisher, HttpSynthesisBackend, ImageStatus, ResultPublisher,
    TextToImageBackend, TextToImageParams,
};

#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Map<String, Value>>>>,
    uploads: Arc<Mutex<Vec<(String, String)>>>,
}

struct FakePeer {
    base_url: String,
    seen: Seen,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl FakePeer {
    async fn start() -> Self {
        let seen = Seen::default();
        let app = Router::new()
            .route("/generate", post(fake_generate))
            .route("/edit", post(fake_generate))
            .route("/image/create", post(fake_create))
            .route("/broken/image/create", post(fake_broken))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            seen,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn bodies(&self) -> Vec<Map<String, Value>> {
        self.seen.bodies.lock().unwrap().clone()
    }

    fn uploads(&self) -> Vec<(String, String)> {
        self.seen.uploads.lock().unwrap().clone()
    }

    fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn fake_generate(
    State(seen): State<Seen>,
    Json(body): Json<Map<String, Value>>,
) -> impl IntoResponse {
    let prompt = body
        .get("prompt")
        .and_then(|p| p.as_str())
        .unwrap_or_default()
        .to_string();
    seen.bodies.lock().unwrap().push(body);
    if prompt == "refuse" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            b"pipeline crashed".to_vec(),
        );
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        b"\x89PNG fake".to_vec(),
    )
}

async fn fake_create(State(seen): State<Seen>, mut multipart: Multipart) -> Json<Value> {
    let mut filename = String::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.unwrap();
            seen.uploads
                .lock()
                .unwrap()
                .push(("file".to_string(), String::from_utf8_lossy(&bytes).to_string()));
        } else {
            let text = field.text().await.unwrap();
            seen.uploads.lock().unwrap().push((name, text));
        }
    }
    Json(json!({ "url": format!("/image/read/{}", filename.replace('.', "-")) }))
}

async fn fake_broken() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, "Invalid date")
}

#[tokio::test]
async fn synthesis_backend_posts_sparse_json_and_returns_body() {
    let peer = FakePeer::start().await;
    let backend = HttpSynthesisBackend::new(
        format!("{}/edit", peer.base_url),
        format!("{}/generate", peer.base_url),
        Duration::from_secs(5),
    );

    let artifact = backend
        .generate(&TextToImageParams::new("grilled cheese").inference_steps(0))
        .await
        .unwrap();
    assert_eq!(artifact, Artifact::new(b"\x89PNG fake".to_vec(), "image/png"));

    let err = backend
        .generate(&TextToImageParams::new("refuse"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("pipeline crashed"));

    let bodies = peer.bodies();
    let mut keys: Vec<_> = bodies[0].keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["num_inference_steps", "prompt"]);
    assert_eq!(bodies[0]["num_inference_steps"], json!(0));
    peer.shutdown();
}

#[tokio::test]
async fn publisher_uploads_multipart_and_extracts_identifier() {
    let peer = FakePeer::start().await;
    let publisher = HttpPublisher::new(&peer.base_url, "/image/create", Duration::from_secs(5));

    let mut info = ContentInfo::new("soup.jpg", 1722571200, "soup", true);
    info.status = ImageStatus::Verified;
    let id = publisher
        .publish(&Artifact::new(b"jpeg bytes".to_vec(), "image/jpeg"), &info)
        .await
        .unwrap();
    assert_eq!(id, "soup-jpg");

    let uploads = peer.uploads();
    let field = |name: &str| {
        uploads
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(field("real").as_deref(), Some("true"));
    assert_eq!(field("date").as_deref(), Some("1722571200"));
    assert_eq!(field("theme").as_deref(), Some("soup"));
    assert_eq!(field("status").as_deref(), Some("verified"));
    assert_eq!(field("file").as_deref(), Some("jpeg bytes"));
    peer.shutdown();
}

#[tokio::test]
async fn publisher_surfaces_store_errors() {
    let peer = FakePeer::start().await;
    let publisher = HttpPublisher::new(
        &peer.base_url,
        "/broken/image/create",
        Duration::from_secs(5),
    );
    let err = publisher
        .publish(
            &Artifact::new(b"x".to_vec(), "image/jpeg"),
            &ContentInfo::new("x.jpg", 1722484800, "x", false),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid date"));
    peer.shutdown();
}

#[tokio::test]
async fn context_wires_http_pipeline_end_to_end() {
    let peer = FakePeer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::parse(&format!(
        r#"
[publisher]
base_url = "{base}"

[backends]
image_edit_url = "{base}/edit"
text_to_image_url = "{base}/generate"
timeout_secs = 5
"#,
        base = peer.base_url
    ))
    .unwrap();
    let ctx = AppContext::from_parts(DeployEnv::Dev, dir.path().to_path_buf(), config)
        .await
        .unwrap();

    let service = ctx.start_generation();
    service
        .submit_text_to_image(
            ContentInfo::new("cheese.jpg", 1722484800, "cheese", false),
            TextToImageParams::new("grilled cheese"),
        )
        .unwrap();
    service
        .submit_text_to_image(
            ContentInfo::new("never.jpg", 1722484800, "never", false),
            TextToImageParams::new("refuse"),
        )
        .unwrap();
    let stats = service.shutdown().await;

    assert_eq!(stats.published, 1);
    assert_eq!(stats.synthesis_failures, 1);
    let uploads = peer.uploads();
    assert!(uploads.iter().any(|(k, v)| k == "theme" && v == "cheese"));
    assert!(!uploads.iter().any(|(k, v)| k == "theme" && v == "never"));
    peer.shutdown();
}
