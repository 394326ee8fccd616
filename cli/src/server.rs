//! HTTP routes.
//!
//! * `GET /` greets.
//! * `GET /services?name=<substring>` returns active services as JSON.
//! * `GET /new` renders the example unit file.
//! * `POST /service/new` validates a `name`/`path` form and renders the
//!   example unit file.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use thiserror::Error;

use boxlib::{ConfigOverrides, ServiceLister, ServiceRecord, UnitConfigBuilder};

#[derive(Clone)]
pub struct AppState {
    lister: Arc<dyn ServiceLister>,
    home_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(lister: Arc<dyn ServiceLister>) -> Self {
        Self {
            lister,
            home_dir: None,
        }
    }

    /// Pins the directory `~/` expands to instead of the running user's.
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("malformed form: {0}")]
    MalformedForm(String),

    #[error(transparent)]
    Internal(#[from] boxlib::Error),

    #[error("listing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::MalformedForm(_) => StatusCode::BAD_REQUEST,
            Self::Internal(boxlib::Error::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) | Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "rejected request");
        }
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/services", get(list_services))
        .route("/new", get(example_unit))
        .route("/service/new", post(new_service))
        .with_state(state)
}

async fn hello() -> &'static str {
    "Hello, World!"
}

#[derive(Debug, Deserialize)]
struct ServicesQuery {
    #[serde(default)]
    name: String,
}

async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ServicesQuery>,
) -> Result<Json<Vec<ServiceRecord>>, ApiError> {
    let lister = Arc::clone(&state.lister);
    let filter = query.name;
    let services = tokio::task::spawn_blocking(move || lister.list(&filter)).await??;

    tracing::info!(count = services.len(), "listed services");
    Ok(Json(services))
}

/// Renders the unit for the bundled pocketbase example.
fn render_example(state: &AppState) -> Result<String, ApiError> {
    let mut builder = UnitConfigBuilder::new(
        "pocketbase",
        "~/pb",
        "pocketbase serve yourdomain.com",
    )
    .overrides(ConfigOverrides {
        user: Some("pocketbase".to_string()),
        group: Some("pocketbase".to_string()),
        ..Default::default()
    });
    if let Some(home) = &state.home_dir {
        builder = builder.home_dir(home);
    }
    Ok(builder.build()?.to_string())
}

async fn example_unit(State(state): State<AppState>) -> Result<String, ApiError> {
    render_example(&state)
}

#[derive(Debug, Default, Deserialize)]
struct NewServiceForm {
    name: Option<String>,
    path: Option<String>,
}

impl NewServiceForm {
    /// Fills fields the body left empty from `fallback`.
    fn or(self, fallback: Self) -> Self {
        let pick = |value: Option<String>, fallback: Option<String>| {
            value.filter(|v| !v.is_empty()).or(fallback)
        };
        Self {
            name: pick(self.name, fallback.name),
            path: pick(self.path, fallback.path),
        }
    }
}

/// Form fields from an urlencoded or multipart body, falling back to the
/// query string. A missing or unrecognised body yields empty fields so the
/// handler decides what is required.
struct FormValues(NewServiceForm);

impl<S: Send + Sync> FromRequest<S> for FormValues {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<NewServiceForm>::try_from_uri(req.uri())
            .map(|Query(query)| query)
            .unwrap_or_default();
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let body = if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::MalformedForm(e.body_text()))?;
            read_multipart(multipart).await?
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            Form::<NewServiceForm>::from_request(req, state)
                .await
                .map(|Form(form)| form)
                .map_err(|e| ApiError::MalformedForm(e.body_text()))?
        } else {
            NewServiceForm::default()
        };

        Ok(Self(body.or(query)))
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<NewServiceForm, ApiError> {
    let malformed =
        |e: axum::extract::multipart::MultipartError| ApiError::MalformedForm(e.body_text());
    let mut form = NewServiceForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        match field.name() {
            Some("name") => form.name = Some(field.text().await.map_err(malformed)?),
            Some("path") => form.path = Some(field.text().await.map_err(malformed)?),
            _ => {}
        }
    }
    Ok(form)
}

async fn new_service(
    State(state): State<AppState>,
    FormValues(form): FormValues,
) -> Result<String, ApiError> {
    let name = form.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required"));
    }
    let path = form.path.unwrap_or_default();
    let path = path.trim();
    if path.is_empty() {
        return Err(ApiError::BadRequest("path is required"));
    }
    if !path.starts_with("~/") {
        return Err(ApiError::BadRequest(
            "path must be absolute, try ~/path/to/service",
        ));
    }

    // TODO: build the unit from `name` and `path` once the form also carries the exec command.
    tracing::info!(%name, %path, "new service requested, rendering example unit");
    render_example(&state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FakeLister(&'static str);

    impl ServiceLister for FakeLister {
        fn list(&self, filter: &str) -> boxlib::Result<Vec<ServiceRecord>> {
            Ok(boxlib::parse_list_units(self.0, filter))
        }
    }

    struct FailingLister(fn() -> boxlib::Error);

    impl ServiceLister for FailingLister {
        fn list(&self, _filter: &str) -> boxlib::Result<Vec<ServiceRecord>> {
            Err((self.0)())
        }
    }

    const OUTPUT: &str = "\
UNIT               LOAD   ACTIVE SUB     DESCRIPTION
cron.service       loaded active running Cron
nginx.service      loaded active running Nginx
";

    fn app_with(lister: impl ServiceLister + 'static) -> Router {
        router(AppState::new(Arc::new(lister)).with_home_dir("/home/tester"))
    }

    fn app() -> Router {
        app_with(FakeLister(OUTPUT))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_form(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/service/new")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    const BOUNDARY: &str = "boxman-boundary";

    fn post_multipart(fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::builder()
            .method("POST")
            .uri("/service/new")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn root_says_hello() {
        let (status, body) = send(app(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello, World!");
    }

    #[tokio::test]
    async fn services_returns_all_without_filter() {
        let (status, body) = send(app(), get("/services")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let names: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["Name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["cron.service", "nginx.service"]);
    }

    #[tokio::test]
    async fn services_applies_name_filter() {
        let (status, body) = send(app(), get("/services?name=ngin")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["Name"], "nginx.service");
        assert_eq!(json[0]["Path"], "/etc/systemd/system/nginx.service.service");
    }

    #[tokio::test]
    async fn listing_failure_is_a_server_error() {
        let app = app_with(FailingLister(|| boxlib::Error::Status {
            program: "systemctl".to_string(),
            code: Some(1),
            stderr: "System has not been booted with systemd".to_string(),
        }));
        let (status, body) = send(app, get("/services")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("System has not been booted"));
    }

    #[tokio::test]
    async fn listing_timeout_is_a_gateway_timeout() {
        let app = app_with(FailingLister(|| boxlib::Error::Timeout {
            program: "systemctl".to_string(),
            timeout: Duration::from_millis(20),
        }));
        let (status, body) = send(app, get("/services")).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body.contains("was killed"), "{body}");
    }

    #[tokio::test]
    async fn hung_systemctl_is_killed_before_gateway_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let program = dir.path().join("systemctl");
        std::fs::write(
            &program,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let lister = boxlib::Systemctl::new(program.display().to_string())
            .timeout(Duration::from_millis(100));
        let (status, _) = send(app_with(lister), get("/services")).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "systemctl kept running after the 504");
    }

    #[tokio::test]
    async fn missing_home_dir_is_a_server_error() {
        let error = ApiError::from(boxlib::Error::HomeDirUnavailable);
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, boxlib::Error::HomeDirUnavailable.to_string());
    }

    #[tokio::test]
    async fn new_renders_example_unit() {
        let (status, body) = send(app(), get("/new")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("[Unit]\nDescription=pocketbase service\n\n[Service]\n"));
        assert!(body.contains("User=pocketbase\nGroup=pocketbase\n"));
        assert!(body.contains("ExecStart=/home/tester/pb/pocketbase serve yourdomain.com\n"));
        assert!(body.contains("StandardOutput=append:/home/tester/pb/logs/service.log\n"));
        assert!(body.ends_with("[Install]\nWantedBy=multi-user.target\n"));
    }

    #[tokio::test]
    async fn post_requires_name() {
        let (status, body) = send(app(), post_form("path=~/pb")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "name is required");
    }

    #[tokio::test]
    async fn post_requires_path() {
        let (status, body) = send(app(), post_form("name=pocketbase")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "path is required");

        let (status, _) = send(app(), post_form("name=pocketbase&path=++")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_requires_home_relative_path() {
        for body in ["name=pb&path=/srv/pb", "name=pb&path=pb", "name=pb&path=~pb"] {
            let (status, message) = send(app(), post_form(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(message, "path must be absolute, try ~/path/to/service");
        }
    }

    #[tokio::test]
    async fn post_with_valid_form_renders_example_unit() {
        let (status, body) = send(app(), post_form("name=api&path=%20~/api%20")).await;
        assert_eq!(status, StatusCode::OK);
        let (_, example) = send(app(), get("/new")).await;
        assert_eq!(body, example);
    }

    #[tokio::test]
    async fn post_without_body_requires_name() {
        let request = Request::builder()
            .method("POST")
            .uri("/service/new")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "name is required");
    }

    #[tokio::test]
    async fn post_reads_fields_from_query_string() {
        let request = Request::builder()
            .method("POST")
            .uri("/service/new?name=pb&path=~/pb")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("[Unit]\n"));
    }

    #[tokio::test]
    async fn post_body_fields_take_precedence_over_query() {
        let request = Request::builder()
            .method("POST")
            .uri("/service/new?name=pb&path=~/pb")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("path=/srv/pb"))
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "path must be absolute, try ~/path/to/service");
    }

    #[tokio::test]
    async fn post_accepts_multipart_form() {
        let request = post_multipart(&[("name", "pb"), ("path", "~/pb")]);
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        let (_, example) = send(app(), get("/new")).await;
        assert_eq!(body, example);
    }

    #[tokio::test]
    async fn multipart_form_is_validated() {
        let (status, body) = send(app(), post_multipart(&[("name", "pb")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "path is required");
    }
}
