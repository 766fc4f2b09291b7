use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, State,
    },
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use uuid::Uuid;

use crate::error::{AnalysisError, TrackerError};
use crate::handlers::{AnalysisHandler, MealLogger, TrackerService};
use crate::models::{AnalyzeFoodBody, LogMealInput, WeightSettings};
use crate::services::image_store::{ImageStore, IMAGE_ROUTE};

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub analysis: Arc<AnalysisHandler>,
    pub meals: Arc<MealLogger>,
    pub tracker: Arc<TrackerService>,
    pub images: Arc<ImageStore>,
}

/// Error body shared by every endpoint: `{ "error": ..., "details": ... }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: &'static str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    details: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let status = match &err {
            AnalysisError::InvalidRequest(_) | AnalysisError::Schema(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AnalysisError::Configuration(_) | AnalysisError::Parse { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let error = match &err {
            // Do not leak which setting is missing
            AnalysisError::Configuration(_) => "AI service is not configured".to_string(),
            _ => err.to_string(),
        };
        log::error!("❌ Food analysis failed ({}): {}", err.kind(), err);

        ApiError {
            status,
            error,
            details: "Failed to analyze food",
        }
    }
}

macro_rules! rejection_into_api_error {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    log::warn!("⚠️ Rejected request: {}", rejection.body_text());
                    ApiError {
                        status: rejection.status(),
                        error: rejection.body_text(),
                        details: "Invalid request",
                    }
                }
            }
        )*
    };
}

rejection_into_api_error!(JsonRejection, PathRejection, QueryRejection, MultipartRejection);

/// `Json` whose rejections render as `ApiError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
struct ApiPath<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
struct ApiQuery<T>(T);

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Analysis(e) => e.into(),
            TrackerError::Invalid(msg) => ApiError {
                status: StatusCode::BAD_REQUEST,
                error: msg,
                details: "Invalid request",
            },
            TrackerError::NotFound(what) => ApiError {
                status: StatusCode::NOT_FOUND,
                error: format!("{} not found", what),
                details: "Not found",
            },
            TrackerError::Storage(e) => {
                log::error!("❌ Storage error: {:#}", e);
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "Failed to access storage".to_string(),
                    details: "Storage error",
                }
            }
        }
    }
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ])
}

pub fn create_router(state: AppState) -> Router {
    let image_files = ServeDir::new(state.images.root().to_path_buf());

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/analyze-food", post(analyze_food).options(preflight))
        .route("/api/users/:user_id/profile", get(get_profile))
        .route("/api/users/:user_id/weight", put(update_weight))
        .route("/api/users/:user_id/meals", post(log_meal).get(list_meals))
        .route("/api/users/:user_id/water", put(set_water).post(add_water))
        .route("/api/users/:user_id/summary", get(daily_summary))
        .route(
            "/api/users/:user_id/images",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .nest_service(IMAGE_ROUTE, image_files)
        .layer(cors_layer())
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Nutrition Tracker API - POST /analyze-food to analyze a meal"
}

async fn health_check() -> &'static str {
    "OK"
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn analyze_food(State(state): State<AppState>, body: String) -> Result<Response, ApiError> {
    // Parse by hand so malformed bodies get the same error shape as everything else
    let body: AnalyzeFoodBody = serde_json::from_str(&body)
        .map_err(|e| AnalysisError::InvalidRequest(format!("Invalid request body: {}", e)))?;

    let record = state.analysis.analyze_body(body).await?;
    Ok(Json(record).into_response())
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<NaiveDate>,
}

impl DateQuery {
    fn or_today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }
}

async fn get_profile(
    ApiPath(user_id): ApiPath<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.tracker.profile(user_id).await?;
    Ok(Json(profile))
}

async fn update_weight(
    ApiPath(user_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    ApiJson(settings): ApiJson<WeightSettings>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.tracker.update_weight(user_id, settings).await?;
    Ok(Json(profile))
}

async fn log_meal(
    ApiPath(user_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LogMealInput>,
) -> Result<impl IntoResponse, ApiError> {
    let meal = state.meals.log_meal(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn list_meals(
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<DateQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let meals = state.tracker.meals(user_id, query.or_today()).await?;
    Ok(Json(meals))
}

#[derive(Debug, Deserialize)]
struct SetWaterBody {
    amount: i32,
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct AddWaterBody {
    delta: i32,
    date: Option<NaiveDate>,
}

async fn set_water(
    ApiPath(user_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SetWaterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());
    let intake = state.tracker.set_water(user_id, date, body.amount).await?;
    Ok(Json(intake))
}

async fn add_water(
    ApiPath(user_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AddWaterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());
    let intake = state.tracker.add_water(user_id, date, body.delta).await?;
    Ok(Json(intake))
}

async fn daily_summary(
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<DateQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.tracker.daily_summary(user_id, query.or_today()).await?;
    Ok(Json(summary))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    image_url: String,
}

async fn upload_image(
    ApiPath(user_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TrackerError::Invalid(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| TrackerError::Invalid(format!("Invalid upload: {}", e)))?;

        let image_url = state
            .images
            .save(user_id, content_type.as_deref(), file_name.as_deref(), &bytes)
            .await?;
        log::info!("📸 Image uploaded for {}: {}", user_id, image_url);
        return Ok((StatusCode::CREATED, Json(UploadResponse { image_url })));
    }

    Err(TrackerError::Invalid("Missing 'image' field".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::analysis::tests::{StubGateway, SALAD_RESPONSE};
    use crate::handlers::tracker::tests::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(gateway: StubGateway) -> (Router, Arc<StubGateway>) {
        let images_dir = std::env::temp_dir().join(format!("nutrition-tracker-test-{}", Uuid::new_v4()));
        app_with_images(gateway, images_dir)
    }

    fn app_with_images(gateway: StubGateway, images_dir: std::path::PathBuf) -> (Router, Arc<StubGateway>) {
        let gateway = Arc::new(gateway);
        let store = Arc::new(MemoryStore::default());
        let analysis = Arc::new(AnalysisHandler::new(gateway.clone()));

        let state = AppState {
            analysis: analysis.clone(),
            meals: Arc::new(MealLogger::new(analysis, store.clone())),
            tracker: Arc::new(TrackerService::new(store)),
            images: Arc::new(ImageStore::new(images_dir, "http://localhost:8080")),
        };
        (create_router(state), gateway)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_food_success() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));

        let (status, body) = send(
            app,
            json_request(Method::POST, "/analyze-food", r#"{"imageUrl": null, "foodName": "grilled chicken salad"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["foodName"], "Grilled Chicken Salad");
        assert_eq!(body["calories"], 350);
        assert_eq!(body["healthRating"], "good");
        assert!(body.get("vitamins").is_none());
        assert!(body.get("minerals").is_none());
    }

    #[tokio::test]
    async fn test_analyze_food_invalid_request_is_400() {
        let (app, gateway) = app(StubGateway::replying(SALAD_RESPONSE));

        let (status, body) = send(
            app,
            json_request(Method::POST, "/analyze-food", r#"{"imageUrl": "https://x/y.jpg", "foodName": "salad"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "Failed to analyze food");
        assert!(body["error"].as_str().unwrap().contains("not both"));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyze_food_malformed_body_is_400() {
        let (app, gateway) = app(StubGateway::replying(SALAD_RESPONSE));

        let (status, body) = send(app, json_request(Method::POST, "/analyze-food", "not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyze_food_error_statuses() {
        let cases: [(fn() -> AnalysisError, StatusCode); 3] = [
            (
                || AnalysisError::Upstream {
                    status: Some(500),
                    body: "boom".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                || AnalysisError::Configuration("AI_GATEWAY_API_KEY".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                || AnalysisError::Parse {
                    raw: "nope".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (make_error, expected) in cases {
            let (app, _) = app(StubGateway::failing(make_error));
            let (status, body) = send(
                app,
                json_request(Method::POST, "/analyze-food", r#"{"foodName": "toast"}"#),
            )
            .await;
            assert_eq!(status, expected);
            assert!(!body["error"].as_str().unwrap().contains("AI_GATEWAY_API_KEY"));
        }
    }

    #[tokio::test]
    async fn test_schema_error_is_400() {
        let (app, _) = app(StubGateway::replying(r#"{"foodName": "", "calories": 250}"#));

        let (status, _) = send(
            app,
            json_request(Method::POST, "/analyze-food", r#"{"foodName": "mystery"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_plain_options_returns_empty_success() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/analyze-food")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_any_origin() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/analyze-food")
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "apikey, content-type")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_meal_and_water_flow() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));
        let user = Uuid::new_v4();

        let (status, meal) = send(
            app.clone(),
            json_request(
                Method::POST,
                &format!("/api/users/{}/meals", user),
                r#"{"foodName": "grilled chicken salad", "mealType": "dinner", "servingSize": "1 bowl"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(meal["mealType"], "dinner");
        assert_eq!(meal["servingSize"], "1 bowl");

        let (status, _) = send(
            app.clone(),
            json_request(Method::POST, &format!("/api/users/{}/water", user), r#"{"delta": 500}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            app.clone(),
            json_request(Method::POST, &format!("/api/users/{}/water", user), r#"{"delta": -750}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "Invalid request");

        let request = Request::builder()
            .uri(format!("/api/users/{}/summary", user))
            .body(Body::empty())
            .unwrap();
        let (status, summary) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["totalCalories"], 350);
        assert_eq!(summary["mealsCount"], 1);
        assert_eq!(summary["waterIntake"], 500);
        assert_eq!(summary["waterRemaining"], 1500);
    }

    #[tokio::test]
    async fn test_weight_requires_both_values() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));
        let uri = format!("/api/users/{}/weight", Uuid::new_v4());

        let (status, _) = send(
            app.clone(),
            json_request(Method::PUT, &uri, r#"{"currentWeight": 70}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, profile) = send(
            app,
            json_request(Method::PUT, &uri, r#"{"currentWeight": 70, "targetWeight": 65, "height": 172}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["targetWeight"], 65.0);
        assert_eq!(profile["height"], 172.0);
    }

    #[tokio::test]
    async fn test_upload_image() {
        let images_dir = std::env::temp_dir().join(format!("nutrition-tracker-test-{}", Uuid::new_v4()));
        let (app, _) = app_with_images(StubGateway::replying(SALAD_RESPONSE), images_dir.clone());
        let user = Uuid::new_v4();

        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"lunch.png\"\r\nContent-Type: image/png\r\n\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"\x89PNG\r\n");
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/users/{}/images", user))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, response) = send(app, request).await;

        assert_eq!(status, StatusCode::CREATED);
        let url = response["imageUrl"].as_str().unwrap();
        assert!(url.starts_with(&format!("http://localhost:8080/images/{}/", user)));
        assert!(url.ends_with(".png"));
        assert!(images_dir.join(user.to_string()).is_dir());

        std::fs::remove_dir_all(&images_dir).unwrap();
    }

    fn assert_error_body(body: &Value) {
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert_eq!(body["details"], "Invalid request");
    }

    #[tokio::test]
    async fn test_malformed_tracking_body_uses_error_shape() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));
        let user = Uuid::new_v4();

        for (method, path) in [(Method::PUT, "weight"), (Method::POST, "meals"), (Method::PUT, "water")] {
            let (status, body) = send(
                app.clone(),
                json_request(method, &format!("/api/users/{}/{}", user, path), "not json"),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_error_body(&body);
        }
    }

    #[tokio::test]
    async fn test_bad_user_id_uses_error_shape() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));

        let request = Request::builder()
            .uri("/api/users/not-a-uuid/summary")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error_body(&body);
    }

    #[tokio::test]
    async fn test_bad_date_uses_error_shape() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));

        let request = Request::builder()
            .uri(format!("/api/users/{}/meals?date=yesterday", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error_body(&body);
    }

    #[tokio::test]
    async fn test_upload_without_multipart_uses_error_shape() {
        let (app, _) = app(StubGateway::replying(SALAD_RESPONSE));

        let (status, body) = send(
            app,
            json_request(Method::POST, &format!("/api/users/{}/images", Uuid::new_v4()), "{}"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error_body(&body);
    }
}
