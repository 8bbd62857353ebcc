use actix_web::{
    HttpRequest, HttpResponse, delete, get, http::header, post, put,
    web::{self, Path},
};
use futures_util::StreamExt;
use tracing::{Instrument, instrument};

use crate::{
    api::{
        endpoints::get_trace_id,
        rest::{BumdesListResponse, BumdesSaveRequest, ImageDeleteRequest, ImageDeleteResponse, ImageUploadQuery, ImageUploadResponse},
        state::AppState,
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        models::ImageUpload,
        validation::MAX_IMAGE_SIZE,
    },
};

/**
 * Upload bodies may exceed the image limit so oversized images get the size in their validation message.
 */
const MAX_UPLOAD_BODY_SIZE: usize = MAX_IMAGE_SIZE + 1024 * 1024;

/**
 * Endpoint to list the BUMDes catalog, newest first.
 */
#[instrument(skip(http_request, app_state), fields(service = "listBumdes", trace_id = get_trace_id(&http_request), result))]
#[get("/api/services/v1_0/bumdes")]
pub async fn bumdes_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> HttpResponse {
    let span = tracing::Span::current();
    let bumdes = app_state.bumdes_service.get_bumdes_data().instrument(span.clone()).await;
    span.record("result", bumdes.len());
    HttpResponse::Ok().json(BumdesListResponse { bumdes })
}

/**
 * Endpoint to retrieve one BUMDes entry.
 */
#[instrument(skip(http_request, app_state), fields(service = "getBumdes", trace_id = get_trace_id(&http_request)))]
#[get("/api/services/v1_0/bumdes/{id}")]
pub async fn bumdes_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let Some(item) = app_state.bumdes_service.get_bumdes_item(path.into_inner()).instrument(span).await else {
        return Err(ApplicationError::new(ErrorType::NotFound, "BUMDes not found".to_string()));
    };
    Ok(HttpResponse::Ok().json(item))
}

/**
 * Endpoint to add a BUMDes entry.
 */
#[instrument(skip(http_request, app_state, request_body), fields(service = "addBumdes", trace_id = get_trace_id(&http_request), result))]
#[post("/api/services/v1_0/bumdes")]
pub async fn bumdes_add(http_request: HttpRequest, request_body: web::Json<BumdesSaveRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let (input, image_url) = request_body.into_inner().validate()?;
    let Some(item) = app_state.bumdes_service.add_bumdes_item(input, image_url).instrument(span.clone()).await else {
        return Err(ApplicationError::new(ErrorType::DatabaseError, "Failed to add BUMDes".to_string()));
    };
    span.record("result", item.id);
    Ok(HttpResponse::Created().json(item))
}

/**
 * Endpoint to save an edited BUMDes entry. A superseded stored image is removed.
 */
#[instrument(skip(http_request, app_state, request_body), fields(service = "updateBumdes", trace_id = get_trace_id(&http_request)))]
#[put("/api/services/v1_0/bumdes/{id}")]
pub async fn bumdes_update(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<BumdesSaveRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let (input, image_url) = request_body.into_inner().validate()?;
    let item = app_state.bumdes_service.replace_bumdes_item(path.into_inner(), input, image_url).instrument(span).await?;
    Ok(HttpResponse::Ok().json(item))
}

/**
 * Endpoint to delete a BUMDes entry together with its stored image.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteBumdes", trace_id = get_trace_id(&http_request)))]
#[delete("/api/services/v1_0/bumdes/{id}")]
pub async fn bumdes_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    app_state.bumdes_service.remove_bumdes_item(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/**
 * Endpoint to upload a BUMDes image. The request body is the raw file, its type the
 * `Content-Type` header. The body is only read once the caller is authorized.
 */
#[instrument(skip(http_request, app_state, payload), fields(service = "uploadBumdesImage", trace_id = get_trace_id(&http_request), result))]
#[post("/api/services/v1_0/bumdes/images")]
pub async fn bumdes_image_upload(query: web::Query<ImageUploadQuery>, http_request: HttpRequest, payload: web::Payload, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let bytes = read_upload_body(payload).await?;
    let query = query.into_inner();
    let content_type = http_request.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or_default().to_string();
    let upload = ImageUpload { file_name: query.file_name, content_type, bytes };
    let url = app_state.bumdes_service.upload_bumdes_image(upload, query.item_id).instrument(span.clone()).await?;
    span.record("result", url.as_str());
    Ok(HttpResponse::Created().json(ImageUploadResponse { url }))
}

/**
 * Reads an upload body, refusing to buffer more than `MAX_UPLOAD_BODY_SIZE` bytes.
 */
async fn read_upload_body(mut payload: web::Payload) -> Result<Vec<u8>, ApplicationError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|err| ApplicationError::validation(&format!("Failed to read upload: {err}")))?;
        if bytes.len() + chunk.len() > MAX_UPLOAD_BODY_SIZE {
            return Err(ApplicationError::validation("File too large. Maximum is 5 MB."));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/**
 * Endpoint to remove a stored image by its public url.
 */
#[instrument(skip(http_request, app_state, request_body), fields(service = "deleteBumdesImage", trace_id = get_trace_id(&http_request)))]
#[post("/api/services/v1_0/bumdes/images:delete")]
pub async fn bumdes_image_delete(http_request: HttpRequest, request_body: web::Json<ImageDeleteRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.jwt_service.validate_admin(&http_request)?;
    let deleted = app_state.bumdes_service.delete_bumdes_image(&request_body.url).instrument(span).await;
    Ok(HttpResponse::Ok().json(ImageDeleteResponse { deleted }))
}

/**
 * Serves a stored image at its public url.
 */
#[instrument(skip(http_request, app_state), fields(service = "getStoredImage", trace_id = get_trace_id(&http_request)))]
#[get("/storage/v1/object/public/{bucket}/{path:.*}")]
pub async fn stored_image_get(path: Path<(String, String)>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let (bucket, object_path) = path.into_inner();
    let Some(object) = app_state.bumdes_service.get_stored_image(&bucket, &object_path).instrument(span).await? else {
        return Err(ApplicationError::new(ErrorType::NotFound, "Object not found".to_string()));
    };
    Ok(HttpResponse::Ok().content_type(object.content_type).body(object.bytes))
}

/**
 * Registers the BUMDes and image endpoints. The image routes go before `{id}`.
 */
pub fn configure(config: &mut web::ServiceConfig) {
    config
        .service(bumdes_image_upload)
        .service(bumdes_image_delete)
        .service(bumdes_list)
        .service(bumdes_add)
        .service(bumdes_get)
        .service(bumdes_update)
        .service(bumdes_delete)
        .service(stored_image_get);
}

#[cfg(test)]
mod test {
    use actix_web::{
        App,
        http::StatusCode,
        test::{self, TestRequest},
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::api::{
        security::testing::bearer,
        state::testing::{PUBLIC_BASE_URL, in_memory_state},
    };

    fn save_body(title: &str, image_url: Option<&str>) -> Value {
        json!({
            "title": title,
            "description": "Pengelolaan air bersih",
            "content": "Melayani 400 sambungan rumah",
            "category": "Jasa",
            "status": "Aktif",
            "established": "2019-03-12",
            "manager": "Budi Santoso",
            "revenue": "15000000",
            "employees": 6,
            "location": "Dusun Krajan",
            "imageUrl": image_url
        })
    }

    fn upload_request(item_id: i64, file_name: &str, content_type: &str, bytes: Vec<u8>) -> TestRequest {
        TestRequest::post()
            .uri(&format!("/api/services/v1_0/bumdes/images?itemId={item_id}&fileName={file_name}"))
            .insert_header(bearer(true))
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(bytes)
    }

    #[actix_web::test]
    async fn test_list_is_empty_for_empty_store() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let request = TestRequest::get().uri("/api/services/v1_0/bumdes").to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["bumdes"], json!([]));
    }

    #[actix_web::test]
    async fn test_add_requires_admin() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let request = TestRequest::post().uri("/api/services/v1_0/bumdes").set_json(save_body("Unit Air Bersih", None)).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::UNAUTHORIZED);

        let request = TestRequest::post().uri("/api/services/v1_0/bumdes").insert_header(bearer(false)).set_json(save_body("Unit Air Bersih", None)).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_add_get_and_delete() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let request = TestRequest::post().uri("/api/services/v1_0/bumdes").insert_header(bearer(true)).set_json(save_body("Unit Air Bersih", None)).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(response).await;
        assert_eq!(created["image"], json!("/placeholder.jpg"));
        assert_eq!(created["revenue"], json!(15_000_000));
        let id = created["id"].as_i64().unwrap();

        let request = TestRequest::get().uri(&format!("/api/services/v1_0/bumdes/{id}")).to_request();
        let fetched: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(fetched["title"], json!("Unit Air Bersih"));

        let request = TestRequest::delete().uri(&format!("/api/services/v1_0/bumdes/{id}")).insert_header(bearer(true)).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::NO_CONTENT);

        let request = TestRequest::delete().uri(&format!("/api/services/v1_0/bumdes/{id}")).insert_header(bearer(true)).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_add_rejects_invalid_form() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let request = TestRequest::post().uri("/api/services/v1_0/bumdes").insert_header(bearer(true)).set_json(save_body(" ", None)).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["message"], json!("Title is required"));
        assert_eq!(body["code"], json!(1005));
    }

    #[actix_web::test]
    async fn test_update_missing_item() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let request = TestRequest::put().uri("/api/services/v1_0/bumdes/99").insert_header(bearer(true)).set_json(save_body("Unit Air Bersih", None)).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_upload_serve_and_replace_image() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let response = test::call_service(&app, upload_request(1, "logo.png", "image/png", vec![1, 2, 3]).to_request()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let uploaded: ImageUploadResponse = test::read_body_json(response).await;
        assert!(uploaded.url.starts_with(&format!("{PUBLIC_BASE_URL}/storage/v1/object/public/images/bumdes/")));

        let served_path = uploaded.url.trim_start_matches(PUBLIC_BASE_URL).to_string();
        let response = test::call_service(&app, TestRequest::get().uri(&served_path).to_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()), Some("image/png"));
        assert_eq!(&test::read_body(response).await[..], &[1, 2, 3]);

        let request = TestRequest::post().uri("/api/services/v1_0/bumdes").insert_header(bearer(true)).set_json(save_body("Toko Desa", Some(&uploaded.url))).to_request();
        let created: Value = test::call_and_read_body_json(&app, request).await;
        let id = created["id"].as_i64().unwrap();

        let response = test::call_service(&app, upload_request(2, "logo-baru.png", "image/png", vec![4, 5]).to_request()).await;
        let replacement: ImageUploadResponse = test::read_body_json(response).await;
        let request = TestRequest::put().uri(&format!("/api/services/v1_0/bumdes/{id}")).insert_header(bearer(true)).set_json(save_body("Toko Desa", Some(&replacement.url))).to_request();
        let updated: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(updated["image"], json!(replacement.url));

        let response = test::call_service(&app, TestRequest::get().uri(&served_path).to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_upload_checks_authorization_before_body() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let oversized = vec![0x89; MAX_UPLOAD_BODY_SIZE + 1];
        let request = TestRequest::post()
            .uri("/api/services/v1_0/bumdes/images?itemId=1&fileName=logo.png")
            .insert_header((header::CONTENT_TYPE, "image/png"))
            .set_payload(oversized.clone())
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::UNAUTHORIZED);

        let response = test::call_service(&app, upload_request(1, "logo.png", "image/png", oversized).to_request()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["message"], json!("File too large. Maximum is 5 MB."));

        let response = test::call_service(&app, upload_request(1, "logo.png", "image/png", vec![0x89; MAX_IMAGE_SIZE + 1]).to_request()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_upload_rejects_unsupported_type() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let response = test::call_service(&app, upload_request(1, "notes.txt", "text/plain", vec![1]).to_request()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_delete_image_by_url() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let response = test::call_service(&app, upload_request(1, "logo.png", "image/png", vec![1]).to_request()).await;
        let uploaded: ImageUploadResponse = test::read_body_json(response).await;

        let request = TestRequest::post().uri("/api/services/v1_0/bumdes/images:delete").insert_header(bearer(true)).set_json(json!({ "url": uploaded.url })).to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["deleted"], json!(true));

        let request = TestRequest::post().uri("/api/services/v1_0/bumdes/images:delete").insert_header(bearer(true)).set_json(json!({ "url": "/placeholder.jpg" })).to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["deleted"], json!(false));
    }

    #[actix_web::test]
    async fn test_stored_image_of_other_bucket() {
        let app = test::init_service(App::new().app_data(web::Data::new(in_memory_state())).configure(configure)).await;
        let request = TestRequest::get().uri("/storage/v1/object/public/avatars/bumdes/a.png").to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::NOT_FOUND);
    }
}
