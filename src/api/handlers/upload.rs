use crate::AppState;
use crate::services::image_upload::UploadOutcome;
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every image upload response
#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq, Eq)]
pub struct CodeResponse {
    /// 200 ok, 101 item not found, 102 wrong media type, 103 link failed, 104 storage failed, 105 other
    pub code: u16,
}

impl IntoResponse for UploadOutcome {
    fn into_response(self) -> Response {
        let status = if self.is_success() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(CodeResponse { code: self.code() })).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/items/{id}/image",
    params(("id" = String, Path, description = "Item id")),
    request_body(content = Object, description = "Single JPEG or PNG file part", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored and linked", body = CodeResponse),
        (status = 400, description = "Upload failed, see code", body = CodeResponse)
    ),
    tag = "items"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> UploadOutcome {
    match multipart {
        Ok(multipart) => state.uploads.handle_upload(&id, multipart).await,
        Err(rejection) => state.uploads.reject_malformed(&id, rejection).await,
    }
}
