// src/utils/json.rs

use axum::extract::FromRequest;

use crate::error::AppError;

/// `Json` extractor whose rejections go through `AppError`, so a malformed
/// body gets the same `{ "error": ... }` 400 response as any other bad request.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
