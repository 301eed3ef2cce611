// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::StatusCode;
use yare::parameterized;

#[parameterized(
    validation = { ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST },
    conflict_maps_to_400 = { ApiError::Conflict("dup".into()), StatusCode::BAD_REQUEST },
    auth_missing = { ApiError::AuthMissing("no header".into()), StatusCode::UNAUTHORIZED },
    auth_invalid = { ApiError::AuthInvalid("bad sig".into()), StatusCode::UNAUTHORIZED },
    forbidden = { ApiError::Forbidden("nope".into()), StatusCode::FORBIDDEN },
    not_found = { ApiError::NotFound("gone".into()), StatusCode::NOT_FOUND },
    storage = { ApiError::StorageUnavailable("down".into()), StatusCode::INTERNAL_SERVER_ERROR },
)]
fn status_mapping(err: ApiError, expected: StatusCode) {
    assert_eq!(err.status(), expected);
}

#[test]
fn store_errors_translate() {
    let err: ApiError = StoreError::NotFound("build", "p1/9".to_string()).into();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    let err: ApiError = StoreError::Conflict("A run named \"x\" already exists".to_string()).into();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn blob_unavailable_is_storage_error() {
    let io = std::io::Error::new(std::io::ErrorKind::Interrupted, "flaky");
    let err: ApiError = BlobError::Unavailable(io).into();
    assert!(matches!(err, ApiError::StorageUnavailable(_)));
}

#[tokio::test]
async fn unexpected_response_hides_detail_and_sets_location() {
    use axum::response::IntoResponse;

    let err = ApiError::Unexpected {
        message: "An unexpected error occurred".to_string(),
        detail: "secret stack trace".to_string(),
        location: Some("http://ci/p1/1/build-failure/console.log".to_string()),
    };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        resp.headers().get(axum::http::header::LOCATION).unwrap(),
        "http://ci/p1/1/build-failure/console.log"
    );
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("unexpected error occurred"));
    assert!(!body.contains("secret stack trace"), "detail never reaches the caller");
}
