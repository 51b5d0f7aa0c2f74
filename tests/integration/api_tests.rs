//! API integration tests for listing and mutating images.
//!
//! Tests verify:
//! - Envelopes and pagination metadata
//! - Public vs owner visibility over HTTP
//! - Upload, update and delete semantics
//! - Concurrent writes from different owners
//! - Error status mapping and JSON error bodies

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use snap_vault::server::REQUEST_ID_HEADER;
use snap_vault::RouterConfig;

use super::test_utils::{json_body, TestApp, OWNER, SECRET, STRANGER};

// =============================================================================
// Health and Fallbacks
// =============================================================================

#[tokio::test]
async fn test_healthcheck() {
    let app = TestApp::new().await;
    let response = app.get("/v1/healthcheck", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let body = json_body(response).await;
    assert_eq!(body["status"], "available");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = TestApp::new().await;
    let response = app.get("/v1/nothing-here", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({"error": "the requested resource could not be found", "status_code": 404})
    );
}

#[tokio::test]
async fn test_wrong_method_is_json_405() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/v1/healthcheck")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json_body(response).await["status_code"], 405);
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_public_listing_only_shows_published() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, true).await;
    let first = app.upload(OWNER, gallery.id, "first", b"one").await;
    app.upload(OWNER, gallery.id, "second", b"two").await;
    app.store.set_image_published(first.id, true).await.unwrap();

    let response = app.get("/v1/public/images", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let images = body["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["id"], first.id);
    assert_eq!(body["metadata"]["total_records"], 1);
    assert_eq!(body["metadata"]["current_page"], 1);
}

#[tokio::test]
async fn test_empty_listing_has_empty_metadata() {
    let app = TestApp::new().await;
    let body = json_body(app.get("/v1/public/images", None).await).await;
    assert_eq!(body, json!({"images": [], "metadata": {}}));
}

#[tokio::test]
async fn test_listing_pagination_and_sort() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;
    for title in ["a", "b", "c"] {
        app.upload(OWNER, gallery.id, title, title.as_bytes()).await;
    }

    let uri = format!(
        "/v1/galleries/{}/images?page=1&page_size=2&sort=-title",
        gallery.id
    );
    let body = json_body(app.get(&uri, Some(OWNER)).await).await;
    let titles: Vec<_> = body["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["c", "b"]);
    assert_eq!(body["metadata"]["last_page"], 2);
    assert_eq!(body["metadata"]["total_records"], 3);
}

#[tokio::test]
async fn test_invalid_filter_is_422() {
    let app = TestApp::new().await;
    let response = app
        .get("/v1/public/images?page=0&sort=password", None)
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["status_code"], 422);
    assert_eq!(body["error"]["page"], "must be greater than zero");
    assert_eq!(body["error"]["sort"], "invalid sort value");
}

#[tokio::test]
async fn test_unparseable_filter_is_400() {
    let app = TestApp::new().await;
    let response = app.get("/v1/public/images?page=abc", None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status_code"], 400);
}

#[tokio::test]
async fn test_gallery_listing_visibility() {
    let app = TestApp::new().await;
    let private = app.gallery(OWNER, false).await;
    let public = app.gallery(OWNER, true).await;

    let uri = format!("/v1/public/galleries/{}/images", private.id);
    assert_eq!(app.get(&uri, None).await.status(), StatusCode::FORBIDDEN);

    let uri = format!("/v1/public/galleries/{}/images", public.id);
    assert_eq!(app.get(&uri, None).await.status(), StatusCode::OK);

    let uri = format!("/v1/galleries/{}/images", private.id);
    assert_eq!(app.get(&uri, Some(STRANGER)).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.get(&uri, Some(OWNER)).await.status(), StatusCode::OK);

    let uri = "/v1/public/galleries/999/images";
    assert_eq!(app.get(uri, None).await.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Single Image
// =============================================================================

#[tokio::test]
async fn test_get_image_owner_and_public_paths() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, true).await;
    let image = app.upload(OWNER, gallery.id, "sunset", b"png").await;

    let public_uri = format!("/v1/public/images/{}", image.id);
    assert_eq!(app.get(&public_uri, None).await.status(), StatusCode::FORBIDDEN);

    let owner_uri = format!("/v1/images/{}", image.id);
    let response = app.get(&owner_uri, Some(OWNER)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["image"]["title"], "sunset");
    assert_eq!(body["image"]["user_id"], OWNER);

    assert_eq!(
        app.get(&owner_uri, Some(STRANGER)).await.status(),
        StatusCode::FORBIDDEN
    );

    app.store.set_image_published(image.id, true).await.unwrap();
    assert_eq!(app.get(&public_uri, None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bad_ids_are_404() {
    let app = TestApp::new().await;
    assert_eq!(
        app.get("/v1/public/images/abc", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/v1/public/images/0", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/v1/images/12345", Some(OWNER)).await.status(),
        StatusCode::NOT_FOUND
    );
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_created() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!(
            "/v1/galleries/{}/images?title=cat&caption=on%20a%20mat",
            gallery.id
        ))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(OWNER)))
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from("jpeg-bytes"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = json_body(response).await;
    let image = &body["image"];
    assert_eq!(location, format!("/v1/images/{}", image["id"]));
    assert_eq!(image["title"], "cat");
    assert_eq!(image["caption"], "on a mat");
    assert_eq!(image["content_type"], "image/jpeg");
    assert_eq!(image["size"], 10);
    assert_eq!(image["user_id"], OWNER);
    assert_eq!(image["published"], false);
}

#[tokio::test]
async fn test_upload_empty_body_is_422() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1/galleries/{}/images?title=x", gallery.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(OWNER)))
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await,
        json!({"error": {"body": "no bytes in body"}, "status_code": 422})
    );
}

#[tokio::test]
async fn test_upload_into_foreign_gallery_is_403() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, true).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1/galleries/{}/images", gallery.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(STRANGER)))
        .body(Body::from("bytes"))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_into_missing_gallery_is_404() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/v1/galleries/77/images")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(OWNER)))
        .body(Body::from("bytes"))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let app = TestApp::with_config(
        RouterConfig::new(SECRET)
            .with_tracing(false)
            .with_max_upload_bytes(8),
    )
    .await;
    let gallery = app.gallery(OWNER, false).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1/galleries/{}/images", gallery.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(OWNER)))
        .header(header::CONTENT_LENGTH, "16")
        .body(Body::from(vec![0u8; 16]))
        .unwrap();
    assert_eq!(
        app.send(request).await.status(),
        StatusCode::PAYLOAD_TOO_LARGE
    );
}

// =============================================================================
// Update and Delete
// =============================================================================

#[tokio::test]
async fn test_update_changes_title_and_caption_only() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;
    let image = app.upload(OWNER, gallery.id, "before", b"bytes").await;

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/images/{}", image.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(OWNER)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "title": "after",
                "caption": "edited",
                "user_id": STRANGER,
                "gallery_id": 999,
                "published": true
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["image"]["title"], "after");
    assert_eq!(body["image"]["caption"], "edited");
    assert_eq!(body["image"]["user_id"], OWNER);
    assert_eq!(body["image"]["gallery_id"], gallery.id);
    assert_eq!(body["image"]["published"], false);
}

#[tokio::test]
async fn test_update_by_stranger_is_403() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;
    let image = app.upload(OWNER, gallery.id, "mine", b"bytes").await;

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/images/{}", image.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(STRANGER)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"title": "stolen"}"#))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_update_with_malformed_json_is_400() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;
    let image = app.upload(OWNER, gallery.id, "x", b"bytes").await;

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/images/{}", image.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(OWNER)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status_code"], 400);
}

#[tokio::test]
async fn test_update_after_gallery_removed_is_409() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;
    let image = app.upload(OWNER, gallery.id, "x", b"bytes").await;
    app.store.delete_gallery(gallery.id).await.unwrap();

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/v1/images/{}", image.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(OWNER)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"title": "y", "caption": ""}"#))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        json_body(response).await["error"],
        "unable to complete the request due to an edit conflict, please try again"
    );
}

#[tokio::test]
async fn test_delete_returns_record_then_404() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;
    let image = app.upload(OWNER, gallery.id, "gone", b"bytes").await;

    let delete = |user_id: i64| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/images/{}", image.id))
            .header(header::AUTHORIZATION, format!("Bearer {}", app.token(user_id)))
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.send(delete(STRANGER)).await.status(), StatusCode::FORBIDDEN);

    let response = app.send(delete(OWNER)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["image"]["title"], "gone");

    assert_eq!(app.send(delete(OWNER)).await.status(), StatusCode::NOT_FOUND);
    assert!(!app.store.payload_path(image.id).exists());
}

#[tokio::test]
async fn test_concurrent_uploads_get_distinct_ids() {
    let app = std::sync::Arc::new(TestApp::new().await);
    let gallery_id = app.gallery(OWNER, false).await.id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let app = std::sync::Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            app.upload(OWNER, gallery_id, &format!("img{}", i), b"bytes")
                .await
                .id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);
}

#[tokio::test]
async fn test_concurrent_writes_across_owners_do_not_interfere() {
    let app = std::sync::Arc::new(TestApp::new().await);

    let mut seeded = Vec::new();
    for user_id in [OWNER, STRANGER] {
        let gallery_id = app.gallery(user_id, false).await.id;
        let keep = app.upload(user_id, gallery_id, &format!("keep-{}", user_id), b"k").await;
        let edit = app.upload(user_id, gallery_id, &format!("edit-{}", user_id), b"e").await;
        let dropped = app.upload(user_id, gallery_id, &format!("drop-{}", user_id), b"d").await;
        seeded.push((user_id, gallery_id, keep.id, edit.id, dropped.id));
    }

    let mut handles = Vec::new();
    for &(user_id, gallery_id, _, edit_id, drop_id) in &seeded {
        let inserter = std::sync::Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            let image = inserter
                .upload(user_id, gallery_id, &format!("new-{}", user_id), b"n")
                .await;
            assert_eq!(image.user_id, user_id);
            assert_eq!(image.gallery_id, gallery_id);
            assert_eq!(image.title, format!("new-{}", user_id));
        }));

        let updater = std::sync::Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .method("PUT")
                .uri(format!("/v1/images/{}", edit_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", updater.token(user_id)))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "title": format!("edited-{}", user_id) }).to_string(),
                ))
                .unwrap();
            let response = updater.send(request).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["image"]["id"], edit_id);
            assert_eq!(body["image"]["user_id"], user_id);
            assert_eq!(body["image"]["gallery_id"], gallery_id);
            assert_eq!(body["image"]["title"], format!("edited-{}", user_id));
        }));

        let deleter = std::sync::Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .method("DELETE")
                .uri(format!("/v1/images/{}", drop_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", deleter.token(user_id)))
                .body(Body::empty())
                .unwrap();
            let response = deleter.send(request).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["image"]["id"], drop_id);
            assert_eq!(body["image"]["title"], format!("drop-{}", user_id));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for &(user_id, gallery_id, keep_id, _, drop_id) in &seeded {
        let response = app
            .get(&format!("/v1/galleries/{}/images", gallery_id), Some(user_id))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let images = body["images"].as_array().unwrap();

        let mut titles: Vec<String> = images
            .iter()
            .map(|image| image["title"].as_str().unwrap().to_string())
            .collect();
        titles.sort();
        assert_eq!(
            titles,
            vec![
                format!("edited-{}", user_id),
                format!("keep-{}", user_id),
                format!("new-{}", user_id),
            ]
        );
        for image in images {
            assert_eq!(image["user_id"], user_id);
            assert_eq!(image["gallery_id"], gallery_id);
        }

        let uri = format!("/v1/images/{}", drop_id);
        assert_eq!(app.get(&uri, Some(user_id)).await.status(), StatusCode::NOT_FOUND);

        let uri = format!("/v1/images/{}", keep_id);
        let response = app.get(&uri, Some(user_id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["image"]["title"], format!("keep-{}", user_id));
    }
}
