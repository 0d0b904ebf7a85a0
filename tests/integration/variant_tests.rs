//! Variant engine integration tests.
//!
//! Tests verify:
//! - Upload gates (extension, declared size, streamed size, content)
//! - Variant reuse, aspect ratio and upscale rejection
//! - Prefix deletes and not-found lookups
//! - Single-flight builds, cancellation and write-last semantics

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use variant_store::{
    variant_key, EngineConfig, ImageCodec, ImageKind, ObjectStore, RasterCodec, UploadRequest,
    ValidationError, VariantError, VariantService,
};

use super::test_utils::{
    dimensions, encoded_image, jpeg_image, png_image, CountingCodec, TrackingStore,
};

type TestService = VariantService<TrackingStore, CountingCodec>;

fn setup_with(codec: CountingCodec) -> (TestService, TrackingStore, CountingCodec) {
    let store = TrackingStore::new();
    let config = EngineConfig::new(["jpg", "png"], 1024 * 1024);
    let service = VariantService::with_codec(store.clone(), codec.clone(), config);
    (service, store, codec)
}

fn setup() -> (TestService, TrackingStore, CountingCodec) {
    setup_with(CountingCodec::new())
}

async fn upload_png(service: &TestService, width: u32, height: u32) -> String {
    let request = UploadRequest::from_bytes(
        "photo.png",
        Some("image/png".to_string()),
        png_image(width, height),
    );
    service
        .upload(request, &CancellationToken::new())
        .await
        .unwrap()
        .id
}

fn is_not_found(err: &VariantError) -> bool {
    matches!(
        err,
        VariantError::Validation(ValidationError::NotFound { .. })
    )
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_stores_original() {
    let (service, store, _) = setup();
    let cancel = CancellationToken::new();

    let request = UploadRequest::from_bytes("x.jpg", Some("image/jpeg".into()), jpeg_image(64, 48));
    let location = service.upload(request, &cancel).await.unwrap();

    assert_eq!(location.url, format!("https://images.test/{}", location.id));
    assert_eq!(store.keys().await, vec![location.id.clone()]);

    let original = store.object(&location.id).await.unwrap();
    assert_eq!(original.content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_upload_ids_are_unique() {
    let (service, _, _) = setup();
    let a = upload_png(&service, 8, 8).await;
    let b = upload_png(&service, 8, 8).await;
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_upload_rejects_unlisted_extension() {
    let (service, store, _) = setup();
    let request = UploadRequest::from_bytes("x.exe", None, png_image(8, 8));

    let err = service
        .upload(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VariantError::Validation(ValidationError::UnsupportedExtension { ref extension })
            if extension == "exe"
    ));
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_upload_extension_is_case_insensitive() {
    let (service, _, _) = setup();
    let request = UploadRequest::from_bytes("PHOTO.JPG", None, jpeg_image(8, 8));
    assert!(service
        .upload(request, &CancellationToken::new())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_upload_rejects_declared_oversize() {
    let (service, store, codec) = setup();
    let mut request = UploadRequest::from_bytes("x.png", None, png_image(8, 8));
    request.size = 1024 * 1024 + 1;

    let err = service
        .upload(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VariantError::Validation(ValidationError::FileTooLarge { .. })
    ));
    assert_eq!(store.put_count(), 0);
    assert_eq!(codec.decode_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_streamed_oversize() {
    let (service, store, _) = setup();
    let chunk = Bytes::from(vec![0u8; 512 * 1024]);
    let chunks: Vec<Result<Bytes, std::io::Error>> =
        vec![Ok(chunk.clone()), Ok(chunk.clone()), Ok(chunk)];

    let request = UploadRequest {
        file_name: "x.png".to_string(),
        content_type: None,
        size: 0,
        body: stream::iter(chunks).boxed(),
    };

    let err = service
        .upload(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VariantError::Validation(ValidationError::FileTooLarge { .. })
    ));
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_non_image_bytes() {
    let (service, store, _) = setup();
    let request = UploadRequest::from_bytes("x.png", None, Bytes::from_static(b"not an image"));

    let err = service
        .upload(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VariantError::Validation(ValidationError::UnreadableImage { .. })
    ));
    assert!(err.is_client_error());
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_failed_upload_write_surfaces_store_error() {
    let (service, store, _) = setup();
    store.fail_puts(true);

    let request = UploadRequest::from_bytes("x.png", None, png_image(8, 8));
    let err = service
        .upload(request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VariantError::Store(_)));
    assert!(store.keys().await.is_empty());
}

// =============================================================================
// Fetch
// =============================================================================

#[tokio::test]
async fn test_fetch_original_does_not_decode() {
    let (service, _, codec) = setup();
    let id = upload_png(&service, 16, 16).await;
    codec.reset();

    let location = service
        .fetch_original(&id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(location.id, id);
    assert_eq!(location.url, format!("https://images.test/{}", id));
    assert_eq!(codec.decode_count(), 0);
}

#[tokio::test]
async fn test_unknown_id_is_not_found_everywhere() {
    let (service, store, _) = setup();
    let cancel = CancellationToken::new();

    let err = service.fetch_original("missing", &cancel).await.unwrap_err();
    assert!(is_not_found(&err));
    assert_eq!(err.to_string(), "Image with id missing not found.");

    for height in [1, 100, 160, 5000] {
        let err = service
            .fetch_or_build_variant("missing", height, &cancel)
            .await
            .unwrap_err();
        assert!(is_not_found(&err), "height {} gave {:?}", height, err);
    }

    let err = service.fetch_thumbnail("missing", &cancel).await.unwrap_err();
    assert!(is_not_found(&err));
    assert!(store.keys().await.is_empty());
}

// =============================================================================
// Variants
// =============================================================================

#[tokio::test]
async fn test_variant_hit_is_idempotent() {
    let (service, store, codec) = setup();
    let cancel = CancellationToken::new();
    let id = upload_png(&service, 300, 200).await;
    codec.reset();

    let first = service
        .fetch_or_build_variant(&id, 100, &cancel)
        .await
        .unwrap();
    let second = service
        .fetch_or_build_variant(&id, 100, &cancel)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.url, format!("https://images.test/{}_100", id));
    assert_eq!(codec.decode_count(), 1);
    assert_eq!(codec.encode_count(), 1);
    // Original upload plus one variant
    assert_eq!(store.put_count(), 2);
}

#[tokio::test]
async fn test_variant_keeps_aspect_ratio() {
    let (service, store, _) = setup();
    let cancel = CancellationToken::new();
    let id = upload_png(&service, 300, 200).await;

    for target in [1, 77, 133, 200] {
        service
            .fetch_or_build_variant(&id, target, &cancel)
            .await
            .unwrap();

        let variant = store.object(&variant_key(&id, target)).await.unwrap();
        let expected_width = ((300u64 * target as u64) / 200).max(1) as u32;
        assert_eq!(dimensions(&variant.body), (expected_width, target));
    }
}

#[tokio::test]
async fn test_variant_reuses_original_content_type() {
    let (service, store, _) = setup();
    let cancel = CancellationToken::new();
    let id = upload_png(&service, 40, 40).await;

    service
        .fetch_or_build_variant(&id, 20, &cancel)
        .await
        .unwrap();

    let variant = store.object(&variant_key(&id, 20)).await.unwrap();
    assert_eq!(variant.content_type.as_deref(), Some("image/png"));
    // Same encoding as the original
    assert_eq!(&variant.body[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn test_variant_keeps_original_format_for_every_kind() {
    let cases = [
        (ImageKind::Jpeg, "jpg"),
        (ImageKind::Png, "png"),
        (ImageKind::Gif, "gif"),
        (ImageKind::WebP, "webp"),
        (ImageKind::Bmp, "bmp"),
    ];

    let store = TrackingStore::new();
    let service = VariantService::new(store.clone(), EngineConfig::default());
    let cancel = CancellationToken::new();

    for (kind, extension) in cases {
        let request = UploadRequest::from_bytes(
            format!("photo.{}", extension),
            Some(kind.mime_type().to_string()),
            encoded_image(kind, 40, 30),
        );
        let id = service.upload(request, &cancel).await.unwrap().id;

        service
            .fetch_or_build_variant(&id, 15, &cancel)
            .await
            .unwrap();

        let variant = store.object(&variant_key(&id, 15)).await.unwrap();
        assert_eq!(
            variant.content_type.as_deref(),
            Some(kind.mime_type()),
            "{:?}",
            kind
        );

        let decoded = RasterCodec.decode(&variant.body).unwrap();
        assert_eq!(decoded.kind, Some(kind));
        assert_eq!((decoded.width(), decoded.height()), (20, 15), "{:?}", kind);
    }
}

#[tokio::test]
async fn test_variant_content_type_falls_back_to_detected_format() {
    let (service, store, _) = setup();
    let cancel = CancellationToken::new();
    let request = UploadRequest::from_bytes("x.jpg", None, jpeg_image(40, 40));
    let id = service.upload(request, &cancel).await.unwrap().id;

    service
        .fetch_or_build_variant(&id, 10, &cancel)
        .await
        .unwrap();

    let variant = store.object(&variant_key(&id, 10)).await.unwrap();
    assert_eq!(variant.content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_upscale_rejected_without_writing() {
    let (service, store, _) = setup();
    let id = upload_png(&service, 300, 200).await;

    let err = service
        .fetch_or_build_variant(&id, 201, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VariantError::TargetHeightExceeded {
            target_height: 201,
            original_height: 200
        }
    ));
    assert_eq!(store.keys().await, vec![id]);
}

#[tokio::test]
async fn test_zero_height_rejected_before_store() {
    let (service, store, _) = setup();
    let id = upload_png(&service, 30, 20).await;
    let gets = store.get_count();

    let err = service
        .fetch_or_build_variant(&id, 0, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VariantError::InvalidTargetHeight { target_height: 0 }
    ));
    assert_eq!(store.get_count(), gets);
}

#[tokio::test]
async fn test_full_height_variant_allowed() {
    let (service, store, _) = setup();
    let id = upload_png(&service, 30, 20).await;

    service
        .fetch_or_build_variant(&id, 20, &CancellationToken::new())
        .await
        .unwrap();

    let variant = store.object(&variant_key(&id, 20)).await.unwrap();
    assert_eq!(dimensions(&variant.body), (30, 20));
}

#[tokio::test]
async fn test_thumbnail_uses_configured_height() {
    let (service, store, _) = setup();
    let id = upload_png(&service, 400, 320).await;

    let location = service
        .fetch_thumbnail(&id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(location.url, format!("https://images.test/{}_160", id));
    let thumbnail = store.object(&variant_key(&id, 160)).await.unwrap();
    assert_eq!(dimensions(&thumbnail.body), (200, 160));
}

#[tokio::test]
async fn test_thumbnail_of_short_original_is_rejected() {
    let (service, _, _) = setup();
    let id = upload_png(&service, 100, 100).await;

    let err = service
        .fetch_thumbnail(&id, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VariantError::TargetHeightExceeded { .. }));
}

#[tokio::test]
async fn test_failed_variant_write_leaves_no_key() {
    let (service, store, _) = setup();
    let id = upload_png(&service, 40, 40).await;
    store.fail_puts(true);

    let err = service
        .fetch_or_build_variant(&id, 20, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VariantError::Store(_)));
    assert!(!err.is_client_error());
    assert_eq!(store.keys().await, vec![id]);
}

#[tokio::test]
async fn test_corrupt_original_is_server_error() {
    let (service, store, _) = setup();
    store
        .put("broken", Bytes::from_static(b"garbage"), None)
        .await
        .unwrap();

    let err = service
        .fetch_or_build_variant("broken", 10, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VariantError::Codec(_)));
    assert!(!err.is_client_error());
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_removes_original_and_variants() {
    let (service, store, _) = setup();
    let cancel = CancellationToken::new();
    let id = upload_png(&service, 300, 200).await;

    for height in [100, 160] {
        service
            .fetch_or_build_variant(&id, height, &cancel)
            .await
            .unwrap();
    }
    assert_eq!(store.keys().await.len(), 3);

    let deleted = service.delete_all(&id, &cancel).await.unwrap();
    assert_eq!(deleted.id, id);
    assert_eq!(deleted.keys.len(), 3);
    assert!(store.keys().await.is_empty());

    let err = service.delete_all(&id, &cancel).await.unwrap_err();
    assert!(is_not_found(&err));
}

#[tokio::test]
async fn test_delete_spares_ids_sharing_a_prefix() {
    let (service, store, _) = setup();
    let cancel = CancellationToken::new();
    for key in ["img", "img_100", "img2", "img2_100"] {
        store.put(key, png_image(2, 2), None).await.unwrap();
    }

    service.delete_all("img", &cancel).await.unwrap();

    assert_eq!(store.keys().await, vec!["img2", "img2_100"]);
}

#[tokio::test]
async fn test_delete_unknown_id_is_not_found() {
    let (service, store, _) = setup();
    let err = service
        .delete_all("missing", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(is_not_found(&err));
    assert_eq!(store.delete_count(), 0);
}

// =============================================================================
// Concurrency and Cancellation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_variant_requests_build_once() {
    let (service, store, codec) =
        setup_with(CountingCodec::new().with_decode_delay(Duration::from_millis(200)));
    let service = Arc::new(service);
    let id = upload_png(&service, 300, 200).await;
    codec.reset();
    let puts = store.put_count();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            service
                .fetch_or_build_variant(&id, 50, &CancellationToken::new())
                .await
        }));
    }

    let mut urls = Vec::new();
    for handle in handles {
        urls.push(handle.await.unwrap().unwrap().url);
    }

    urls.dedup();
    assert_eq!(urls.len(), 1);
    assert_eq!(codec.decode_count(), 1);
    assert_eq!(codec.encode_count(), 1);
    assert_eq!(store.put_count(), puts + 1);
}

#[tokio::test]
async fn test_cancelled_token_stops_before_work() {
    let (service, store, codec) = setup();
    let id = upload_png(&service, 40, 40).await;
    codec.reset();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = service
        .fetch_or_build_variant(&id, 20, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, VariantError::Cancelled));
    assert_eq!(codec.decode_count(), 0);
    assert_eq!(store.keys().await, vec![id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_mid_build_writes_nothing() {
    let (service, store, codec) =
        setup_with(CountingCodec::new().with_decode_delay(Duration::from_millis(300)));
    let id = upload_png(&service, 40, 40).await;
    codec.reset();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = service
        .fetch_or_build_variant(&id, 20, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, VariantError::Cancelled));

    // Let the abandoned decode finish on the blocking pool
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(codec.decode_count(), 1);
    assert_eq!(codec.encode_count(), 0);
    assert_eq!(store.keys().await, vec![id.clone()]);

    // A later request builds the variant normally
    service
        .fetch_or_build_variant(&id, 20, &CancellationToken::new())
        .await
        .unwrap();
    assert!(store.object(&variant_key(&id, 20)).await.is_some());
}
