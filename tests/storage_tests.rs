use publisher_console::{
    error::StorageError,
    storage::{MockStorageService, S3StorageClient, StorageService, logo_key},
};

// --- Logo Keys ---

#[test]
fn test_logo_key_keeps_lowercased_extension() {
    let key = logo_key("Acme Logo.PNG");
    assert!(key.starts_with("logos/"));
    assert!(key.ends_with(".png"));
    // logos/ + 36-char uuid + .png
    assert_eq!(key.len(), "logos/".len() + 36 + ".png".len());
}

#[test]
fn test_logo_key_falls_back_to_bin() {
    assert!(logo_key("logo").ends_with(".bin"));
    assert!(logo_key("logo.p/ng").ends_with(".bin"));
    assert!(logo_key("logo.").ends_with(".bin"));
}

#[test]
fn test_logo_keys_never_collide() {
    assert_ne!(logo_key("a.png"), logo_key("a.png"));
}

// --- Mock Store ---

#[tokio::test]
async fn test_mock_presign_embeds_key() {
    let storage = MockStorageService::new();
    let url = storage
        .presign_upload("logos/acme.png", "image/png")
        .await
        .unwrap();

    assert!(url.contains("signature=fake"));
    assert!(url.contains("logos/acme.png"));
}

#[tokio::test]
async fn test_unavailable_mock_rejects_presign() {
    let storage = MockStorageService::unavailable();
    let result = storage.presign_upload("logos/acme.png", "image/png").await;
    assert!(matches!(result, Err(StorageError::Presign(_))));
}

#[tokio::test]
async fn test_keys_cannot_escape_the_bucket() {
    let storage = MockStorageService::new();
    let url = storage
        .presign_upload("../../etc/passwd", "text/plain")
        .await
        .unwrap();
    assert!(!url.contains(".."));
    assert_eq!(
        storage.public_url("logos/../../secret.png"),
        "http://localhost:9000/object/public/mock-bucket/logos/secret.png"
    );
}

// --- S3 Client ---

async fn s3() -> S3StorageClient {
    S3StorageClient::new(
        "http://localhost:9000",
        "us-east-1",
        "testkey",
        "testsecret",
        "publisher-logos",
        "http://localhost:9000/",
    )
    .await
}

#[tokio::test]
async fn test_s3_presign_targets_bucket_and_key() {
    let storage = s3().await;
    let key = logo_key("acme.png");

    // Signing happens locally, nothing is sent to the endpoint.
    let url = storage.presign_upload(&key, "image/png").await.unwrap();

    assert!(url.starts_with("http://localhost:9000/publisher-logos/"));
    assert!(url.contains(&key));
    assert!(url.contains("X-Amz-Signature"));
}

#[tokio::test]
async fn test_s3_public_url_uses_public_root() {
    let storage = s3().await;
    assert_eq!(
        storage.public_url("logos/x.png"),
        "http://localhost:9000/object/public/publisher-logos/logos/x.png"
    );
}
