use std::env;
use std::sync::Arc;

use all_asserts::assert_true;
use futures::stream;
use futures::stream::StreamExt;
use futures::stream::TryStreamExt;
use once_cell::sync::Lazy;
use serial_test::serial;

use forge_sdk::auth::AuthenticationClient;
use forge_sdk::auth::OAuthTokenProvider;
use forge_sdk::auth::Scope;
use forge_sdk::auth::TokenProvider;
use forge_sdk::md::ModelDerivativeClient;
use forge_sdk::oss::ListObjectsOptions;
use forge_sdk::oss::OssClient;

/// These integration tests run against the real Forge platform. As a result
/// they are ignored by default. To run them, set the environment variables
/// FORGE_CLIENT_ID and FORGE_CLIENT_SECRET to the credentials of a Forge
/// app, and FORGE_BUCKET to the key of a bucket owned by that app.
///
/// Note that these tests will delete objects (hopefully only objects whose
/// key starts with `forge_sdk_unittest` but be careful).

const TEST_PREFIX: &str = "forge_sdk_unittest";

static PROVIDER: Lazy<Arc<dyn TokenProvider>> = Lazy::new(|| {
    Arc::new(OAuthTokenProvider::new(
        env::var("FORGE_CLIENT_ID").unwrap(),
        env::var("FORGE_CLIENT_SECRET").unwrap(),
    ))
});

fn test_bucket() -> String {
    env::var("FORGE_BUCKET").unwrap()
}

async fn delete_test_objects(client: &OssClient) {
    let objects = client
        .list_all_objects(&test_bucket(), Some(TEST_PREFIX.to_string()))
        .await
        .unwrap();

    stream::iter(
        objects
            .iter()
            .map(|obj| client.delete_object(&obj.bucket_key, &obj.object_key)),
    )
    .buffer_unordered(10)
    .try_for_each(|_| async { Ok(()) })
    .await
    .unwrap();
}

async fn count_test_objects(client: &OssClient) -> usize {
    client
        .list_all_objects(&test_bucket(), Some(TEST_PREFIX.to_string()))
        .await
        .unwrap()
        .len()
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_authenticate() {
    let client = AuthenticationClient::new();
    let token = client
        .authenticate(
            &env::var("FORGE_CLIENT_ID").unwrap(),
            &env::var("FORGE_CLIENT_SECRET").unwrap(),
            &[Scope::ViewablesRead],
        )
        .await
        .unwrap();

    assert_true!(!token.access_token.is_empty());
    assert_eq!(token.token_type, "Bearer");
    assert_true!(token.expires_in > 0);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_list_buckets() {
    let client = OssClient::new(PROVIDER.clone());
    let buckets = client.list_all_buckets(None).await.unwrap();

    for bucket in buckets {
        assert_true!(!bucket.bucket_key.is_empty());
    }
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_get_bucket_details() {
    let client = OssClient::new(PROVIDER.clone());
    let details = client.get_bucket_details(&test_bucket()).await.unwrap();

    assert_eq!(details.bucket_key, test_bucket());
    assert_true!(!details.bucket_owner.is_empty());
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_object_roundtrip() {
    let client = OssClient::new(PROVIDER.clone());

    delete_test_objects(&client).await;
    assert_eq!(count_test_objects(&client).await, 0);

    let object_key = format!("{}/a.txt", TEST_PREFIX);
    let uploaded = client
        .upload_object(&test_bucket(), &object_key, "This is a test...")
        .await
        .unwrap();
    assert_eq!(uploaded.object_key, object_key);

    let details = client
        .get_object_details(&test_bucket(), &object_key)
        .await
        .unwrap();
    assert_eq!(details.size, Some("This is a test...".len() as u64));

    let contents = client
        .download_object(&test_bucket(), &object_key)
        .await
        .unwrap();
    assert_eq!(contents, "This is a test...".as_bytes());

    delete_test_objects(&client).await;
    assert_eq!(count_test_objects(&client).await, 0);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_list_objects_paging() {
    let client = OssClient::new(PROVIDER.clone());

    delete_test_objects(&client).await;

    for idx in 0..5 {
        client
            .upload_object(
                &test_bucket(),
                &format!("{}/a{}.txt", TEST_PREFIX, idx),
                "some content",
            )
            .await
            .unwrap();
    }

    let first_page = client
        .list_objects(
            &test_bucket(),
            ListObjectsOptions {
                limit: Some(3),
                begins_with: Some(TEST_PREFIX.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(first_page.items.len(), 3);
    assert_true!(first_page.next.is_some());

    assert_eq!(count_test_objects(&client).await, 5);

    delete_test_objects(&client).await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_get_formats() {
    let client = ModelDerivativeClient::new(PROVIDER.clone());
    let formats = client.get_formats().await.unwrap();

    assert_true!(!formats.formats.is_empty());
}
