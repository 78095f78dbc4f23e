//! Client for the Forge Data Management object storage service (OSS).
use std::sync::Arc;

use bytes::Bytes;
use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use reqwest::{Body, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::auth::{Scope, TokenProvider};
use crate::error::{ForgeError, Result};
use crate::{endpoint_url, HTTP_CLIENT};

/// Default base URL of the Forge object storage service.
pub const DEFAULT_OSS_BASE_URL: &str = "https://developer.api.autodesk.com/oss/v2";

const READ_SCOPES: &[Scope] = &[Scope::BucketRead, Scope::DataRead];
const WRITE_SCOPES: &[Scope] = &[Scope::BucketCreate, Scope::DataCreate, Scope::DataWrite];
const DELETE_SCOPES: &[Scope] = &[Scope::BucketDelete];

/// Region where a bucket resides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Region {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "EMEA")]
    Emea,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Emea => "EMEA",
        }
    }
}

/// Data retention policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Cache-like storage for ephemeral results; objects older than 24
    /// hours are removed automatically.
    Transient,
    /// Storage for artifacts that are rarely accessed after some period of
    /// activity; objects are deleted after 30 days.
    Temporary,
    /// Storage for user data; objects persist until deleted by the owner.
    Persistent,
}

/// Summary of a bucket returned by the list operation.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Globally unique key of the bucket
    pub bucket_key: String,
    /// The time the bucket was created
    #[serde(with = "ts_milliseconds")]
    pub created_date: DateTime<Utc>,
    /// Retention policy applied to objects in the bucket
    pub policy_key: RetentionPolicy,
}

/// Access grant on a bucket.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPermission {
    /// Application that has access to the bucket
    pub auth_id: String,
    /// Granted access level, e.g. `"full"` or `"read"`
    pub access: String,
}

/// Full bucket record returned by the create and details operations.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketDetails {
    /// Globally unique key of the bucket
    pub bucket_key: String,
    /// Application that owns the bucket
    pub bucket_owner: String,
    /// The time the bucket was created
    #[serde(with = "ts_milliseconds")]
    pub created_date: DateTime<Utc>,
    /// Applications with access to the bucket
    #[serde(default)]
    pub permissions: Vec<BucketPermission>,
    /// Retention policy applied to objects in the bucket
    pub policy_key: RetentionPolicy,
}

/// One page of buckets.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BucketsPage {
    /// Buckets found by the operation
    pub items: Vec<Bucket>,
    /// Absolute URL of the next page, when more results are available
    pub next: Option<String>,
}

/// Metadata of an object stored in a bucket.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDetails {
    /// Key of the bucket the object is stored in
    pub bucket_key: String,
    /// URN uniquely identifying the object
    pub object_id: String,
    /// Name of the object within its bucket
    pub object_key: String,
    /// SHA-1 digest of the object content, when reported
    pub sha1: Option<String>,
    /// Size of the object in bytes, when reported
    pub size: Option<u64>,
    /// Content type of the object, when reported
    pub content_type: Option<String>,
    /// URL the object content can be downloaded from
    pub location: String,
}

/// One page of objects.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ObjectsPage {
    /// Objects found by the operation
    pub items: Vec<ObjectDetails>,
    /// Absolute URL of the next page, when more results are available
    pub next: Option<String>,
}

/// Options for the list buckets operation
#[derive(Clone, Debug, Default)]
pub struct ListBucketsOptions {
    /// Region the listed buckets reside in. Server default is US.
    pub region: Option<Region>,
    /// Limit to the response size, 1-100. Server default is 10.
    pub limit: Option<u64>,
    /// Bucket key to use as an offset to continue pagination. This is
    /// typically the last bucket key of a preceding page.
    pub start_at: Option<String>,
}

/// Options for the list objects operation
#[derive(Clone, Debug, Default)]
pub struct ListObjectsOptions {
    /// Number of objects to return, 1-100. Server default is 10.
    pub limit: Option<u64>,
    /// Restricts the result set to objects whose key begins with the
    /// provided string.
    pub begins_with: Option<String>,
    /// Position to start listing the result set at.
    pub start_at: Option<String>,
}

/// Client of the Forge object storage service.
///
/// Buckets are arbitrary spaces created by applications to store objects
/// for later retrieval; a bucket is owned by the application that created
/// it. Every method is a single round trip to the remote service; nothing
/// is cached locally.
///
/// API reference: <https://forge.autodesk.com/en/docs/data/v2/reference/http>
#[derive(Clone, Debug)]
pub struct OssClient {
    token_provider: Arc<dyn TokenProvider>,
    base_url: String,
}

impl OssClient {
    /// Creates a new client for the public OSS endpoint.
    pub fn new(token_provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_url(token_provider, DEFAULT_OSS_BASE_URL)
    }

    /// Creates a new client with a custom base URL, e.g. for testing.
    pub fn with_base_url(token_provider: Arc<dyn TokenProvider>, base_url: impl Into<String>) -> Self {
        Self {
            token_provider,
            base_url: base_url.into(),
        }
    }

    async fn authorize(&self, request: RequestBuilder, scopes: &[Scope]) -> Result<RequestBuilder> {
        let token = self.token_provider.get_token(scopes).await?;
        Ok(request.header("Authorization", format!("Bearer {}", token)))
    }

    /// Lists buckets owned by the application, one page at a time.
    ///
    /// # Arguments
    ///
    /// * `options` - Options for the list operation
    ///
    /// # Returns
    ///
    /// One page of buckets together with the link to the next page when
    /// more results are available. Use [`list_all_buckets`](Self::list_all_buckets)
    /// to follow the links automatically.
    pub async fn list_buckets(&self, options: ListBucketsOptions) -> Result<BucketsPage> {
        let mut request = HTTP_CLIENT.get(endpoint_url(&self.base_url, &["buckets"])?);
        if let Some(region) = options.region {
            request = request.query(&[("region", region.as_str())]);
        }
        if let Some(limit) = options.limit {
            request = request.query(&[("limit", limit)]);
        }
        if let Some(start_at) = options.start_at {
            request = request.query(&[("startAt", start_at)]);
        }
        request = self.authorize(request, READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<BucketsPage>().await?)
        }
    }

    /// Lists all buckets owned by the application, following pagination
    /// links until the result set is exhausted.
    pub async fn list_all_buckets(&self, region: Option<Region>) -> Result<Vec<Bucket>> {
        let mut page = self
            .list_buckets(ListBucketsOptions {
                region,
                ..Default::default()
            })
            .await?;
        let mut buckets = Vec::new();
        loop {
            buckets.append(&mut page.items);
            match page.next {
                Some(next) => page = self.follow_page(&next).await?,
                None => break,
            }
        }
        Ok(buckets)
    }

    async fn follow_page<T: serde::de::DeserializeOwned>(&self, next_url: &str) -> Result<T> {
        let request = self.authorize(HTTP_CLIENT.get(next_url), READ_SCOPES).await?;
        let response = request.send().await?;
        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<T>().await?)
        }
    }

    /// Gets the details of a bucket owned by the application. A request
    /// for a bucket owned by another application results in a 403.
    pub async fn get_bucket_details(&self, bucket_key: &str) -> Result<BucketDetails> {
        validate_bucket_key(bucket_key)?;
        let url = endpoint_url(&self.base_url, &["buckets", bucket_key, "details"])?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<BucketDetails>().await?)
        }
    }

    /// Creates a bucket.
    ///
    /// # Arguments
    ///
    /// * `bucket_key` - A unique name assigned to the bucket. It must be
    ///   globally unique across all applications and regions, 3-128
    ///   characters of `-_.a-z0-9`, and cannot be changed later
    /// * `policy` - Data retention policy for objects in the bucket
    /// * `region` - The region where the bucket resides
    pub async fn create_bucket(
        &self,
        bucket_key: &str,
        policy: RetentionPolicy,
        region: Region,
    ) -> Result<BucketDetails> {
        validate_bucket_key(bucket_key)?;
        let request = HTTP_CLIENT
            .post(endpoint_url(&self.base_url, &["buckets"])?)
            .header("x-ads-region", region.as_str())
            .json(&CreateBucketBody {
                bucket_key,
                policy_key: policy,
            });
        let request = self.authorize(request, WRITE_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<BucketDetails>().await?)
        }
    }

    /// Deletes a bucket. The bucket must be owned by the application.
    pub async fn delete_bucket(&self, bucket_key: &str) -> Result<()> {
        validate_bucket_key(bucket_key)?;
        let url = endpoint_url(&self.base_url, &["buckets", bucket_key])?;
        let request = self.authorize(HTTP_CLIENT.delete(url), DELETE_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(())
        }
    }

    /// Lists objects in a bucket, one page at a time. Only available to
    /// the bucket creator.
    pub async fn list_objects(
        &self,
        bucket_key: &str,
        options: ListObjectsOptions,
    ) -> Result<ObjectsPage> {
        validate_bucket_key(bucket_key)?;
        let url = endpoint_url(&self.base_url, &["buckets", bucket_key, "objects"])?;
        let mut request = HTTP_CLIENT.get(url);
        if let Some(limit) = options.limit {
            request = request.query(&[("limit", limit)]);
        }
        if let Some(begins_with) = options.begins_with {
            request = request.query(&[("beginsWith", begins_with)]);
        }
        if let Some(start_at) = options.start_at {
            request = request.query(&[("startAt", start_at)]);
        }
        request = self.authorize(request, READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<ObjectsPage>().await?)
        }
    }

    /// Lists all objects in a bucket, following pagination links until the
    /// result set is exhausted.
    pub async fn list_all_objects(
        &self,
        bucket_key: &str,
        begins_with: Option<String>,
    ) -> Result<Vec<ObjectDetails>> {
        let mut page = self
            .list_objects(
                bucket_key,
                ListObjectsOptions {
                    begins_with,
                    ..Default::default()
                },
            )
            .await?;
        let mut objects = Vec::new();
        loop {
            objects.append(&mut page.items);
            match page.next {
                Some(next) => page = self.follow_page(&next).await?,
                None => break,
            }
        }
        Ok(objects)
    }

    /// Gets the metadata of a single object.
    pub async fn get_object_details(
        &self,
        bucket_key: &str,
        object_key: &str,
    ) -> Result<ObjectDetails> {
        validate_bucket_key(bucket_key)?;
        validate_object_key(object_key)?;
        let url = endpoint_url(
            &self.base_url,
            &["buckets", bucket_key, "objects", object_key, "details"],
        )?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<ObjectDetails>().await?)
        }
    }

    /// Uploads an object. If the object name already exists in the bucket,
    /// the uploaded content overwrites the existing content.
    ///
    /// # Arguments
    ///
    /// * `bucket_key` - Key of the bucket to upload into
    /// * `object_key` - Name of the object to be created
    /// * `body` - Content to upload
    ///
    /// # Returns
    ///
    /// The metadata of the uploaded object.
    pub async fn upload_object(
        &self,
        bucket_key: &str,
        object_key: &str,
        body: impl Into<Body> + Send,
    ) -> Result<ObjectDetails> {
        validate_bucket_key(bucket_key)?;
        validate_object_key(object_key)?;
        let url = endpoint_url(&self.base_url, &["buckets", bucket_key, "objects", object_key])?;
        let request = HTTP_CLIENT.put(url).body(body);
        let request = self.authorize(request, WRITE_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<ObjectDetails>().await?)
        }
    }

    /// Downloads the content of an object.
    pub async fn download_object(&self, bucket_key: &str, object_key: &str) -> Result<Bytes> {
        validate_bucket_key(bucket_key)?;
        validate_object_key(object_key)?;
        let url = endpoint_url(&self.base_url, &["buckets", bucket_key, "objects", object_key])?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.bytes().await?)
        }
    }

    /// Deletes an object from a bucket.
    pub async fn delete_object(&self, bucket_key: &str, object_key: &str) -> Result<()> {
        validate_bucket_key(bucket_key)?;
        validate_object_key(object_key)?;
        let url = endpoint_url(&self.base_url, &["buckets", bucket_key, "objects", object_key])?;
        let request = self.authorize(HTTP_CLIENT.delete(url), DELETE_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBucketBody<'a> {
    bucket_key: &'a str,
    policy_key: RetentionPolicy,
}

fn validate_bucket_key(bucket_key: &str) -> Result<()> {
    if bucket_key.is_empty() {
        return Err(ForgeError::required("bucket_key"));
    }
    let valid_chars = bucket_key
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '.'));
    if bucket_key.len() < 3 || bucket_key.len() > 128 || !valid_chars {
        return Err(ForgeError::InvalidInput(format!(
            "bucket key '{}' must be 3-128 characters of -_.a-z0-9",
            bucket_key
        )));
    }
    Ok(())
}

fn validate_object_key(object_key: &str) -> Result<()> {
    if object_key.is_empty() {
        return Err(ForgeError::required("object_key"));
    }
    Ok(())
}
