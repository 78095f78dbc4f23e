//! Client for the Forge Model Derivative service.
use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use crate::auth::{Scope, TokenProvider};
use crate::error::{ForgeError, Result};
use crate::{endpoint_url, HTTP_CLIENT};

/// Default base URL of the Forge Model Derivative service.
pub const DEFAULT_MD_BASE_URL: &str = "https://developer.api.autodesk.com/modelderivative/v2";

const READ_SCOPES: &[Scope] = &[Scope::DataRead, Scope::ViewablesRead];
const WRITE_SCOPES: &[Scope] = &[Scope::DataCreate, Scope::DataWrite, Scope::DataRead];

/// Converts an object ID into the base64-encoded (unpadded) form used as a
/// Model Derivative URN.
pub fn urnify(text: &str) -> String {
    STANDARD_NO_PAD.encode(text)
}

/// Translations supported by the service, keyed by output format.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Formats {
    /// Maps each output format to the source file types it can be
    /// generated from.
    pub formats: HashMap<String, Vec<String>>,
}

/// One requested output of a translation job.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OutputFormat {
    /// Output format type, e.g. `"svf"`, `"svf2"`, `"obj"`
    #[serde(rename = "type")]
    pub format_type: String,
    /// Requested views, e.g. `"2d"`, `"3d"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<Vec<String>>,
}

/// Options for the submit job operation
#[derive(Clone, Debug, Default)]
pub struct SubmitJobOptions {
    /// Starting filename when the translated source is a ZIP archive.
    pub root_filename: Option<String>,
    /// Force the processing of a model that has already been translated.
    pub force: bool,
}

/// Response of the submit job operation.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Result of the job submission, e.g. `"created"` or `"success"`
    pub result: String,
    /// URN of the model the job was submitted for
    pub urn: String,
    /// Outputs accepted for processing, as reported by the server
    pub accepted_jobs: Option<serde_json::Value>,
}

/// Translation manifest of a model: the status of all derivatives
/// generated from it.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// URN of the source model
    pub urn: String,
    /// Overall status, e.g. `"pending"`, `"inprogress"`, `"success"`,
    /// `"failed"`
    pub status: String,
    /// Overall progress, e.g. `"25% complete"` or `"complete"`
    pub progress: String,
    /// Region the derivatives are stored in
    pub region: Option<String>,
    /// Whether a thumbnail is available, reported as `"true"`/`"false"`
    pub has_thumbnail: Option<String>,
    /// Generated derivatives. The interior shape varies per output format
    /// and is passed through unparsed.
    #[serde(default)]
    pub derivatives: Vec<serde_json::Value>,
}

/// Viewable structure of a translated model.
#[derive(Clone, Debug, Deserialize)]
pub struct ViewableMetadata {
    /// Display name of the viewable
    pub name: String,
    /// Role of the viewable, e.g. `"2d"` or `"3d"`
    pub role: String,
    /// GUID used to query the viewable's object tree and properties
    pub guid: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MetadataCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub metadata: Vec<ViewableMetadata>,
}

/// Response of the get metadata operation.
#[derive(Clone, Debug, Deserialize)]
pub struct Metadata {
    pub data: MetadataCollection,
}

/// Client of the Forge Model Derivative service.
///
/// The service translates design files into derivatives such as viewable
/// SVF bundles, and exposes the structure and properties of translated
/// models.
///
/// API reference: <https://forge.autodesk.com/en/docs/model-derivative/v2/reference/http>
#[derive(Clone, Debug)]
pub struct ModelDerivativeClient {
    token_provider: Arc<dyn TokenProvider>,
    base_url: String,
}

impl ModelDerivativeClient {
    /// Creates a new client for the public Model Derivative endpoint.
    pub fn new(token_provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_url(token_provider, DEFAULT_MD_BASE_URL)
    }

    /// Creates a new client with a custom base URL, e.g. for testing.
    pub fn with_base_url(
        token_provider: Arc<dyn TokenProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            token_provider,
            base_url: base_url.into(),
        }
    }

    async fn authorize(&self, request: RequestBuilder, scopes: &[Scope]) -> Result<RequestBuilder> {
        let token = self.token_provider.get_token(scopes).await?;
        Ok(request.header("Authorization", format!("Bearer {}", token)))
    }

    /// Returns the list of supported translations, identifying which
    /// types of derivatives can be generated for each source file type.
    pub async fn get_formats(&self) -> Result<Formats> {
        let url = endpoint_url(&self.base_url, &["designdata", "formats"])?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<Formats>().await?)
        }
    }

    /// Translates a design from one format to another.
    ///
    /// # Arguments
    ///
    /// * `urn` - Base64-encoded ID of the object to translate; see
    ///   [`urnify`]
    /// * `output_formats` - The requested outputs, each with at least its
    ///   format type set
    /// * `options` - Options for the job
    pub async fn submit_job(
        &self,
        urn: &str,
        output_formats: &[OutputFormat],
        options: SubmitJobOptions,
    ) -> Result<Job> {
        if urn.is_empty() {
            return Err(ForgeError::required("urn"));
        }
        if output_formats.is_empty() {
            return Err(ForgeError::required("output_formats"));
        }
        let payload = JobPayload {
            input: JobInput {
                urn,
                root_filename: options.root_filename.as_deref(),
                compressed_urn: options.root_filename.is_some().then_some(true),
            },
            output: JobOutput {
                formats: output_formats,
            },
        };
        let mut request = HTTP_CLIENT
            .post(endpoint_url(&self.base_url, &["designdata", "job"])?)
            .json(&payload);
        if options.force {
            request = request.header("x-ads-force", "true");
        }
        let request = self.authorize(request, WRITE_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<Job>().await?)
        }
    }

    /// Gets the manifest of a translated model, i.e. the statuses of all
    /// derivatives generated from it.
    pub async fn get_manifest(&self, urn: &str) -> Result<Manifest> {
        if urn.is_empty() {
            return Err(ForgeError::required("urn"));
        }
        let url = endpoint_url(&self.base_url, &["designdata", urn, "manifest"])?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<Manifest>().await?)
        }
    }

    /// Deletes the manifest and all derivatives generated from a model.
    pub async fn delete_manifest(&self, urn: &str) -> Result<()> {
        if urn.is_empty() {
            return Err(ForgeError::required("urn"));
        }
        let url = endpoint_url(&self.base_url, &["designdata", urn, "manifest"])?;
        let request = self.authorize(HTTP_CLIENT.delete(url), WRITE_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(())
        }
    }

    /// Lists the viewable structures of a translated model. The returned
    /// GUIDs can be used to query object trees and properties.
    pub async fn get_metadata(&self, urn: &str) -> Result<Metadata> {
        if urn.is_empty() {
            return Err(ForgeError::required("urn"));
        }
        let url = endpoint_url(&self.base_url, &["designdata", urn, "metadata"])?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<Metadata>().await?)
        }
    }

    /// Gets the object tree of a specific viewable.
    pub async fn get_object_tree(&self, urn: &str, guid: &str) -> Result<serde_json::Value> {
        if urn.is_empty() {
            return Err(ForgeError::required("urn"));
        }
        if guid.is_empty() {
            return Err(ForgeError::required("guid"));
        }
        let url = endpoint_url(&self.base_url, &["designdata", urn, "metadata", guid])?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<serde_json::Value>().await?)
        }
    }

    /// Gets the properties of all objects in a specific viewable.
    pub async fn get_properties(&self, urn: &str, guid: &str) -> Result<serde_json::Value> {
        if urn.is_empty() {
            return Err(ForgeError::required("urn"));
        }
        if guid.is_empty() {
            return Err(ForgeError::required("guid"));
        }
        let url = endpoint_url(
            &self.base_url,
            &["designdata", urn, "metadata", guid, "properties"],
        )?;
        let request = self.authorize(HTTP_CLIENT.get(url), READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.json::<serde_json::Value>().await?)
        }
    }

    /// Downloads the thumbnail of a translated model.
    ///
    /// # Arguments
    ///
    /// * `urn` - Base64-encoded ID of the translated object
    /// * `width` - Requested width in pixels; acceptable values are 100,
    ///   200 and 400
    /// * `height` - Requested height in pixels; acceptable values are 100,
    ///   200 and 400
    pub async fn get_thumbnail(
        &self,
        urn: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<Bytes> {
        if urn.is_empty() {
            return Err(ForgeError::required("urn"));
        }
        let url = endpoint_url(&self.base_url, &["designdata", urn, "thumbnail"])?;
        let mut request = HTTP_CLIENT.get(url);
        if let Some(width) = width {
            request = request.query(&[("width", width)]);
        }
        if let Some(height) = height {
            request = request.query(&[("height", height)]);
        }
        let request = self.authorize(request, READ_SCOPES).await?;
        let response = request.send().await?;

        if !response.status().is_success() {
            Err(ForgeError::request(response).await)
        } else {
            Ok(response.bytes().await?)
        }
    }
}

#[derive(Debug, Serialize)]
struct JobPayload<'a> {
    input: JobInput<'a>,
    output: JobOutput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInput<'a> {
    urn: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compressed_urn: Option<bool>,
}

#[derive(Debug, Serialize)]
struct JobOutput<'a> {
    formats: &'a [OutputFormat],
}

#[cfg(test)]
mod tests {
    use all_asserts::assert_true;
    use mockito::{Matcher, ServerGuard};

    use crate::auth::StaticTokenProvider;

    use super::*;

    // urnify("urn:adsk.objects:os.object:my-bucket/design.dwg")
    const URN: &str = "dXJuOmFkc2sub2JqZWN0czpvcy5vYmplY3Q6bXktYnVja2V0L2Rlc2lnbi5kd2c";

    fn create_client(server: &ServerGuard) -> ModelDerivativeClient {
        ModelDerivativeClient::with_base_url(Arc::new(StaticTokenProvider::new("xyz")), server.url())
    }

    #[test]
    fn urnify_encodes_without_padding() {
        assert_eq!(urnify("Hello World"), "SGVsbG8gV29ybGQ");
        assert_eq!(urnify("ab"), "YWI");
        assert_eq!(urnify("urn:adsk.objects:os.object:my-bucket/design.dwg"), URN);
    }

    #[tokio::test]
    async fn can_get_formats() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/designdata/formats")
            .match_header("authorization", "Bearer xyz")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"formats":{"svf":["dwg","rvt","ipt"],"obj":["ipt"]}}"#)
            .create_async()
            .await;

        let client = create_client(&server);
        let formats = client.get_formats().await.unwrap();

        assert_eq!(formats.formats["svf"], vec!["dwg", "rvt", "ipt"]);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn can_submit_job() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/designdata/job")
            .match_body(Matcher::Json(serde_json::json!({
                "input": { "urn": URN },
                "output": { "formats": [{ "type": "svf", "views": ["2d", "3d"] }] }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"result":"created","urn":"{}","acceptedJobs":{{"output":{{"formats":[{{"type":"svf"}}]}}}}}}"#,
                URN
            ))
            .create_async()
            .await;

        let client = create_client(&server);
        let job = client
            .submit_job(
                URN,
                &[OutputFormat {
                    format_type: "svf".to_string(),
                    views: Some(vec!["2d".to_string(), "3d".to_string()]),
                }],
                SubmitJobOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(job.result, "created");
        assert_eq!(job.urn, URN);
        assert_true!(job.accepted_jobs.is_some());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn submit_job_sends_archive_options_and_force_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/designdata/job")
            .match_header("x-ads-force", "true")
            .match_body(Matcher::Json(serde_json::json!({
                "input": {
                    "urn": URN,
                    "rootFilename": "design.dwg",
                    "compressedUrn": true
                },
                "output": { "formats": [{ "type": "svf2" }] }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"result":"created","urn":"{}"}}"#, URN))
            .create_async()
            .await;

        let client = create_client(&server);
        client
            .submit_job(
                URN,
                &[OutputFormat {
                    format_type: "svf2".to_string(),
                    views: None,
                }],
                SubmitJobOptions {
                    root_filename: Some("design.dwg".to_string()),
                    force: true,
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn submit_job_rejects_empty_inputs_without_network_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/designdata/job")
            .expect(0)
            .create_async()
            .await;

        let client = create_client(&server);
        let err = client
            .submit_job("", &[], SubmitJobOptions::default())
            .await
            .unwrap_err();
        assert_true!(matches!(err, ForgeError::InvalidInput(_)));

        let err = client
            .submit_job(URN, &[], SubmitJobOptions::default())
            .await
            .unwrap_err();
        assert_true!(matches!(err, ForgeError::InvalidInput(_)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn can_get_manifest() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/designdata/{}/manifest", URN).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{
                    "type": "manifest",
                    "hasThumbnail": "true",
                    "status": "success",
                    "progress": "complete",
                    "region": "US",
                    "urn": "{}",
                    "derivatives": [{{"name": "design.dwg", "status": "success"}}]
                }}"#,
                URN
            ))
            .create_async()
            .await;

        let client = create_client(&server);
        let manifest = client.get_manifest(URN).await.unwrap();

        assert_eq!(manifest.status, "success");
        assert_eq!(manifest.progress, "complete");
        assert_eq!(manifest.derivatives.len(), 1);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_manifest_surfaces_request_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/designdata/{}/manifest", URN).as_str())
            .with_status(404)
            .with_body(r#"{"diagnostic":"Failed to find the resource"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = create_client(&server);
        let err = client.get_manifest(URN).await.unwrap_err();

        assert_true!(matches!(err, ForgeError::Request { status: 404, .. }));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn can_get_metadata() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/designdata/{}/metadata", URN).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "data": {
                        "type": "metadata",
                        "metadata": [
                            {"name": "Scene", "role": "3d", "guid": "4f981e94-8241-4eaf-b08b-cd337c6b8b1f"}
                        ]
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = create_client(&server);
        let metadata = client.get_metadata(URN).await.unwrap();

        assert_eq!(metadata.data.metadata.len(), 1);
        assert_eq!(metadata.data.metadata[0].role, "3d");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn can_get_thumbnail() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/designdata/{}/thumbnail", URN).as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("width".into(), "200".into()),
                Matcher::UrlEncoded("height".into(), "200".into()),
            ]))
            .with_status(200)
            .with_body([0x89, 0x50, 0x4e, 0x47].as_slice())
            .create_async()
            .await;

        let client = create_client(&server);
        let thumbnail = client
            .get_thumbnail(URN, Some(200), Some(200))
            .await
            .unwrap();

        assert_eq!(thumbnail.as_ref(), [0x89, 0x50, 0x4e, 0x47]);

        mock.assert_async().await;
    }
}
