use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use domain_upload::{
    exception::{UploadException, UploadResult},
    model::vo::{
        DeleteOutcome, DraftLinks, FileLinks, FinalizedFile, InitializeRequest, InitializedFile,
        PartAck, RemoteFile, SignedPart,
    },
    service::BackendGateway,
};
use futures::StreamExt;
use reqwest::{
    header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, ETAG},
    Body, Method, RequestBuilder, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};

/// Progress granularity of whole-file uploads.
const CHUNK_SIZE: usize = 64 * 1024;

/// Files REST API of an InvenioRDM draft.
pub struct InvenioBackendGateway {
    client: reqwest::Client,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Entries<T> {
    #[serde(default = "Vec::new")]
    entries: Vec<T>,
}

#[derive(Deserialize)]
struct FileEntry {
    #[serde(default)]
    links: FileLinks,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl InvenioBackendGateway {
    pub fn new(client: reqwest::Client, token: Option<String>) -> Self {
        Self { client, token }
    }

    /// Request to the repository itself, which gets the credentials.
    fn repository(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url).header(ACCEPT, "application/json");
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> UploadResult<Response> {
        request.send().await.map_err(|e| UploadException::Gateway {
            operation: operation.to_owned(),
            status: e.status().map(|el| el.as_u16()),
            message: e.to_string(),
        })
    }

    async fn json<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> UploadResult<T> {
        let response = self.send(operation, request).await?;
        if !response.status().is_success() {
            return Err(rejected(operation, response).await);
        }
        Ok(response
            .json::<T>()
            .await
            .with_context(|| format!("Unexpected {operation} response"))?)
    }
}

/// Turn an error response into a `Gateway` error, keeping the server's message when it has one.
async fn rejected(operation: &str, response: Response) -> UploadException {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|el| el.message)
        .unwrap_or(body);
    UploadException::Gateway {
        operation: operation.to_owned(),
        status: Some(status.as_u16()),
        message,
    }
}

/// Stream `body` in chunks, reporting the running total as the transport pulls them.
fn counted_body(body: Bytes, sent: flume::Sender<u64>) -> Body {
    let size = body.len();
    let chunks = (0..size)
        .step_by(CHUNK_SIZE)
        .map(move |start| body.slice(start..(start + CHUNK_SIZE).min(size)));
    let mut transferred = 0_u64;
    Body::wrap_stream(futures::stream::iter(chunks).map(move |chunk| {
        transferred += chunk.len() as u64;
        // Nobody listening is fine.
        let _ = sent.send(transferred);
        Ok::<_, std::io::Error>(chunk)
    }))
}

fn missing_link(key: &str, link: &str) -> UploadException {
    anyhow::anyhow!("File {key} has no {link} link").into()
}

#[async_trait]
impl BackendGateway for InvenioBackendGateway {
    async fn initialize_upload(
        &self,
        files_url: &str,
        request: &InitializeRequest,
    ) -> UploadResult<InitializedFile> {
        tracing::debug!(key = %request.key, kind = %request.transfer.kind, "Initializing upload.");
        let entries: Entries<InitializedFile> = self
            .json(
                "initialize",
                self.repository(Method::POST, files_url).json(&[request]),
            )
            .await?;
        entries
            .entries
            .into_iter()
            .find(|el| el.key == request.key)
            .ok_or_else(|| anyhow::anyhow!("Server didn't register {}", request.key).into())
    }

    async fn sign_part(
        &self,
        key: &str,
        links: &FileLinks,
        part_number: u64,
    ) -> UploadResult<SignedPart> {
        let url = links.self_link.as_deref().ok_or_else(|| missing_link(key, "self"))?;
        let entry: FileEntry = self.json("sign part", self.repository(Method::GET, url)).await?;
        let total_parts = entry.links.parts.len() as u64;
        entry
            .links
            .part(part_number)
            .cloned()
            .ok_or(UploadException::InvalidPartNumber {
                key: key.to_owned(),
                part_number,
                total_parts,
            })
    }

    async fn upload_part(&self, key: &str, target: &SignedPart, body: Bytes) -> UploadResult<PartAck> {
        let part_number = target.part_number;
        let failed = |reason: String| UploadException::PartUploadFailed {
            key: key.to_owned(),
            part_number,
            reason,
        };
        // Signed targets carry their own authorization.
        let response = self
            .client
            .put(&target.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(UploadException::SignedUrlExpired {
                key: key.to_owned(),
                part_number,
            });
        }
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return Err(failed(format!("server answered {status}")));
        }
        if !status.is_success() {
            return Err(rejected("upload part", response).await);
        }
        let checksum = response
            .headers()
            .get(ETAG)
            .and_then(|el| el.to_str().ok())
            .map(str::to_owned);
        Ok(PartAck {
            part_number,
            checksum,
        })
    }

    async fn upload_content(
        &self,
        key: &str,
        content_url: &str,
        body: Bytes,
        sent: flume::Sender<u64>,
    ) -> UploadResult<()> {
        tracing::debug!(key, size = body.len(), "Sending file content.");
        let response = self
            .send(
                "upload content",
                self.repository(Method::PUT, content_url)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .header(CONTENT_LENGTH, body.len())
                    .body(counted_body(body, sent)),
            )
            .await?;
        if !response.status().is_success() {
            return Err(rejected("upload content", response).await);
        }
        Ok(())
    }

    async fn finalize_upload(&self, key: &str, commit_url: &str) -> UploadResult<FinalizedFile> {
        tracing::debug!(key, "Committing upload.");
        self.json("finalize", self.repository(Method::POST, commit_url)).await
    }

    async fn delete_file(&self, key: &str, links: &FileLinks) -> UploadResult<DeleteOutcome> {
        let url = links.self_link.as_deref().ok_or_else(|| missing_link(key, "self"))?;
        let response = self.send("delete", self.repository(Method::DELETE, url)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            _ => Err(rejected("delete", response).await),
        }
    }

    async fn import_parent_record_files(&self, draft: &DraftLinks) -> UploadResult<Vec<RemoteFile>> {
        let entries: Entries<RemoteFile> = self
            .json(
                "import",
                self.repository(Method::POST, &draft.files_import_url()),
            )
            .await?;
        Ok(entries.entries)
    }
}
