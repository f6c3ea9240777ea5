//! Remote document store speaking the Azure Blob Storage REST protocol.
//!
//! Documents live as block blobs named `<key>.xml` inside a single flat
//! container. Requests are authorised with a shared access signature taken
//! from the connection string, e.g.
//!
//! ```text
//! BlobEndpoint=https://acct.blob.core.windows.net;SharedAccessSignature=sv=2022-11-02&ss=b&sig=…
//! ```
//!
//! The connection string is parsed and the container created on first use,
//! so a misconfigured store only fails the operations that touch it.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header::CONTENT_TYPE};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::application::error::StorageError;
use crate::application::repos::{DocumentStore, RawDocument, validate_key};
use crate::infra::document::{document_key, document_name, tree::Element};

/// Container used when configuration does not name one.
pub const DEFAULT_CONTAINER: &str = "posts";

const API_VERSION: &str = "2021-08-06";
const VERSION_HEADER: &str = "x-ms-version";
const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";
const DOCUMENT_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Endpoint and credentials extracted from a storage connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct BlobConnection {
    endpoint: Url,
    signature: String,
}

impl std::fmt::Debug for BlobConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobConnection")
            .field("endpoint", &self.endpoint.as_str())
            .field("signature", &"<redacted>")
            .finish()
    }
}

impl BlobConnection {
    /// Parse a `Key=Value;…` connection string.
    ///
    /// The endpoint comes from `BlobEndpoint`, or is derived from
    /// `AccountName`, `DefaultEndpointsProtocol` and `EndpointSuffix`.
    /// `SharedAccessSignature` is required.
    pub fn parse(connection_string: &str) -> Result<Self, StorageError> {
        let mut pairs = HashMap::new();
        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let Some((key, value)) = segment.split_once('=') else {
                return Err(StorageError::configuration(
                    "connection string contains a segment without `=`",
                ));
            };
            pairs.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let endpoint = match pairs.get("blobendpoint") {
            Some(endpoint) => endpoint.clone(),
            None => {
                let account = pairs.get("accountname").ok_or_else(|| {
                    StorageError::configuration(
                        "connection string names neither BlobEndpoint nor AccountName",
                    )
                })?;
                let protocol = pairs
                    .get("defaultendpointsprotocol")
                    .map_or("https", String::as_str);
                let suffix = pairs
                    .get("endpointsuffix")
                    .map_or("core.windows.net", String::as_str);
                format!("{protocol}://{account}.blob.{suffix}")
            }
        };

        let endpoint = Url::parse(&endpoint).map_err(|err| {
            StorageError::configuration(format!("invalid blob endpoint `{endpoint}`: {err}"))
        })?;
        if endpoint.cannot_be_a_base() || !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StorageError::configuration(format!(
                "blob endpoint `{endpoint}` must be an http(s) URL"
            )));
        }

        let signature = pairs
            .get("sharedaccesssignature")
            .map(|value| value.trim_start_matches('?').to_string())
            .filter(|value| !value.is_empty());
        let Some(signature) = signature else {
            let message = if pairs.contains_key("accountkey") {
                "account key authentication is not supported; provide a SharedAccessSignature"
            } else {
                "connection string has no SharedAccessSignature"
            };
            return Err(StorageError::configuration(message));
        };

        Ok(Self {
            endpoint,
            signature,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Resolved container location plus credentials.
struct ContainerTarget {
    container_url: Url,
    signature: String,
}

impl ContainerTarget {
    fn new(connection: &BlobConnection, container: &str) -> Result<Self, StorageError> {
        let mut container_url = connection.endpoint.clone();
        container_url
            .path_segments_mut()
            .map_err(|_| StorageError::configuration("blob endpoint cannot carry a path"))?
            .pop_if_empty()
            .push(container);

        Ok(Self {
            container_url,
            signature: connection.signature.clone(),
        })
    }

    fn container(&self, params: &[(&str, &str)]) -> Url {
        self.signed(self.container_url.clone(), params)
    }

    fn blob(&self, name: &str) -> Url {
        let mut url = self.container_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(name);
        }
        self.signed(url, &[])
    }

    fn signed(&self, mut url: Url, params: &[(&str, &str)]) -> Url {
        url.set_query(Some(&self.signature));
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        url
    }
}

pub struct BlobStore {
    connection_string: Option<String>,
    container: String,
    http: Client,
    target: OnceCell<ContainerTarget>,
}

impl BlobStore {
    pub fn new(
        connection_string: Option<String>,
        container: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let http = Client::builder().build().map_err(|err| {
            StorageError::configuration(format!("failed to build HTTP client: {err}"))
        })?;

        Ok(Self {
            connection_string,
            container: container.into(),
            http,
            target: OnceCell::new(),
        })
    }

    async fn target(&self) -> Result<&ContainerTarget, StorageError> {
        self.target
            .get_or_try_init(|| async {
                let raw = self
                    .connection_string
                    .as_deref()
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| {
                        StorageError::configuration(
                            "blob storage selected but no connection string is configured",
                        )
                    })?;
                let connection = BlobConnection::parse(raw)?;
                let target = ContainerTarget::new(&connection, &self.container)?;
                self.create_container(&target).await?;
                info!(
                    endpoint = %connection.endpoint(),
                    container = %self.container,
                    "blob container ready"
                );
                Ok::<_, StorageError>(target)
            })
            .await
    }

    async fn create_container(&self, target: &ContainerTarget) -> Result<(), StorageError> {
        let url = target.container(&[("restype", "container")]);
        let response = self.send(self.http.put(url), "creating container").await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::CONFLICT => Ok(()),
            status => Err(unexpected_status("creating container", status)),
        }
    }

    async fn list_names(&self, target: &ContainerTarget) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = vec![("restype", "container"), ("comp", "list")];
            if let Some(marker) = marker.as_deref() {
                params.push(("marker", marker));
            }
            let url = target.container(&params);

            let response = self.send(self.http.get(url), "listing blobs").await?;
            if !response.status().is_success() {
                return Err(unexpected_status("listing blobs", response.status()));
            }
            let body = read_body(response, "listing blobs").await?;
            let page = parse_listing(&body)?;

            names.extend(page.names);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(names)
    }

    async fn download(&self, target: &ContainerTarget, key: &str) -> Result<Bytes, StorageError> {
        let name = document_name(key);
        let response = self
            .send(self.http.get(target.blob(&name)), "downloading blob")
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::not_found(key)),
            status if status.is_success() => read_body(response, "downloading blob").await,
            status => Err(unexpected_status("downloading blob", status)),
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response, StorageError> {
        request
            .header(VERSION_HEADER, API_VERSION)
            .send()
            .await
            .map_err(|err| StorageError::unavailable_with(format!("{action} failed"), err))
    }
}

#[async_trait]
impl DocumentStore for BlobStore {
    async fn list(&self) -> Result<Vec<RawDocument>, StorageError> {
        let target = self.target().await?;
        let names = self.list_names(target).await?;

        let mut documents = Vec::new();
        for name in names {
            let Some(key) = document_key(&name) else {
                continue;
            };
            if validate_key(key).is_err() {
                debug!(blob = %name, "skipping blob outside the flat document namespace");
                continue;
            }

            match self.download(target, key).await {
                Ok(body) => documents.push(RawDocument::new(key, body)),
                Err(StorageError::NotFound { .. }) => {
                    debug!(key, "document removed while listing");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(documents)
    }

    async fn read(&self, key: &str) -> Result<RawDocument, StorageError> {
        validate_key(key)?;
        let target = self.target().await?;
        let body = self.download(target, key).await?;
        Ok(RawDocument::new(key, body))
    }

    async fn write(&self, key: &str, text: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let target = self.target().await?;
        let request = self
            .http
            .put(target.blob(&document_name(key)))
            .header(BLOB_TYPE_HEADER, "BlockBlob")
            .header(CONTENT_TYPE, DOCUMENT_CONTENT_TYPE)
            .body(text.to_owned());

        let response = self.send(request, "uploading blob").await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected_status("uploading blob", response.status()))
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let target = self.target().await?;
        let response = self
            .send(
                self.http.delete(target.blob(&document_name(key))),
                "deleting blob",
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(unexpected_status("deleting blob", status)),
        }
    }

    fn describe(&self) -> String {
        format!("blob container `{}`", self.container)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ListingPage {
    names: Vec<String>,
    next_marker: Option<String>,
}

fn parse_listing(body: &[u8]) -> Result<ListingPage, StorageError> {
    let text = std::str::from_utf8(body)
        .map_err(|err| StorageError::unavailable_with("blob listing is not valid utf-8", err))?;
    let root = Element::parse(text.trim_start_matches('\u{feff}'))
        .map_err(|err| StorageError::unavailable_with("blob listing is not valid xml", err))?;

    let names = root
        .child("Blobs")
        .map(|blobs| {
            blobs
                .children_named("Blob")
                .filter_map(|blob| blob.child("Name"))
                .map(|name| name.text().to_string())
                .collect()
        })
        .unwrap_or_default();
    let next_marker = root
        .child("NextMarker")
        .map(|marker| marker.text().trim().to_string())
        .filter(|marker| !marker.is_empty());

    Ok(ListingPage { names, next_marker })
}

async fn read_body(response: Response, action: &str) -> Result<Bytes, StorageError> {
    response
        .bytes()
        .await
        .map_err(|err| StorageError::unavailable_with(format!("{action}: reading body failed"), err))
}

fn unexpected_status(action: &str, status: StatusCode) -> StorageError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::configuration(format!(
            "{action} was rejected with status {status}; check the shared access signature"
        )),
        _ => StorageError::unavailable(format!("{action} returned status {status}")),
    }
}
