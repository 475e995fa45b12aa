pub mod directory;
#[cfg(test)]
pub mod memory;
pub mod oss;
pub mod s3;
pub mod sign;

use std::collections::BTreeMap;
use std::future::Future;

use bytes::Bytes;
use resultpub_common::UploadError;

pub use self::directory::DirectoryStore;
pub use self::oss::OssStore;
pub use self::s3::S3Store;
pub use self::sign::encode_key;

/// Largest object a single PUT may carry on S3 and OSS (5 GiB).
pub const MAX_SINGLE_PUT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Raw object I/O against one provider.
///
/// A store knows how to talk to the service; it knows nothing about runs,
/// destination paths or indexes. Backends own that bookkeeping and drive a
/// store through this trait.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Validate that the bucket is reachable with the configured credentials.
    /// Only the Hierarchical backend probes on `connect`; Flat-Key requests
    /// are signed one by one and need no handshake.
    async fn probe(&self) -> Result<(), UploadError>;

    /// Store `body` at `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), UploadError>;

    /// Delete the object at `key`. A missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), UploadError>;

    /// List all object keys under the given prefix. Used by the Flat-Key
    /// backend when resuming from remote state.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, UploadError>;

    /// Public URL of the object at `key`.
    fn public_url(&self, key: &str) -> String;

    /// Human-readable bucket identity, shown on generated pages.
    fn bucket_label(&self) -> String;

    fn max_object_size(&self) -> u64 {
        MAX_SINGLE_PUT_SIZE
    }
}

/// Reject bodies the provider would refuse anyway, before sending them.
pub(crate) fn check_size(size: u64, limit: u64) -> Result<(), UploadError> {
    if size > limit {
        return Err(UploadError::TooLarge { size, limit });
    }
    Ok(())
}

/// Map a transport-level reqwest failure onto the error taxonomy.
pub(crate) fn transport_error(endpoint: &str, err: reqwest::Error) -> UploadError {
    if err.is_timeout() {
        UploadError::Timeout(format!("{}: {}", endpoint, err))
    } else if err.is_connect() {
        UploadError::Connect {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    } else {
        let err = anyhow::Error::new(err).context(format!("request to {} failed", endpoint));
        UploadError::Other(err)
    }
}

/// Turn a non-success response into a client or server error, pulling the
/// `<Code>` and `<Message>` out of the XML error document when there is one.
pub(crate) async fn check_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, UploadError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> UploadError {
    let code = xml_element(body, "Code")
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").replace(' ', ""));
    let message = xml_element(body, "Message").unwrap_or_else(|| body.trim().to_string());
    if status.is_server_error() {
        UploadError::Server {
            status: status.as_u16(),
            code,
            message,
        }
    } else {
        UploadError::Client {
            status: status.as_u16(),
            code,
            message,
        }
    }
}

/// Walk a paged ListObjectsV2 listing. `fetch_page` receives the query
/// parameters of one page and returns the raw XML body.
pub(crate) async fn list_all_keys<F, Fut>(
    prefix: &str,
    mut fetch_page: F,
) -> Result<Vec<String>, UploadError>
where
    F: FnMut(BTreeMap<String, Option<String>>) -> Fut,
    Fut: Future<Output = Result<String, UploadError>>,
{
    let mut keys = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let mut query = BTreeMap::new();
        query.insert("list-type".to_string(), Some("2".to_string()));
        query.insert("prefix".to_string(), Some(prefix.to_string()));
        if let Some(ref t) = token {
            query.insert("continuation-token".to_string(), Some(t.clone()));
        }

        let body = fetch_page(query).await?;
        keys.extend(xml_elements(&body, "Key"));

        let truncated = xml_element(&body, "IsTruncated").as_deref() == Some("true");
        match xml_element(&body, "NextContinuationToken") {
            Some(next) if truncated => token = Some(next),
            _ => break,
        }
    }
    Ok(keys)
}

/// First `<tag>…</tag>` value in an XML document.
pub(crate) fn xml_element(xml: &str, tag: &str) -> Option<String> {
    xml_elements(xml, tag).into_iter().next()
}

/// Every `<tag>…</tag>` value in an XML document, unescaped.
pub(crate) fn xml_elements(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find(&open) {
        remaining = &remaining[start + open.len()..];
        match remaining.find(&close) {
            Some(end) => {
                values.push(unescape_xml(&remaining[..end]));
                remaining = &remaining[end + close.len()..];
            }
            None => break,
        }
    }
    values
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Split an endpoint into scheme and host. Endpoints without a scheme are
/// served over https.
pub(crate) fn split_endpoint(endpoint: &str) -> (&'static str, String) {
    let (scheme, rest) = if let Some(rest) = endpoint.strip_prefix("http://") {
        ("http", rest)
    } else if let Some(rest) = endpoint.strip_prefix("https://") {
        ("https", rest)
    } else {
        ("https", endpoint)
    };
    (scheme, rest.trim_end_matches('/').to_string())
}
