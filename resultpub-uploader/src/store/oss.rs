//! Aliyun OSS object store.
//!
//! Signs requests with OSS Signature V4 (`OSS4-HMAC-SHA256`), which reuses
//! the SigV4 key-derivation ladder with an `aliyun_v4` secret prefix. Payloads
//! are sent unsigned, as the OSS SDKs do.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, Method, Response};
use tracing::debug;

use resultpub_common::config::{Credentials, OssConfig};
use resultpub_common::UploadError;

use super::sign::{
    canonical_headers, canonical_query, derive_signing_key, encode_key, hmac_sha256, sha256_hex,
};
use super::{check_size, check_status, list_all_keys, split_endpoint, transport_error, ObjectStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

pub struct OssStore {
    config: OssConfig,
    credentials: Credentials,
    region: String,
    scheme: &'static str,
    /// `{bucket}.{endpoint}`
    host: String,
    client: Client,
}

impl OssStore {
    pub fn new(config: OssConfig, credentials: Credentials) -> anyhow::Result<Self> {
        let (scheme, endpoint_host) = split_endpoint(&config.endpoint);
        let region = match config.region.clone() {
            Some(region) => region,
            None => region_from_endpoint(&endpoint_host).with_context(|| {
                format!(
                    "Cannot derive OSS region from endpoint '{}'; set region explicitly",
                    config.endpoint
                )
            })?,
        };
        let host = format!("{}.{}", config.bucket_name, endpoint_host);
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            credentials,
            region,
            scheme,
            host,
            client,
        })
    }

    /// Resource path as it appears in the canonical request: the bucket is
    /// always part of it, even though requests go to the bucket's host.
    fn canonical_uri(&self, encoded_path: &str) -> String {
        format!("/{}{}", self.config.bucket_name, encoded_path)
    }

    fn sign(
        &self,
        method: &str,
        canonical_uri: &str,
        query: &str,
        headers: &BTreeMap<String, String>,
        date_time: &str,
        date: &str,
    ) -> String {
        let (canonical_headers, _) = canonical_headers(headers);
        // No additional headers are signed, so that line stays empty.
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n\n{}",
            method, canonical_uri, query, canonical_headers, UNSIGNED_PAYLOAD
        );

        let scope = format!("{}/{}/oss/aliyun_v4_request", date, self.region);
        let string_to_sign = format!(
            "OSS4-HMAC-SHA256\n{}\n{}\n{}",
            date_time,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            "aliyun_v4",
            &self.credentials.secret_access_key,
            date,
            &self.region,
            "oss",
            "aliyun_v4_request",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "OSS4-HMAC-SHA256 Credential={}/{},Signature={}",
            self.credentials.access_key_id, scope, signature
        )
    }

    /// `encoded_path` is the URL path below the bucket host, starting with `/`.
    async fn send(
        &self,
        method: Method,
        encoded_path: &str,
        query: &BTreeMap<String, Option<String>>,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<Response, UploadError> {
        let now = Utc::now();
        let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let query = canonical_query(query);

        let mut headers = BTreeMap::new();
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        headers.insert("x-oss-content-sha256".to_string(), UNSIGNED_PAYLOAD.to_string());
        headers.insert("x-oss-date".to_string(), date_time.clone());

        let auth = self.sign(
            method.as_str(),
            &self.canonical_uri(encoded_path),
            &query,
            &headers,
            &date_time,
            &date,
        );

        let url = if query.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, encoded_path)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, encoded_path, query)
        };

        let mut req = self.client.request(method, &url);
        for (name, value) in &headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .header("Authorization", auth)
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(&self.host, e))?;
        check_status(resp).await
    }

    async fn fetch_text(
        &self,
        query: BTreeMap<String, Option<String>>,
    ) -> Result<String, UploadError> {
        let resp = self.send(Method::GET, "/", &query, Bytes::new(), None).await?;
        resp.text().await.map_err(|e| transport_error(&self.host, e))
    }
}

/// `oss-cn-hangzhou.aliyuncs.com` and `oss-cn-hangzhou-internal.aliyuncs.com`
/// both serve region `cn-hangzhou`.
pub(crate) fn region_from_endpoint(endpoint_host: &str) -> Option<String> {
    let first = endpoint_host.split('.').next()?;
    let region = first.strip_prefix("oss-")?;
    let region = region.strip_suffix("-internal").unwrap_or(region);
    if region.is_empty() {
        None
    } else {
        Some(region.to_string())
    }
}

#[async_trait]
impl ObjectStore for OssStore {
    /// GetBucketInfo doubles as the credential check.
    async fn probe(&self) -> Result<(), UploadError> {
        let mut query = BTreeMap::new();
        query.insert("bucketInfo".to_string(), None);
        self.send(Method::GET, "/", &query, Bytes::new(), None).await?;
        debug!(bucket = %self.config.bucket_name, "OSS bucket reachable");
        Ok(())
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), UploadError> {
        check_size(body.len() as u64, self.max_object_size())?;
        let path = format!("/{}", encode_key(key));
        self.send(Method::PUT, &path, &BTreeMap::new(), body, content_type)
            .await?;
        debug!(key = %key, "OSS upload complete");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), UploadError> {
        let path = format!("/{}", encode_key(key));
        match self
            .send(Method::DELETE, &path, &BTreeMap::new(), Bytes::new(), None)
            .await
        {
            Ok(_) | Err(UploadError::Client { status: 404, .. }) => {
                debug!(key = %key, "OSS delete complete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, UploadError> {
        list_all_keys(prefix, |query| self.fetch_text(query)).await
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme, self.host, encode_key(key))
    }

    fn bucket_label(&self) -> String {
        self.config.bucket_name.clone()
    }
}
