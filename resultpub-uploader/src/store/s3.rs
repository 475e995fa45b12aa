//! S3-compatible object store.
//!
//! Handles AWS S3 and S3-compatible APIs (MinIO, Ceph RGW, ...). Uses
//! reqwest with manual AWS Signature V4 signing so no SDK dependency is needed.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, Method, Response};
use tracing::debug;

use resultpub_common::config::{Credentials, S3Config};
use resultpub_common::UploadError;

use super::sign::{
    canonical_headers, canonical_query, derive_signing_key, encode_key, hmac_sha256, sha256_hex,
};
use super::{check_size, check_status, list_all_keys, split_endpoint, transport_error, ObjectStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct S3Store {
    config: S3Config,
    credentials: Credentials,
    scheme: &'static str,
    /// Host requests are sent to: `{bucket}.{endpoint}` or, path-style, the
    /// bare endpoint.
    host: String,
    /// `/{bucket}` for path-style addressing, empty otherwise.
    bucket_prefix: String,
    client: Client,
}

impl S3Store {
    pub fn new(config: S3Config, credentials: Credentials) -> anyhow::Result<Self> {
        let (scheme, endpoint_host) = split_endpoint(&config.endpoint);
        let (host, bucket_prefix) = if config.path_style {
            (endpoint_host, format!("/{}", config.bucket_name))
        } else {
            (format!("{}.{}", config.bucket_name, endpoint_host), String::new())
        };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            credentials,
            scheme,
            host,
            bucket_prefix,
            client,
        })
    }

    fn object_path(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_prefix, encode_key(key))
    }

    fn bucket_path(&self) -> String {
        if self.bucket_prefix.is_empty() {
            "/".to_string()
        } else {
            self.bucket_prefix.clone()
        }
    }

    /// Compute AWS Signature V4 for a request.
    fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
        date_time: &str,
        date: &str,
    ) -> String {
        let (canonical_headers, signed_headers) = canonical_headers(headers);
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, query, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            date_time,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            "AWS4",
            &self.credentials.secret_access_key,
            date,
            &self.config.region,
            "s3",
            "aws4_request",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
            self.credentials.access_key_id, credential_scope, signed_headers, signature
        )
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &BTreeMap<String, Option<String>>,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<Response, UploadError> {
        let now = Utc::now();
        let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = sha256_hex(&body);
        let query = canonical_query(query);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.host.clone());
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), date_time.clone());

        let auth = self.sign(
            method.as_str(),
            path,
            &query,
            &headers,
            &payload_hash,
            &date_time,
            &date,
        );

        let url = if query.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, path)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, path, query)
        };

        // reqwest derives Host from the URL.
        let mut req = self.client.request(method, &url);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
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
        path: &str,
        query: BTreeMap<String, Option<String>>,
    ) -> Result<String, UploadError> {
        let resp = self.send(Method::GET, path, &query, Bytes::new(), None).await?;
        resp.text().await.map_err(|e| transport_error(&self.host, e))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn probe(&self) -> Result<(), UploadError> {
        self.send(Method::HEAD, &self.bucket_path(), &BTreeMap::new(), Bytes::new(), None)
            .await?;
        debug!(bucket = %self.config.bucket_name, "S3 bucket reachable");
        Ok(())
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), UploadError> {
        check_size(body.len() as u64, self.max_object_size())?;
        self.send(Method::PUT, &self.object_path(key), &BTreeMap::new(), body, content_type)
            .await?;
        debug!(key = %key, "S3 upload complete");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), UploadError> {
        let result = self
            .send(Method::DELETE, &self.object_path(key), &BTreeMap::new(), Bytes::new(), None)
            .await;
        match result {
            Ok(_) | Err(UploadError::Client { status: 404, .. }) => {
                debug!(key = %key, "S3 delete complete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, UploadError> {
        let bucket_path = self.bucket_path();
        list_all_keys(prefix, |query| self.fetch_text(&bucket_path, query)).await
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.object_path(key))
    }

    fn bucket_label(&self) -> String {
        self.config.bucket_name.clone()
    }
}
