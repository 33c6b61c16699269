//! Object store writes
//!
//! The pipeline only needs a single PUT-like operation keyed by a string
//! path. Keys come from [`ObjectKey::generate`], which mixes a timestamp, a
//! process-wide sequence number and random bits so two tasks submitted in the
//! same instant never collide.

pub mod http;

pub use http::HttpObjectStore;

use crate::credentials::Credentials;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_BASE_NAME_LEN: usize = 64;

static KEY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Destination of an uploaded object inside the bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Build `{prefix}/{yyyy}/{mm}/{millis}-{seq}-{rand}-{base}{.ext}`
    pub fn generate(path_prefix: &str, file_name: &str, now: DateTime<Utc>) -> Self {
        let (base, extension) = split_file_name(file_name);
        let sequence = KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let random = uuid::Uuid::new_v4().simple().to_string();

        let mut name = format!(
            "{}-{}-{}-{}",
            now.timestamp_millis(),
            sequence,
            &random[..8],
            sanitize_base_name(base)
        );
        if let Some(extension) = extension {
            let extension = sanitize_base_name(extension);
            if !extension.is_empty() && extension != "file" {
                name.push('.');
                name.push_str(&extension);
            }
        }

        let prefix = path_prefix.trim_matches('/');
        let dated = now.format("%Y/%m").to_string();
        if prefix.is_empty() {
            ObjectKey(format!("{}/{}", dated, name))
        } else {
            ObjectKey(format!("{}/{}/{}", prefix, dated, name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn split_file_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < file_name.len() => {
            (&file_name[..pos], Some(&file_name[pos + 1..]))
        }
        _ => (file_name, None),
    }
}

/// Lowercase ASCII alphanumerics, everything else collapsed into single dashes
pub fn sanitize_base_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut last_dash = true;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            sanitized.push('-');
            last_dash = true;
        }
        if sanitized.len() >= MAX_BASE_NAME_LEN {
            break;
        }
    }

    let trimmed = sanitized.trim_matches('-');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Single-shot object write
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        credentials: &Credentials,
        key: &ObjectKey,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;
}
