//! 🪣 Storage -- where the export landed, and what it left behind.
//!
//! 🎬 *[the warehouse finishes its export. forty files appear in a bucket, named like
//! barcodes. nobody told us how many. we have to go look.]*
//!
//! 🧠 Knowledge graph:
//! - [`ExportLocation`]: a URL (`gs://`, `s3://`, `file:///`, `memory:///`) resolved to an
//!   `object_store` plus the prefix the export wrote under.
//! - Listing is page-by-page (`page_size`, default 10) so a million-file export doesn't get
//!   slurped into one `Vec` before the first line is propagated.
//! - `object_store` prefixes match whole path segments, so `exports/run1` lists
//!   `exports/run1/000-file` and never `exports/run10/000-file`. The trailing slash the
//!   warehouse tooling insists on is implied.
//! - Zero-byte objects are skipped: directory placeholders are zero bytes, and an empty file has
//!   no lines to propagate anyway.
//!
//! Credentials come from the environment the same way each cloud SDK reads them
//! (`GOOGLE_SERVICE_ACCOUNT`, `AWS_ACCESS_KEY_ID`, ...). Unknown variables are ignored. 🦆

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use tracing::{info, trace};
use url::Url;

/// 📄 One exported object worth reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedObject {
    /// 🗺️ Key inside the store.
    pub path: Path,
    /// 📍 Fully qualified location, e.g. `gs://bucket/exports/000000000000-file`. This is what
    /// ends up in every outcome for this object.
    pub source_location: String,
    pub size_bytes: u64,
}

/// 🪣 An object store plus the prefix an export was written under.
#[derive(Debug, Clone)]
pub struct ExportLocation {
    store: Arc<dyn ObjectStore>,
    url: Url,
    prefix: Path,
}

impl ExportLocation {
    /// 🔧 Resolve a location URL into a live store. Cloud credentials come from env vars.
    pub fn parse(location: &str) -> Result<Self> {
        let url = parse_location_url(location)?;
        let options = store_options(std::env::vars_os());
        let (store, _) = object_store::parse_url_opts(&url, options).with_context(|| {
            format!(
                "💀 Could not build an object store for '{location}'. Supported schemes are \
                 gs://, s3://, file:/// and memory:///, and the cloud ones want credentials in \
                 the environment."
            )
        })?;
        Self::with_store(Arc::from(store), location)
    }

    /// 🧪 Bind a location URL to a store you already have. The prefix is still taken from the URL.
    pub fn with_store(store: Arc<dyn ObjectStore>, location: &str) -> Result<Self> {
        let url = parse_location_url(location)?;
        let prefix = Path::from_url_path(url.path()).with_context(|| {
            format!("💀 The path in '{location}' is not a valid object store prefix")
        })?;
        Ok(Self { store, url, prefix })
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// 📍 `scheme://host/key` for an object in this store.
    pub fn source_location_of(&self, path: &Path) -> String {
        format!(
            "{}://{}/{}",
            self.url.scheme(),
            self.url.host_str().unwrap_or_default(),
            path
        )
    }

    /// 📚 Every exported object under the prefix, one page at a time, sorted within each page.
    pub fn list_exported_objects(
        &self,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<ExportedObject>>> + '_ {
        self.store
            .list(Some(&self.prefix))
            .chunks(page_size.max(1))
            .enumerate()
            .map(move |(page_number, page)| {
                let mut objects = Vec::with_capacity(page.len());
                for meta in page {
                    let meta = meta.with_context(|| {
                        format!("💀 Listing '{}' failed on page {}", self.url, page_number + 1)
                    })?;
                    if is_placeholder(&meta) {
                        trace!("🕳️ skipping placeholder '{}'", meta.location);
                        continue;
                    }
                    objects.push(ExportedObject {
                        source_location: self.source_location_of(&meta.location),
                        size_bytes: meta.size as u64,
                        path: meta.location,
                    });
                }
                objects.sort_by(|a, b| a.path.cmp(&b.path));
                info!(
                    "📚 page {} under '{}': {} object(s) to propagate",
                    page_number + 1,
                    self.url,
                    objects.len()
                );
                Ok(objects)
            })
    }
}

fn parse_location_url(location: &str) -> Result<Url> {
    Url::parse(location).with_context(|| {
        format!("💀 '{location}' is not a URL. Try gs://bucket/prefix or file:///abs/dir")
    })
}

fn is_placeholder(meta: &ObjectMeta) -> bool {
    meta.size == 0
}

/// 🔑 Environment pairs as `object_store` options. Pairs that are not Unicode are dropped.
fn store_options(
    vars: impl Iterator<Item = (OsString, OsString)>,
) -> impl Iterator<Item = (String, String)> {
    vars.filter_map(|(key, value)| {
        Some((key.into_string().ok()?.to_ascii_lowercase(), value.into_string().ok()?))
    })
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use object_store::memory::InMemory;

    use super::*;

    async fn bucket_with(keys: &[(&str, &str)]) -> anyhow::Result<Arc<InMemory>> {
        let store = Arc::new(InMemory::new());
        for (key, body) in keys {
            store
                .put(&Path::from(*key), body.as_bytes().to_vec().into())
                .await?;
        }
        Ok(store)
    }

    #[tokio::test]
    async fn the_one_where_the_listing_comes_in_pages_of_ten() -> anyhow::Result<()> {
        let keys: Vec<(String, String)> = (0..23)
            .map(|i| (format!("exports/run1/{i:012}-file"), format!("{{\"n\":{i}}}\n")))
            .collect();
        let borrowed: Vec<(&str, &str)> =
            keys.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let store = bucket_with(&borrowed).await?;
        let location = ExportLocation::with_store(store, "memory:///exports/run1")?;

        let pages: Vec<Vec<ExportedObject>> =
            location.list_exported_objects(10).try_collect().await?;

        let sizes: Vec<usize> = pages.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        let first = &pages[0][0];
        assert_eq!(first.path, Path::from("exports/run1/000000000000-file"));
        assert_eq!(first.source_location, "memory:///exports/run1/000000000000-file");
        assert_eq!(first.size_bytes, 8);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_placeholders_and_neighbours_are_left_out() -> anyhow::Result<()> {
        let store = bucket_with(&[
            ("exports/run1/000-file", "{}\n"),
            ("exports/run1/empty-dir-marker", ""),
            ("exports/run10/000-file", "{\"not\":\"ours\"}\n"),
            ("exports/other/000-file", "{}\n"),
        ])
        .await?;
        let location = ExportLocation::with_store(store, "memory:///exports/run1/")?;

        let objects: Vec<ExportedObject> = location
            .list_exported_objects(10)
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .flatten()
            .collect();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].path, Path::from("exports/run1/000-file"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_prefix_lists_nothing() -> anyhow::Result<()> {
        let location = ExportLocation::with_store(Arc::new(InMemory::new()), "memory:///nope")?;
        let pages: Vec<Vec<ExportedObject>> =
            location.list_exported_objects(10).try_collect().await?;
        assert!(pages.is_empty());
        Ok(())
    }

    #[test]
    fn the_one_where_a_bucket_url_keeps_its_host() -> anyhow::Result<()> {
        let location =
            ExportLocation::with_store(Arc::new(InMemory::new()), "gs://the-bucket/exports/run1")?;
        assert_eq!(location.prefix(), &Path::from("exports/run1"));
        assert_eq!(
            location.source_location_of(&Path::from("exports/run1/000-file")),
            "gs://the-bucket/exports/run1/000-file"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_a_local_directory_is_a_bucket_too() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let location = ExportLocation::parse(&format!("file://{}", dir.path().display()))?;
        assert!(location.source_location_of(location.prefix()).starts_with("file:///"));
        Ok(())
    }

    #[test]
    fn the_one_where_gibberish_is_not_a_location() {
        assert!(ExportLocation::parse("definitely not a url").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn the_one_where_a_non_unicode_variable_is_left_behind() {
        use std::os::unix::ffi::OsStringExt;

        let the_env = vec![
            (OsString::from("GOOGLE_BUCKET"), OsString::from("exports")),
            (OsString::from("BROKEN"), OsString::from_vec(vec![0x66, 0xff])),
            (OsString::from_vec(vec![0xfe]), OsString::from("value")),
        ];
        let options: Vec<(String, String)> = store_options(the_env.into_iter()).collect();
        assert_eq!(options, vec![("google_bucket".to_string(), "exports".to_string())]);
    }
}
