//! Snapshot sources: the public HTTP mirror, or a database already on disk.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pcr_ics_core::config::UpstreamConfig;
use pcr_ics_core::pipeline::{FetchError, Upstream};
use serde_json::Value;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("pcr-ics/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const BROTLI_BUFFER_SIZE: usize = 64 * 1024;

/// Fetches the version document and the brotli-compressed snapshot over HTTP.
pub struct HttpUpstream {
    agent: ureq::Agent,
    version_url: String,
    database_url: String,
    version_field: String,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            version_url: config.version_url.clone(),
            database_url: config.database_url.clone(),
            version_field: config.version_field.clone(),
        }
    }
}

impl Upstream for HttpUpstream {
    fn latest_version(&self) -> Result<String, FetchError> {
        let version_error =
            |source: Box<dyn std::error::Error + Send + Sync>| FetchError::Version {
                url: self.version_url.clone(),
                source,
            };

        debug!(url = %self.version_url, "checking upstream version");
        let body: Value = self
            .agent
            .get(&self.version_url)
            .call()
            .map_err(|err| version_error(err.to_string().into()))?
            .into_json()
            .map_err(|err| version_error(Box::new(err)))?;

        version_from_json(&body, &self.version_field).ok_or_else(|| {
            let reason = format!("field '{}' missing or empty", self.version_field);
            version_error(reason.into())
        })
    }

    fn download_snapshot(&self, version: &str, dest: &Path) -> Result<(), FetchError> {
        info!(url = %self.database_url, version, "downloading snapshot");
        let response = self
            .agent
            .get(&self.database_url)
            .call()
            .map_err(|err| FetchError::Snapshot {
                url: self.database_url.clone(),
                source: err.to_string().into(),
            })?;

        decompress_into(response.into_reader(), dest, &self.database_url)
    }
}

/// Serves a snapshot file already on disk under a caller-supplied version.
///
/// Files ending in `.br` are decompressed, anything else is copied as is.
pub struct LocalUpstream {
    database: PathBuf,
    version: String,
}

impl LocalUpstream {
    pub const fn new(database: PathBuf, version: String) -> Self {
        Self { database, version }
    }
}

impl Upstream for LocalUpstream {
    fn latest_version(&self) -> Result<String, FetchError> {
        Ok(self.version.clone())
    }

    fn download_snapshot(&self, _version: &str, dest: &Path) -> Result<(), FetchError> {
        let location = self.database.display().to_string();
        let snapshot_error = |err: io::Error| FetchError::Snapshot {
            url: location.clone(),
            source: Box::new(err),
        };

        if self.database.extension().is_some_and(|ext| ext == "br") {
            let file = File::open(&self.database).map_err(snapshot_error)?;
            return decompress_into(file, dest, &location);
        }

        fs::copy(&self.database, dest).map_err(snapshot_error)?;
        Ok(())
    }
}

/// Read the data version out of the version document.
///
/// Older mirrors publish it as a number, newer ones as a string.
pub fn version_from_json(body: &Value, field: &str) -> Option<String> {
    match body.get(field)? {
        Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Stream brotli data from `reader` into a new file at `dest`.
///
/// Corrupt or truncated input is reported as [`FetchError::Decompress`],
/// other read or write failures as [`FetchError::Snapshot`].
pub fn decompress_into(reader: impl Read, dest: &Path, location: &str) -> Result<(), FetchError> {
    let snapshot_error = |err: io::Error| FetchError::Snapshot {
        url: location.to_string(),
        source: Box::new(err),
    };

    let mut output = BufWriter::new(File::create(dest).map_err(snapshot_error)?);
    let mut decompressor = brotli::Decompressor::new(reader, BROTLI_BUFFER_SIZE);
    let written = io::copy(&mut decompressor, &mut output).map_err(|err| {
        if matches!(
            err.kind(),
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
        ) {
            FetchError::Decompress {
                source: Box::new(err),
            }
        } else {
            snapshot_error(err)
        }
    })?;
    output.flush().map_err(snapshot_error)?;

    debug!(bytes = written, dest = %dest.display(), "snapshot decompressed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcr_ics_core::error::ErrorCode;
    use serde_json::json;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).expect("compress");
        }
        out
    }

    #[test]
    fn version_field_accepts_string_or_number() {
        assert_eq!(
            version_from_json(&json!({"TruthVersion": "202101211454"}), "TruthVersion"),
            Some("202101211454".to_string())
        );
        assert_eq!(
            version_from_json(&json!({"TruthVersion": 202_101_211_454_u64}), "TruthVersion"),
            Some("202101211454".to_string())
        );
        assert_eq!(version_from_json(&json!({"TruthVersion": ""}), "TruthVersion"), None);
        assert_eq!(version_from_json(&json!({"other": 1}), "TruthVersion"), None);
    }

    #[test]
    fn decompresses_brotli_stream() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("snapshot.db");
        let payload = b"SQLite format 3\0 pretend database contents".repeat(100);

        decompress_into(compress(&payload).as_slice(), &dest, "memory").expect("decompress");
        assert_eq!(fs::read(&dest).expect("read output"), payload);
    }

    #[test]
    fn truncated_stream_is_a_decompress_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("snapshot.db");
        let payload: Vec<u8> = (0..4096_u32).flat_map(|n| (n * 7919).to_le_bytes()).collect();
        let packed = compress(&payload);

        let err = decompress_into(&packed[..packed.len() / 2], &dest, "memory")
            .expect_err("truncated");
        assert_eq!(err.code(), ErrorCode::SnapshotDecompressFailed);
    }

    #[test]
    fn local_upstream_copies_plain_and_decompresses_br() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let plain = dir.path().join("redive_cn.db");
        let packed = dir.path().join("redive_cn.db.br");
        fs::write(&plain, b"plain").expect("write plain");
        fs::write(&packed, compress(b"packed")).expect("write packed");

        let dest = dir.path().join("out.db");
        let upstream = LocalUpstream::new(plain, "7".to_string());
        assert_eq!(upstream.latest_version().expect("version"), "7");
        upstream.download_snapshot("7", &dest).expect("copy");
        assert_eq!(fs::read(&dest).expect("read"), b"plain");

        LocalUpstream::new(packed, "7".to_string())
            .download_snapshot("7", &dest)
            .expect("decompress");
        assert_eq!(fs::read(&dest).expect("read"), b"packed");
    }

    #[test]
    fn missing_local_snapshot_is_fetch_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = LocalUpstream::new(dir.path().join("missing.db"), "1".to_string())
            .download_snapshot("1", &dir.path().join("out.db"))
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::SnapshotFetchFailed);
    }
}
