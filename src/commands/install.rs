use super::payload::{self, Payload};
use super::{HandlerContext, Outcome, inventory};
use crate::artifacts::{VerifiedArtifact, install_all};
use crate::error::ArtifactError;
use crate::gateway::Command;
use serde_json::{Map, Value, json};
use std::time::Instant;

/// One entry of the `files` array.
struct FileSpec {
    url: String,
    kind: String,
    sha256: Option<String>,
    version_code: Option<i64>,
    version_name: Option<String>,
}

impl FileSpec {
    fn parse(entry: &Payload) -> Option<Self> {
        Some(Self {
            url: payload::string(entry, "url")?,
            kind: payload::string(entry, "kind").unwrap_or_else(|| "apk".into()),
            sha256: payload::string(entry, "sha256"),
            version_code: payload::integer(entry, "version_code").filter(|v| *v >= 0),
            version_name: payload::string(entry, "version_name"),
        })
    }

    fn meta(&self, artifact: &VerifiedArtifact) -> Value {
        let mut meta = Map::new();
        meta.insert("url".into(), self.url.clone().into());
        meta.insert("kind".into(), self.kind.clone().into());
        meta.insert("expected_sha256".into(), json!(self.sha256));
        meta.insert("actual_sha256".into(), artifact.actual_sha256.clone().into());
        meta.insert("bytes".into(), artifact.byte_length.into());
        meta.insert("download_ms".into(), millis(artifact.download_duration).into());
        if let Some(code) = self.version_code {
            meta.insert("version_code".into(), code.into());
        }
        if let Some(name) = &self.version_name {
            meta.insert("version_name".into(), name.clone().into());
        }
        Value::Object(meta)
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub async fn install_apk_package(
    ctx: &HandlerContext<'_>,
    cmd: &Command,
) -> anyhow::Result<Outcome> {
    let started = Instant::now();
    let Some(body) = cmd.payload.as_ref() else {
        return Ok(Outcome::fail("missing_payload"));
    };
    let Some(package) = payload::string(body, "package") else {
        return Ok(Outcome::fail("missing_package"));
    };
    let entries: Vec<&Payload> = body
        .get("files")
        .and_then(Value::as_array)
        .map(|files| files.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();
    if entries.is_empty() {
        return Ok(Outcome::fail("missing_files"));
    }
    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        match FileSpec::parse(entry) {
            Some(spec) => specs.push(spec),
            None => return Ok(Outcome::fail("missing_url")),
        }
    }

    let request_id = ctx.request_id(cmd);
    let mut meta = Map::new();
    meta.insert("package".into(), package.clone().into());
    meta.insert(
        "install_type".into(),
        payload::string(body, "install_type").unwrap_or_default().into(),
    );
    if let Some(release) = payload::integer(body, "release_file_id").filter(|id| *id > 0) {
        meta.insert("release_file_id".into(), release.into());
    }
    tracing::info!(
        request_id = request_id.as_str(),
        package = package.as_str(),
        files = specs.len(),
        "install start"
    );

    let mut artifacts = Vec::with_capacity(specs.len());
    let mut file_meta = Vec::with_capacity(specs.len());
    let mut failure: Option<(String, Option<Value>)> = None;
    for spec in &specs {
        match ctx
            .fetcher
            .fetch_and_verify(
                &spec.url,
                spec.sha256.as_deref(),
                &spec.kind,
                ctx.max_artifact_bytes,
            )
            .await
        {
            Ok(artifact) => {
                file_meta.push(spec.meta(&artifact));
                artifacts.push(artifact);
            }
            Err(e) => {
                let detail = match &e {
                    ArtifactError::ChecksumMismatch {
                        expected,
                        actual,
                        bytes,
                    } => Some(json!({
                        "url": spec.url,
                        "expected_sha256": expected,
                        "actual_sha256": actual,
                        "bytes": bytes,
                    })),
                    ArtifactError::FileTooLarge { bytes, limit } => Some(json!({
                        "url": spec.url,
                        "bytes": bytes,
                        "limit": limit,
                    })),
                    _ => None,
                };
                failure = Some((e.to_string(), detail));
                break;
            }
        }
    }

    let outcome = if let Some((error, detail)) = failure {
        for artifact in &artifacts {
            artifact.discard();
        }
        if let Some(detail) = detail {
            meta.insert("failure".into(), detail);
        }
        tracing::warn!(request_id = request_id.as_str(), package = package.as_str(), "install aborted: {error}");
        Outcome::fail(error)
    } else {
        match install_all(ctx.installer, &package, &artifacts) {
            Ok(()) => Outcome::ok(),
            Err(e) => Outcome::fail(e.to_string()),
        }
    };

    meta.insert("files".into(), file_meta.into());
    if let Some(audit) = cmd.audit.as_ref() {
        if let Some(source) = payload::string(audit, "source") {
            meta.insert("audit_source".into(), source.into());
        }
        if let Some(requested_by) = payload::string(audit, "requested_by") {
            meta.insert("requested_by".into(), requested_by.into());
        }
    }
    meta.insert("install_duration_ms".into(), millis(started.elapsed()).into());

    if outcome.success {
        meta.extend(inventory::report(ctx, &request_id).await);
    }
    tracing::info!(
        request_id = request_id.as_str(),
        package = package.as_str(),
        success = outcome.success,
        "install done"
    );
    Ok(outcome.with_meta(meta))
}
