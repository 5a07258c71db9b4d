use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use metrics::{counter, histogram};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::api::CaptureError;
use crate::playlist::{self, Segment};

/// A segment as written into an export directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedSegment {
    /// Path inside the export directory, with `/` separators.
    pub relative_path: String,
    pub duration: f64,
    pub start: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportManifest {
    pub directory: PathBuf,
    pub manifest_path: PathBuf,
    pub segments: Vec<ExportedSegment>,
    /// Server-relative URL of the manifest, under `/exports`.
    pub url: String,
}

/// Cuts a time window out of a channel's live HLS recording.
///
/// Channels live under `<data_root>/hls/<channel>`, exports are written to
/// `<data_root>/exports/<channel>/export_<from>_<to>_<suffix>`.
#[derive(Clone)]
pub struct TimeWindowExporter {
    hls_root: PathBuf,
    exports_root: PathBuf,
}

impl TimeWindowExporter {
    pub fn new(data_root: &Path) -> Self {
        Self {
            hls_root: data_root.join("hls"),
            exports_root: data_root.join("exports"),
        }
    }

    /// The manifest to export from: `<channel>_profile.m3u8` when present,
    /// otherwise `<channel>.m3u8`.
    pub async fn select_playlist(&self, channel: &str) -> Result<PathBuf, CaptureError> {
        let channel_dir = self.hls_root.join(checked_channel(channel)?);

        for name in [format!("{channel}_profile.m3u8"), format!("{channel}.m3u8")] {
            let candidate = channel_dir.join(name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
        }

        Err(CaptureError::NotFound(format!("playlist for channel {channel}")))
    }

    /// Copies every segment overlapping `[from, to)` into a new export
    /// directory and writes a VOD manifest over them. Nothing is created when
    /// the channel has no manifest; a partially written export is removed.
    #[instrument(skip(self))]
    pub async fn export_window(
        &self,
        channel: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<ExportManifest, CaptureError> {
        let playlist_path = self.select_playlist(channel).await?;
        let channel_dir = self.hls_root.join(channel);

        let document = tokio::fs::read_to_string(&playlist_path)
            .await
            .map_err(|e| CaptureError::storage("failed to read playlist", e))?;
        let selected: Vec<Segment> = playlist::parse(&document, &channel_dir)
            .into_iter()
            .filter(|segment| segment.overlaps(from, to))
            .collect();

        let dir_name = format!(
            "export_{}_{}_{}",
            compact_timestamp(from),
            compact_timestamp(to),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let directory = self.exports_root.join(channel).join(&dir_name);
        let manifest_name = playlist_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("playlist.m3u8")
            .to_string();
        let manifest_path = directory.join(&manifest_name);

        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| CaptureError::storage("failed to create export directory", e))?;

        let segments = match write_export(&channel_dir, &directory, &manifest_path, &selected).await
        {
            Ok(segments) => segments,
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&directory).await {
                    warn!("failed to remove partial export {}: {}", directory.display(), cleanup);
                }
                return Err(err);
            }
        };

        counter!("capture_exports_total").increment(1);
        histogram!("capture_export_segments").record(segments.len() as f64);
        info!(
            segments = segments.len(),
            "exported window to {}",
            directory.display()
        );

        Ok(ExportManifest {
            url: export_url(channel, &dir_name, &manifest_name)?,
            directory,
            manifest_path,
            segments,
        })
    }
}

async fn write_export(
    channel_dir: &Path,
    directory: &Path,
    manifest_path: &Path,
    selected: &[Segment],
) -> Result<Vec<ExportedSegment>, CaptureError> {
    let mut exported = Vec::with_capacity(selected.len());
    let mut taken = HashSet::with_capacity(selected.len());

    for (position, segment) in selected.iter().enumerate() {
        let Some(relative) = export_relative_path(channel_dir, &segment.path) else {
            warn!("skipping segment without a file name: {}", segment.path.display());
            continue;
        };
        let relative = unclaimed_path(relative, position, &taken);
        taken.insert(relative.clone());

        let target = directory.join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CaptureError::storage("failed to create export directory", e))?;
        }
        tokio::fs::copy(&segment.path, &target).await.map_err(|e| {
            CaptureError::storage(&format!("failed to copy {}", segment.path.display()), e)
        })?;

        exported.push(ExportedSegment {
            relative_path: to_slash_path(&relative),
            duration: segment.duration,
            start: segment.start,
        });
    }

    tokio::fs::write(manifest_path, render_manifest(&exported))
        .await
        .map_err(|e| CaptureError::storage("failed to write export manifest", e))?;

    Ok(exported)
}

/// Renders a finished (VOD) HLS playlist over the exported segments.
pub fn render_manifest(segments: &[ExportedSegment]) -> String {
    let target_duration = segments
        .iter()
        .map(|segment| segment.duration)
        .fold(0.0_f64, f64::max)
        .ceil() as u64;

    let mut manifest = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{target_duration}\n#EXT-X-MEDIA-SEQUENCE:0\n"
    );
    for segment in segments {
        manifest.push_str(&format!(
            "#EXTINF:{:.3},\n{}\n",
            segment.duration, segment.relative_path
        ));
    }
    manifest.push_str("#EXT-X-ENDLIST\n");
    manifest
}

/// `20250906T120000Z` style rendering of an instant, in UTC.
pub fn compact_timestamp(at: OffsetDateTime) -> String {
    at.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year][month][day]T[hour][minute][second]Z"
        ))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn checked_channel(channel: &str) -> Result<&str, CaptureError> {
    let mut components = Path::new(channel).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !channel.contains(['/', '\\']) => Ok(channel),
        _ => Err(CaptureError::MalformedRequest(format!(
            "invalid channel label {channel:?}"
        ))),
    }
}

/// Where a segment goes inside the export: its path relative to the channel
/// directory, or just its file name when it lives elsewhere.
fn export_relative_path(channel_dir: &Path, segment: &Path) -> Option<PathBuf> {
    if let Ok(relative) = segment.strip_prefix(channel_dir) {
        if relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
            && relative.file_name().is_some()
        {
            return Some(relative.to_path_buf());
        }
    }
    segment.file_name().map(PathBuf::from)
}

/// `relative`, or when another segment already claimed it, the same file name
/// prefixed with the segment's position in the export.
fn unclaimed_path(relative: PathBuf, position: usize, taken: &HashSet<PathBuf>) -> PathBuf {
    if !taken.contains(&relative) {
        return relative;
    }

    let name = relative
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut prefix = position;
    loop {
        let candidate = relative.with_file_name(format!("{prefix:04}_{name}"));
        if !taken.contains(&candidate) {
            return candidate;
        }
        prefix += 1;
    }
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn export_url(channel: &str, dir_name: &str, manifest_name: &str) -> Result<String, CaptureError> {
    let mut url = Url::parse("http://localhost/")
        .map_err(|e| CaptureError::storage("failed to build export url", e))?;
    url.path_segments_mut()
        .map_err(|_| CaptureError::StorageError("failed to build export url".to_string()))?
        .clear()
        .extend(["exports", channel, dir_name, manifest_name]);
    Ok(url.path().to_string())
}
