//! Stage hand-off artifacts
//!
//! Stage 1 writes `staging/news_<date>.jsonl`, one raw article per line.
//! Stage 2 writes `transformed/news_<date>.parquet` with canonical timestamps.
//! Both are written to a temporary sibling and renamed into place, so a
//! reader never sees a half-written file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{IngestionError, Result};
use crate::schemas::{canonical, NormalizedArticle, RawArticle};

/// `scraped_at` as written by older stage 1 runs, wall time at the capture offset
const LEGACY_SCRAPED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const COLUMNS: [&str; 5] = ["source", "title", "url", "published_at", "scraped_at"];

/// Artifact locations for a data directory
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    staging_dir: PathBuf,
    transformed_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            staging_dir: data_dir.join("staging"),
            transformed_dir: data_dir.join("transformed"),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            staging_dir: config.staging_dir(),
            transformed_dir: config.transformed_dir(),
        }
    }

    pub fn staging(&self, run_date: NaiveDate) -> PathBuf {
        self.staging_dir
            .join(format!("news_{}.jsonl", run_date.format("%Y-%m-%d")))
    }

    pub fn transformed(&self, run_date: NaiveDate) -> PathBuf {
        self.transformed_dir
            .join(format!("news_{}.parquet", run_date.format("%Y-%m-%d")))
    }
}

/// Staging row as found on disk; `scraped_at` may be in the legacy form
#[derive(Debug, Deserialize)]
struct StagingRow {
    source: String,
    title: String,
    url: String,
    published_at: String,
    scraped_at: String,
}

/// Writes the stage 1 artifact, replacing any previous one for the run date
pub async fn write_staging(path: &Path, articles: &[RawArticle]) -> Result<usize> {
    let mut buffer = Vec::with_capacity(articles.len() * 256);
    for article in articles {
        serde_json::to_writer(&mut buffer, article)?;
        buffer.push(b'\n');
    }

    let tmp = temp_path(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&buffer).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;

    info!(path = %path.display(), rows = articles.len(), "Wrote staging artifact");
    Ok(articles.len())
}

/// Reads the stage 1 artifact
pub async fn read_staging(path: &Path, capture_offset: FixedOffset) -> Result<Vec<RawArticle>> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IngestionError::ArtifactMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut articles = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let row: StagingRow = serde_json::from_str(line).map_err(|e| {
            IngestionError::InvalidInput(format!("{}:{}: {e}", path.display(), index + 1))
        })?;
        let scraped_at = parse_scraped_at(&row.scraped_at, capture_offset).ok_or_else(|| {
            IngestionError::InvalidInput(format!(
                "{}:{}: unreadable scraped_at {:?}",
                path.display(),
                index + 1,
                row.scraped_at
            ))
        })?;

        articles.push(RawArticle {
            source: row.source,
            title: row.title,
            url: row.url,
            published_raw: row.published_at,
            scraped_at,
        });
    }

    debug!(path = %path.display(), rows = articles.len(), "Read staging artifact");
    Ok(articles)
}

fn parse_scraped_at(value: &str, capture_offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok().or_else(|| {
        NaiveDateTime::parse_from_str(value, LEGACY_SCRAPED_FORMAT)
            .ok()
            .and_then(|naive| capture_offset.from_local_datetime(&naive).single())
    })
}

fn transformed_schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ))
}

/// Writes the stage 2 artifact. Parquet encoding and file I/O run on the
/// blocking pool.
pub async fn write_transformed(path: &Path, articles: Vec<NormalizedArticle>) -> Result<usize> {
    let path = path.to_path_buf();
    blocking(move || write_parquet(&path, &articles)).await
}

/// Reads the stage 2 artifact on the blocking pool
pub async fn read_transformed(path: &Path) -> Result<Vec<NormalizedArticle>> {
    let path = path.to_path_buf();
    blocking(move || read_parquet(&path)).await
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| IngestionError::Pipeline(format!("artifact task failed: {e}")))?
}

fn write_parquet(path: &Path, articles: &[NormalizedArticle]) -> Result<usize> {
    let column = |f: fn(&NormalizedArticle) -> String| -> Arc<dyn Array> {
        Arc::new(StringArray::from(articles.iter().map(f).collect::<Vec<_>>()))
    };

    let schema = transformed_schema();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            column(|a| a.source.clone()),
            column(|a| a.title.clone()),
            column(|a| a.url.clone()),
            column(|a| canonical(&a.published_at)),
            column(|a| canonical(&a.scraped_at)),
        ],
    )?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    std::fs::rename(&tmp, path)?;

    info!(path = %path.display(), rows = articles.len(), "Wrote transformed artifact");
    Ok(articles.len())
}

fn read_parquet(path: &Path) -> Result<Vec<NormalizedArticle>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IngestionError::ArtifactMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut articles = Vec::new();
    for batch in reader {
        let batch = batch?;
        let [source, title, url, published_at, scraped_at] =
            COLUMNS.map(|name| string_column(&batch, name, path));
        let (source, title, url, published_at, scraped_at) =
            (source?, title?, url?, published_at?, scraped_at?);

        for row in 0..batch.num_rows() {
            let url = url.value(row).to_string();
            let instant = |column: &StringArray, name: &str| {
                DateTime::parse_from_rfc3339(column.value(row)).map_err(|e| {
                    IngestionError::InvalidInput(format!(
                        "{}: {name} for {url}: {e}",
                        path.display()
                    ))
                })
            };

            articles.push(NormalizedArticle {
                source: source.value(row).to_string(),
                title: title.value(row).to_string(),
                published_at: instant(published_at, "published_at")?,
                scraped_at: instant(scraped_at, "scraped_at")?,
                url,
            });
        }
    }

    debug!(path = %path.display(), rows = articles.len(), "Read transformed artifact");
    Ok(articles)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str, path: &Path) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| {
            IngestionError::InvalidInput(format!(
                "{}: missing or non-text column {name}",
                path.display()
            ))
        })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn raw(url: &str, published: &str) -> RawArticle {
        RawArticle {
            source: "kompas".into(),
            title: "Judul, dengan \"kutip\"".into(),
            url: url.into(),
            published_raw: published.into(),
            scraped_at: DateTime::parse_from_rfc3339("2025-10-17T10:00:00+07:00").unwrap(),
        }
    }

    #[test]
    fn test_paths_are_keyed_by_run_date() {
        let paths = ArtifactPaths::new("/srv/news");
        let date = NaiveDate::from_ymd_opt(2025, 10, 17).unwrap();

        assert_eq!(
            paths.staging(date),
            PathBuf::from("/srv/news/staging/news_2025-10-17.jsonl")
        );
        assert_eq!(
            paths.transformed(date),
            PathBuf::from("/srv/news/transformed/news_2025-10-17.parquet")
        );
    }

    #[tokio::test]
    async fn test_staging_keeps_raw_published_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging").join("news_2025-10-17.jsonl");
        let articles = vec![
            raw("https://nasional.kompas.com/read/1", "2 jam"),
            raw("https://nasional.kompas.com/read/2", "Kompas.com - 17/10/2025, 09:00 WIB"),
        ];

        assert_eq!(write_staging(&path, &articles).await.unwrap(), 2);
        let read = read_staging(&path, wib()).await.unwrap();
        assert_eq!(read, articles);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_staging_accepts_legacy_scraped_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_2025-10-17.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"source":"kompas","title":"A","url":"https://a.kompas.com/1","published_at":"2 jam","scraped_at":"2025-10-17 10:00:00"}"#,
                "\n\n"
            ),
        )
        .unwrap();

        let read = read_staging(&path, wib()).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(canonical(&read[0].scraped_at), "2025-10-17T10:00:00+07:00");
    }

    #[tokio::test]
    async fn test_missing_staging_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_2025-10-17.jsonl");

        let err = read_staging(&path, wib()).await.unwrap_err();
        assert!(matches!(err, IngestionError::ArtifactMissing(p) if p == path));
    }

    #[tokio::test]
    async fn test_transformed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transformed").join("news_2025-10-17.parquet");
        let published = DateTime::parse_from_rfc3339("2025-10-17T09:00:00+07:00").unwrap();
        let articles: Vec<NormalizedArticle> = (1..=3)
            .map(|i| NormalizedArticle::from_raw(raw(&format!("https://a.kompas.com/{i}"), "x"), published))
            .collect();

        assert_eq!(write_transformed(&path, articles.clone()).await.unwrap(), 3);
        assert_eq!(read_transformed(&path).await.unwrap(), articles);
    }

    #[tokio::test]
    async fn test_empty_transformed_artifact_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_2025-10-17.parquet");

        write_transformed(&path, Vec::new()).await.unwrap();
        assert!(path.exists());
        assert!(read_transformed(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_transformed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_2025-10-17.parquet");

        assert!(matches!(
            read_transformed(&path).await,
            Err(IngestionError::ArtifactMissing(_))
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_parquet_io_leaves_the_runtime_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_2025-10-17.parquet");
        let published = DateTime::parse_from_rfc3339("2025-10-17T09:00:00+07:00").unwrap();
        let articles: Vec<NormalizedArticle> = (0..2_000)
            .map(|i| NormalizedArticle::from_raw(raw(&format!("https://a.kompas.com/{i}"), "x"), published))
            .collect();

        // A ticker on the single runtime thread keeps running while the write is in progress
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        assert_eq!(write_transformed(&path, articles).await.unwrap(), 2_000);
        ticker.abort();
        assert!(ticks.load(std::sync::atomic::Ordering::SeqCst) > 0);
        assert_eq!(read_transformed(&path).await.unwrap().len(), 2_000);
    }
}
