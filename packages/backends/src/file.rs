//! Delimiter-separated text file pipe.
//!
//! First line holds the field names; every later line is one record. A
//! configurable sentinel token round-trips [`Value::Null`] through the text
//! format. Writing is append-only and atomic: the whole new content is
//! staged to a temp file beside the original and persisted over it, so a
//! mid-stream failure leaves the original untouched. `delete` is
//! structurally unsupported — the format has no row identity.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use datapipe_core::pipe::stream_filtered;
use datapipe_core::{
    AddPipe, Expr, Pipe, PipeError, QueryPipe, Record, RecordStream, Value, ValueKind,
};
use tempfile::NamedTempFile;

/// Pipe over one delimiter-separated file.
pub struct FilePipe {
    path: PathBuf,
    separator: u8,
    null_token: String,
    /// Per-column kinds for parsing; a missing entry defaults to text.
    kinds: Vec<ValueKind>,
}

impl FilePipe {
    /// A comma-separated pipe with the `NULL` sentinel and all-text columns.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            separator: b',',
            null_token: "NULL".to_string(),
            kinds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    #[must_use]
    pub fn with_null_token(mut self, token: impl Into<String>) -> Self {
        self.null_token = token.into();
        self
    }

    /// Column kinds, positional against the header line.
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<ValueKind>) -> Self {
        self.kinds = kinds;
        self
    }

    fn parse_value(&self, text: &str, kind: ValueKind) -> Result<Value, PipeError> {
        if text == self.null_token {
            return Ok(Value::Null);
        }
        let value = match kind {
            ValueKind::Null => Value::Null,
            ValueKind::Text => Value::Text(text.to_string()),
            ValueKind::Int => Value::Int(
                text.parse()
                    .map_err(|_| anyhow!("not an int: {text:?}"))?,
            ),
            ValueKind::Float => Value::Float(
                text.parse()
                    .map_err(|_| anyhow!("not a float: {text:?}"))?,
            ),
            ValueKind::Bool => Value::Bool(
                text.parse()
                    .map_err(|_| anyhow!("not a bool: {text:?}"))?,
            ),
        };
        Ok(value)
    }

    fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Null => self.null_token.clone(),
            other => other.to_string(),
        }
    }

    fn parse_content(&self, content: &str) -> Result<Vec<Record>, PipeError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.separator)
            .quoting(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let names: Vec<String> = reader
            .headers()
            .map_err(|e| PipeError::Internal(e.into()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| PipeError::Internal(e.into()))?;
            let record = Record::new();
            for (ordinal, name) in names.iter().enumerate() {
                let text = row.get(ordinal).unwrap_or(self.null_token.as_str());
                let kind = self.kinds.get(ordinal).copied().unwrap_or(ValueKind::Text);
                record.insert(name.clone(), self.parse_value(text, kind)?)?;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// The file's header names, or `None` when the file does not exist yet.
    async fn read_existing(&self) -> Result<Option<String>, PipeError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipeError::Internal(
                anyhow::Error::new(e).context("reading delimited file"),
            )),
        }
    }

    fn render_rows(&self, names: &[String], records: &[Record]) -> Result<String, PipeError> {
        let mut writer = WriterBuilder::new()
            .delimiter(self.separator)
            .quote_style(QuoteStyle::Never)
            .from_writer(Vec::new());
        for record in records {
            let mut row = Vec::with_capacity(names.len());
            for name in names {
                row.push(self.render_value(&record.get(name)?));
            }
            writer
                .write_record(&row)
                .map_err(|e| PipeError::Internal(e.into()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| PipeError::Internal(anyhow!("{e}")))?;
        String::from_utf8(bytes).map_err(|e| PipeError::Internal(e.into()))
    }
}

#[async_trait]
impl QueryPipe for FilePipe {
    async fn query(
        &self,
        predicate: Option<&Expr>,
        want_binding: bool,
    ) -> Result<RecordStream, PipeError> {
        if want_binding {
            return Err(PipeError::unsupported("file pipe does not support binding"));
        }
        let records = match self.read_existing().await? {
            None => Vec::new(),
            Some(content) => self.parse_content(&content)?,
        };
        Ok(stream_filtered(records, predicate.cloned()))
    }
}

#[async_trait]
impl AddPipe for FilePipe {
    async fn add(&self, records: Vec<Record>, want_binding: bool) -> Result<(), PipeError> {
        if want_binding {
            return Err(PipeError::unsupported("file pipe does not support binding"));
        }
        if records.is_empty() {
            return Ok(());
        }

        let existing = self.read_existing().await?;
        let (mut content, names) = match existing {
            Some(content) => {
                let header = content
                    .lines()
                    .next()
                    .ok_or_else(|| PipeError::unsupported("delimited file has no header line"))?;
                let names: Vec<String> = header
                    .split(self.separator as char)
                    .map(str::to_string)
                    .collect();
                (content, names)
            }
            None => {
                let names = records[0].names();
                let sep = (self.separator as char).to_string();
                (format!("{}\n", names.join(&sep)), names)
            }
        };
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&self.render_rows(&names, &records)?);

        // Stage beside the original so the rename cannot cross filesystems;
        // a failure before persist leaves the original untouched.
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let dir = path.parent().context("file path has no parent directory")?;
            let mut staged = NamedTempFile::new_in(dir)?;
            staged.write_all(content.as_bytes())?;
            staged.persist(&path).context("persisting delimited file")?;
            Ok(())
        })
        .await
        .map_err(|e| PipeError::Internal(e.into()))??;
        Ok(())
    }
}

#[async_trait]
impl Pipe for FilePipe {
    // Row identity is undefined for this format.
    async fn delete(&self, _predicate: Option<&Expr>) -> Result<(), PipeError> {
        Err(PipeError::unsupported("delete on a delimited file"))
    }
}

#[cfg(test)]
mod tests {
    use datapipe_core::expr::{field, lit};
    use futures_util::TryStreamExt;

    use super::*;

    fn person(name: &str, age: Value) -> Record {
        Record::from_fields([("name", Value::Text(name.into())), ("age", age)])
    }

    fn pipe_in(dir: &tempfile::TempDir) -> FilePipe {
        FilePipe::new(dir.path().join("people.csv"))
            .with_kinds(vec![ValueKind::Text, ValueKind::Int])
    }

    #[tokio::test]
    async fn add_then_query_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipe_in(&dir);

        pipe.add(vec![person("A", Value::Int(1)), person("B", Value::Int(2))], false)
            .await
            .unwrap();

        let out: Vec<Record> = pipe
            .query(Some(&field("name").eq(lit("B"))), false)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("age").unwrap(), Value::Int(2));
    }

    #[tokio::test]
    async fn header_is_written_once_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipe_in(&dir);

        pipe.add(vec![person("A", Value::Int(1))], false).await.unwrap();
        pipe.add(vec![person("B", Value::Int(2))], false).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("people.csv")).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec![
            "name,age",
            "A,1",
            "B,2",
        ]);
    }

    #[tokio::test]
    async fn null_sentinel_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipe_in(&dir).with_null_token("<none>");

        pipe.add(vec![person("A", Value::Null)], false).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("people.csv")).unwrap();
        assert!(content.contains("A,<none>"));

        let out: Vec<Record> = pipe.query(None, false).await.unwrap().try_collect().await.unwrap();
        assert_eq!(out[0].get("age").unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn query_of_a_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out: Vec<Record> = pipe_in(&dir)
            .query(None, false)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn delete_and_binding_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipe_in(&dir);

        assert!(matches!(
            pipe.delete(None).await,
            Err(PipeError::Unsupported { .. })
        ));
        assert!(matches!(
            pipe.query(None, true).await.err(),
            Some(PipeError::Unsupported { .. })
        ));
        assert!(!QueryPipe::can_binding(&pipe));
    }

    #[tokio::test]
    async fn add_of_a_record_missing_a_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipe_in(&dir);
        pipe.add(vec![person("A", Value::Int(1))], false).await.unwrap();

        let partial = Record::from_fields([("name", Value::Text("B".into()))]);
        let err = pipe.add(vec![partial], false).await.unwrap_err();
        assert!(matches!(err, PipeError::KeyNotFound { name } if name == "age"));
    }

    #[tokio::test]
    async fn custom_separator_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipe_in(&dir).with_separator(b';');

        pipe.add(vec![person("A", Value::Int(1))], false).await.unwrap();
        let content = std::fs::read_to_string(dir.path().join("people.csv")).unwrap();
        assert!(content.starts_with("name;age"));
    }
}
