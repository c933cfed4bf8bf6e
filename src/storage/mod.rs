// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::extractors::convert::NormalizedTable;
use crate::periods::PeriodToken;
use crate::pipeline::RunSummary;
use crate::spensiones::models::DatasetDescriptor;
use crate::utils::error::StorageError;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<base>/<dataset>/<kind>/<period>/`, created on demand.
    fn period_dir(
        &self,
        dataset: &DatasetDescriptor,
        kind: &str,
        period: &PeriodToken,
    ) -> Result<PathBuf, StorageError> {
        let dir = self
            .base_dir
            .join(dataset.output_subdir)
            .join(kind)
            .join(period.as_str());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Saves the document exactly as received.
    pub fn write_raw(
        &self,
        dataset: &DatasetDescriptor,
        period: &PeriodToken,
        name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let file_path = self
            .period_dir(dataset, "html", period)?
            .join(format!("{name}.html"));
        fs::write(&file_path, bytes)?;

        tracing::debug!("Saved raw document to {}", file_path.display());
        Ok(file_path)
    }

    /// Saves a converted table as CSV: one header row, then the data rows as found.
    pub fn write_table(
        &self,
        dataset: &DatasetDescriptor,
        period: &PeriodToken,
        name: &str,
        table: &NormalizedTable,
    ) -> Result<PathBuf, StorageError> {
        let file_path = self
            .period_dir(dataset, "csv", period)?
            .join(format!("{name}.csv"));

        // Rows keep their source width, which may differ from the header's.
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&file_path)?;
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|c| c.as_str()))?;
        }
        writer.flush()?;

        tracing::debug!(
            "Saved table ({} rows) to {}",
            table.rows.len(),
            file_path.display()
        );
        Ok(file_path)
    }

    /// Where the annotated copy of a document goes in debug mode.
    pub fn debug_path(
        &self,
        dataset: &DatasetDescriptor,
        period: &PeriodToken,
        name: &str,
    ) -> Result<PathBuf, StorageError> {
        Ok(self
            .period_dir(dataset, "debug", period)?
            .join(format!("{name}_annotated.html")))
    }

    /// Saves the per-period outcome of a run in JSON format
    pub fn write_run_summary(
        &self,
        dataset: &DatasetDescriptor,
        summary: &RunSummary,
    ) -> Result<PathBuf, StorageError> {
        let target_dir = self.base_dir.join(dataset.output_subdir);
        fs::create_dir_all(&target_dir)?;
        let file_path = target_dir.join("run_summary.json");

        let metadata = serde_json::json!({
            "dataset": dataset.name,
            "frequency": dataset.frequency,
            "succeeded": summary.succeeded,
            "empty": summary.empty,
            "not_found": summary.not_found,
            "failed": summary.failed,
            "finished_at": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, metadata_str)?;

        tracing::info!("Saved run summary to {}", file_path.display());
        Ok(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::convert::Cell;
    use crate::periods::{resolve, PeriodRequest};
    use crate::spensiones::models::{ESTADOS_FINANCIEROS, VALORES_CUOTA};

    fn token(text: &str, dataset: &DatasetDescriptor) -> PeriodToken {
        resolve(&PeriodRequest::Single(text.to_string()), dataset.frequency)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn raw_and_csv_land_in_period_keyed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("data")).unwrap();
        let period = token("202403", &ESTADOS_FINANCIEROS);

        let raw = storage
            .write_raw(&ESTADOS_FINANCIEROS, &period, "balance", b"<table>\xF1</table>")
            .unwrap();
        assert_eq!(
            raw,
            dir.path().join("data/Estados_Financieros/html/202403/balance.html")
        );
        assert_eq!(fs::read(&raw).unwrap(), b"<table>\xF1</table>");

        let table = NormalizedTable {
            headers: vec!["Cuenta".into(), "Fondo A, B".into()],
            rows: vec![
                vec![Cell::Text("Activo".into()), Cell::Number("1234.56".into())],
                vec![Cell::Text("Pasivo".into())],
            ],
        };
        let csv_path = storage
            .write_table(&ESTADOS_FINANCIEROS, &period, "balance", &table)
            .unwrap();
        assert_eq!(
            csv_path,
            dir.path().join("data/Estados_Financieros/csv/202403/balance.csv")
        );
        assert_eq!(
            fs::read_to_string(&csv_path).unwrap(),
            "Cuenta,\"Fondo A, B\"\nActivo,1234.56\nPasivo\n"
        );
    }

    #[test]
    fn summary_lists_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let summary = RunSummary {
            succeeded: vec![token("2023", &VALORES_CUOTA)],
            failed: vec![token("2024", &VALORES_CUOTA)],
            ..RunSummary::default()
        };
        let path = storage.write_run_summary(&VALORES_CUOTA, &summary).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["dataset"], "valores_cuota");
        assert_eq!(json["frequency"], "annual");
        assert_eq!(json["succeeded"], serde_json::json!(["2023"]));
        assert_eq!(json["failed"], serde_json::json!(["2024"]));
        assert_eq!(json["empty"], serde_json::json!([]));
    }
}
