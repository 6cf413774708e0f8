pub mod audit;
pub mod features;
pub mod normalize;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::document::{self, WriteOutcome};
use crate::error::{ConvertError, TileError};
use crate::settings::Settings;
use crate::source;
use crate::tiles::{self, CommandExecutor, CommandOutput};
use audit::AuditReport;
use features::FeatureCollection;
use validate::ValidationSummary;

/// Settings plus the process runner used for the tile step.
#[derive(Clone)]
pub struct PipelineContext {
    pub settings: Settings,
    pub executor: Arc<dyn CommandExecutor>,
}

/// Result of load → normalize → validate → build.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub summary: ValidationSummary,
    pub collection: FeatureCollection,
}

#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub summary: ValidationSummary,
    pub written: WriteOutcome,
    pub audit: AuditReport,
    /// The collection as re-read from disk.
    pub collection: FeatureCollection,
}

impl PipelineContext {
    pub fn new(settings: Settings, executor: Arc<dyn CommandExecutor>) -> Self {
        PipelineContext { settings, executor }
    }

    /// Validation summary over the source table; nothing is written.
    pub fn summarize(&self) -> Result<ValidationSummary, ConvertError> {
        Ok(self.prepare()?.summary)
    }

    pub fn prepare(&self) -> Result<Prepared, ConvertError> {
        let rules = &self.settings.rules;
        let raw = source::load_records(&self.settings.input)?;
        let normalized = normalize::normalize_all(raw, rules);
        let validated = validate::partition(normalized, rules);
        let collection = features::build_collection(validated.accepted);
        info!(features = collection.len(), "built feature collection");
        Ok(Prepared {
            summary: validated.summary,
            collection,
        })
    }

    /// Prepare, write the document, then audit what actually landed on disk.
    pub fn convert(&self) -> Result<ConvertReport, ConvertError> {
        let prepared = self.prepare()?;
        let written = document::write_collection(&self.settings.output, &prepared.collection)?;
        let collection = document::read_collection(&written.path)?;
        let audit = self.audit_collection(&collection);
        Ok(ConvertReport {
            summary: prepared.summary,
            written,
            audit,
            collection,
        })
    }

    pub fn audit_document(&self, path: &Path) -> Result<AuditReport, ConvertError> {
        let collection = document::read_collection(path)?;
        Ok(self.audit_collection(&collection))
    }

    pub fn audit_collection(&self, collection: &FeatureCollection) -> AuditReport {
        let report = audit::audit(collection, &self.settings.rules, &self.settings.audit.scope);
        audit::log_report(&report);
        report
    }

    pub async fn generate_tiles(&self, input: &Path) -> Result<CommandOutput, TileError> {
        tiles::generate_tiles(self.executor.as_ref(), &self.settings.tiling, input).await
    }
}
