//! Preflight checks. Nothing here mutates the ledger or pins content.

use super::context::WorkflowContext;
use super::template::Template;
use crate::checkpoint::DataTable;
use crate::models::{GiftdropError, InstanceMetadataConfig, Result, WorkflowConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How many missing files are listed in the error message.
const MISSING_FILES_SHOWN: usize = 5;

/// Compiled instance-metadata templates.
#[derive(Debug, Clone)]
pub struct InstanceTemplates {
    pub name: Template,
    pub description: Option<Template>,
    pub image: Template,
    pub video: Option<Template>,
}

impl InstanceTemplates {
    /// Parse every template and check its columns against `header`.
    pub fn compile(config: &InstanceMetadataConfig, header: &[String]) -> Result<Self> {
        let templates = Self {
            name: Template::parse(&config.name),
            description: config.description.as_deref().map(Template::parse),
            image: Template::parse(&config.file_name_template),
            video: config.video_file_name_template.as_deref().map(Template::parse),
        };

        let all = [
            Some(&templates.name),
            templates.description.as_ref(),
            Some(&templates.image),
            templates.video.as_ref(),
        ];
        for template in all.into_iter().flatten() {
            template.check_columns(header)?;
        }
        Ok(templates)
    }

    /// Image path for `row`.
    pub fn image_path(&self, folder: &Path, table: &DataTable, row: usize) -> PathBuf {
        folder.join(self.image.render(row, &table.row_fields(row)))
    }

    /// Video path for `row`, when a video template is configured.
    pub fn video_path(&self, folder: &Path, table: &DataTable, row: usize) -> Option<PathBuf> {
        self.video
            .as_ref()
            .map(|t| folder.join(t.render(row, &table.row_fields(row))))
    }
}

/// Run every preflight check.
pub async fn preflight(config: &WorkflowConfig, ctx: &WorkflowContext) -> Result<()> {
    check_initial_fund(config, ctx).await?;
    check_class_media(config)?;
    check_instance_media(config, &ctx.table)?;
    info!(records = ctx.table.record_count(), "Preflight checks passed");
    Ok(())
}

/// The configured fund must cover the ledger's minimum deposit.
pub async fn check_initial_fund(config: &WorkflowConfig, ctx: &WorkflowContext) -> Result<()> {
    let Some(fund) = config.initial_fund_units()? else {
        return Ok(());
    };

    let minimum = ctx.ledger.minimum_deposit().await?;
    debug!(fund, minimum, "Checking initial fund");
    if fund < minimum {
        return Err(GiftdropError::Validation(format!(
            "initial fund of {fund} base units is below the minimum deposit of {minimum}"
        )));
    }
    Ok(())
}

/// Class image and video, when configured, must exist.
pub fn check_class_media(config: &WorkflowConfig) -> Result<()> {
    let Some(metadata) = &config.class.metadata else {
        return Ok(());
    };
    for path in [&metadata.image_file, &metadata.video_file].into_iter().flatten() {
        if !path.is_file() {
            return Err(GiftdropError::Validation(format!(
                "class media file {} does not exist",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Every image (and video) resolved for the record range must exist.
pub fn check_instance_media(config: &WorkflowConfig, table: &DataTable) -> Result<()> {
    let Some(metadata) = &config.instance.metadata else {
        return Ok(());
    };
    let templates = InstanceTemplates::compile(metadata, table.header())?;

    let mut missing = Vec::new();
    for row in table.record_range() {
        let image = templates.image_path(&metadata.image_folder, table, row);
        if !image.is_file() {
            missing.push(image);
        }
        if let Some(video) = templates.video_path(&metadata.image_folder, table, row) {
            if !video.is_file() {
                missing.push(video);
            }
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    let shown: Vec<String> = missing
        .iter()
        .take(MISSING_FILES_SHOWN)
        .map(|p| p.display().to_string())
        .collect();
    let more = missing.len().saturating_sub(MISSING_FILES_SHOWN);
    let suffix = if more > 0 {
        format!(" and {more} more")
    } else {
        String::new()
    };
    Err(GiftdropError::Validation(format!(
        "{} media files are missing: {}{suffix}",
        missing.len(),
        shown.join(", ")
    )))
}
