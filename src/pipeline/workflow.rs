//! The gift-drop pipeline.
//!
//! Stages, in order:
//! Validate → ClassEnsured → ClassMetadataSet → SecretsGenerated →
//! InstancesMinted → ImagesPinned → InstanceMetadataSet → FundsSent → Finalized
//!
//! Every step first looks at checkpointed state and returns without an
//! external call when its goal is already met, so re-running after a failure
//! only repeats unfinished work.

use super::batch::BatchRunner;
use super::context::WorkflowContext;
use super::validate::{preflight, InstanceTemplates};
use crate::checkpoint::{columns, BatchKind, Column, DataTable};
use crate::client::{DecisionProvider, KeyGenerator, LedgerCall};
use crate::models::{
    ConfigError, GiftdropError, InstanceMetadataConfig, MetadataDocument, Result, RunStats,
    WorkflowConfig, WorkflowStage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs the workflow steps against a `WorkflowContext`.
pub struct WorkflowPipeline<'a> {
    config: &'a WorkflowConfig,
    decisions: &'a dyn DecisionProvider,
    keys: &'a dyn KeyGenerator,
}

impl<'a> WorkflowPipeline<'a> {
    pub fn new(
        config: &'a WorkflowConfig,
        decisions: &'a dyn DecisionProvider,
        keys: &'a dyn KeyGenerator,
    ) -> Self {
        Self {
            config,
            decisions,
            keys,
        }
    }

    /// Full run: every step, then write the output and drop the checkpoints.
    /// A dry run stops after validation.
    pub async fn run(&self, ctx: &mut WorkflowContext) -> Result<RunStats> {
        let start = Instant::now();
        let mut stats = self.execute(ctx).await?;

        if !ctx.dry_run {
            self.finalize(ctx)?;
            stats.stage = WorkflowStage::Finalized;
        }

        stats.runtime_secs = start.elapsed().as_secs_f64();
        info!(stage = %stats.stage, "Workflow finished");
        Ok(stats)
    }

    /// Every step up to and including `FundsSent`; checkpoints are kept.
    pub async fn execute(&self, ctx: &mut WorkflowContext) -> Result<RunStats> {
        let mut stats = RunStats::new(ctx.table.record_count(), ctx.dry_run);

        info!(
            class_id = %self.config.class.id,
            records = stats.records,
            start = ctx.table.start(),
            end = ctx.table.end(),
            "Starting workflow"
        );

        preflight(self.config, ctx).await?;
        stats.stage = WorkflowStage::Validated;
        if ctx.dry_run {
            info!("Dry run: validation passed, no further steps executed");
            return Ok(stats);
        }

        self.ensure_class(ctx).await?;
        stats.stage = WorkflowStage::ClassEnsured;

        self.set_class_metadata(ctx).await?;
        stats.stage = WorkflowStage::ClassMetadataSet;

        stats.secrets_generated = self.generate_secrets(ctx)?;
        stats.stage = WorkflowStage::SecretsGenerated;

        stats.batches_submitted += self.mint_instances(ctx).await?;
        stats.stage = WorkflowStage::InstancesMinted;

        stats.metadata_pinned = self.pin_images(ctx).await?;
        stats.stage = WorkflowStage::ImagesPinned;

        stats.batches_submitted += self.set_instance_metadata(ctx).await?;
        stats.stage = WorkflowStage::InstanceMetadataSet;

        stats.batches_submitted += self.send_funds(ctx).await?;
        stats.stage = WorkflowStage::FundsSent;

        Ok(stats)
    }

    /// Re-publish instance metadata for an already minted drop.
    pub async fn update_metadata(&self, ctx: &mut WorkflowContext) -> Result<RunStats> {
        let start = Instant::now();
        if self.config.instance.metadata.is_none() {
            return Err(ConfigError::Missing("instance.metadata".to_string()).into());
        }

        let mut stats = RunStats::new(ctx.table.record_count(), ctx.dry_run);
        preflight(self.config, ctx).await?;
        stats.stage = WorkflowStage::Validated;
        if ctx.dry_run {
            info!("Dry run: validation passed, no further steps executed");
            return Ok(stats);
        }

        if ctx.resumed() {
            info!("Resuming metadata update from checkpoint");
        } else {
            self.reset_metadata(ctx)?;
        }

        stats.metadata_pinned = self.pin_images(ctx).await?;
        stats.stage = WorkflowStage::ImagesPinned;

        stats.batches_submitted += self.set_instance_metadata(ctx).await?;
        stats.stage = WorkflowStage::InstanceMetadataSet;

        self.finalize(ctx)?;
        stats.stage = WorkflowStage::Finalized;
        stats.runtime_secs = start.elapsed().as_secs_f64();
        Ok(stats)
    }

    /// Make sure the configured class exists and is recorded.
    async fn ensure_class(&self, ctx: &mut WorkflowContext) -> Result<()> {
        let configured = self.config.class.id.as_str();
        if ctx.class.class_id.as_deref() == Some(configured) {
            debug!(class_id = configured, "Class already recorded");
            return Ok(());
        }

        if let Some(previous) = &ctx.class.class_id {
            if has_minting_progress(ctx) {
                return Err(GiftdropError::StateConsistency(format!(
                    "checkpoint records minting progress for class {previous}, \
                     but class {configured} is configured; restore class.id or \
                     clear the checkpoint directory"
                )));
            }
            warn!(
                previous = %previous,
                configured,
                "Configured class differs from the checkpointed one"
            );
        }

        if ctx.ledger.class_exists(configured).await? {
            let question =
                format!("Class {configured} already exists. Append the new instances to it?");
            if !self.decisions.confirm(&question)? {
                return Err(GiftdropError::UserDeclined(format!(
                    "not appending to existing class {configured}"
                )));
            }
            info!(class_id = configured, "Appending to existing class");
        } else {
            ctx.ledger.create_class(configured, ctx.dry_run).await?;
            info!(class_id = configured, "Class created");
        }

        if ctx.class.class_id.is_some() {
            ctx.class.class_metadata = None;
        }
        ctx.class.class_id = Some(configured.to_string());
        ctx.checkpoint_class()
    }

    /// Pin and set the class metadata once.
    async fn set_class_metadata(&self, ctx: &mut WorkflowContext) -> Result<()> {
        if let Some(cid) = &ctx.class.class_metadata {
            debug!(cid = %cid, "Class metadata already set");
            return Ok(());
        }

        let Some(metadata) = &self.config.class.metadata else {
            let question = "No class metadata is configured. Continue without it?";
            if !self.decisions.confirm(question)? {
                return Err(GiftdropError::UserDeclined(
                    "class metadata is required".to_string(),
                ));
            }
            warn!("Continuing without class metadata");
            return Ok(());
        };

        let class_id = required_class_id(ctx)?;
        let image_cid = match &metadata.image_file {
            Some(path) => Some(ctx.pinner.pin_file(path).await?),
            None => None,
        };
        let video_cid = match &metadata.video_file {
            Some(path) => Some(ctx.pinner.pin_file(path).await?),
            None => None,
        };

        let document = MetadataDocument::new(
            metadata.name.clone(),
            metadata.description.clone(),
            image_cid.as_deref(),
            video_cid.as_deref(),
        );
        let cid = ctx
            .pinner
            .pin_json("class-metadata.json", &document.to_json())
            .await?;

        ctx.ledger
            .set_class_metadata(&class_id, &cid, ctx.dry_run)
            .await?;
        info!(class_id = %class_id, cid = %cid, "Class metadata set");

        ctx.class.class_metadata = Some(cid);
        ctx.checkpoint_class()
    }

    /// Give every record in range a secret and address.
    fn generate_secrets(&self, ctx: &mut WorkflowContext) -> Result<usize> {
        let table = &ctx.table;
        let mut secrets = column_values(table, columns::SECRET);
        let mut addresses = column_values(table, columns::ADDRESS);

        let mut generated = 0;
        for row in table.record_range() {
            if !secrets[row].is_empty() {
                continue;
            }
            let account = self.keys.generate();
            secrets[row] = account.secret;
            addresses[row] = account.address;
            generated += 1;
        }

        if generated == 0 {
            debug!("All records already have secrets");
            return Ok(0);
        }

        ctx.table.set_columns(vec![
            Column::new(columns::SECRET, secrets),
            Column::new(columns::ADDRESS, addresses),
        ])?;
        ctx.checkpoint_table()?;
        info!(generated, "Secrets generated");
        Ok(generated)
    }

    /// Mint one instance per record, then record the instance ids.
    async fn mint_instances(&self, ctx: &mut WorkflowContext) -> Result<usize> {
        let class_id = required_class_id(ctx)?;
        if ctx.table.record_count() == 0 {
            return Ok(0);
        }
        ctx.table.require_at_range_bounds(&[columns::ADDRESS])?;

        let runner = self.runner(ctx)?;
        let first = ctx.table.start();
        let table = &ctx.table;
        let ledger = ctx.ledger.as_ref();
        let class = class_id.as_str();

        let applied = runner
            .run(BatchKind::Mint, &mut ctx.batches, move |range, dry_run| async move {
                let calls = range
                    .map(|row| -> Result<LedgerCall> {
                        Ok(LedgerCall::Mint {
                            class_id: class.to_string(),
                            instance_id: instance_id_for(row, first),
                            owner: table.require(row, columns::ADDRESS)?.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                ledger.submit_batch(BatchKind::Mint, &calls, dry_run).await
            })
            .await?;

        let mut ids = column_values(&ctx.table, columns::INSTANCE_ID);
        let mut changed = false;
        for row in ctx.table.record_range() {
            let id = instance_id_for(row, first).to_string();
            if ids[row] != id {
                ids[row] = id;
                changed = true;
            }
        }
        if changed {
            ctx.table
                .set_columns(vec![Column::new(columns::INSTANCE_ID, ids)])?;
            ctx.checkpoint_table()?;
        }

        info!(batches = applied, "Instances minted");
        Ok(applied)
    }

    /// Pin each record's media and metadata document.
    async fn pin_images(&self, ctx: &mut WorkflowContext) -> Result<usize> {
        let Some(metadata) = &self.config.instance.metadata else {
            debug!("No instance metadata configured, skipping pinning");
            return Ok(0);
        };
        let templates = InstanceTemplates::compile(metadata, ctx.table.header())?;

        let pending: Vec<usize> = ctx
            .table
            .record_range()
            .filter(|row| ctx.table.value(*row, columns::METADATA_CID).is_none())
            .collect();
        if pending.is_empty() {
            debug!("All records already have metadata");
            return Ok(0);
        }

        info!(pending = pending.len(), "Pinning instance metadata");
        let pb = ProgressBar::new(pending.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let mut pinned = 0;
        let mut changed = false;
        let mut outcome = Ok(());
        for row in pending {
            let result = self
                .pin_record(ctx, metadata, &templates, row, &mut changed)
                .await;
            if let Err(e) = result {
                outcome = Err(e);
                break;
            }
            pinned += 1;
            pb.inc(1);
        }

        // Keep every written cid, including an image pinned for a row whose
        // document then failed.
        if changed {
            ctx.checkpoint_table()?;
        }
        match outcome {
            Ok(()) => {
                pb.finish_with_message(format!("{pinned} pinned"));
                info!(pinned, "Instance metadata pinned");
                Ok(pinned)
            }
            Err(e) => {
                pb.abandon_with_message(format!("failed after {pinned}"));
                Err(e)
            }
        }
    }

    async fn pin_record(
        &self,
        ctx: &mut WorkflowContext,
        metadata: &InstanceMetadataConfig,
        templates: &InstanceTemplates,
        row: usize,
        changed: &mut bool,
    ) -> Result<()> {
        let pinner = Arc::clone(&ctx.pinner);

        let image_cid = match ctx.table.value(row, columns::IMAGE_CID) {
            Some(cid) => cid.to_string(),
            None => {
                let path = templates.image_path(&metadata.image_folder, &ctx.table, row);
                let cid = pinner.pin_file(&path).await?;
                ctx.table.set_value(row, columns::IMAGE_CID, cid.as_str())?;
                *changed = true;
                cid
            }
        };
        let video_cid = match templates.video_path(&metadata.image_folder, &ctx.table, row) {
            Some(path) => Some(pinner.pin_file(&path).await?),
            None => None,
        };

        let fields = ctx.table.row_fields(row);
        let document = MetadataDocument::new(
            templates.name.render(row, &fields),
            templates.description.as_ref().map(|t| t.render(row, &fields)),
            Some(image_cid.as_str()),
            video_cid.as_deref(),
        );
        drop(fields);

        let cid = pinner
            .pin_json(&format!("{row}.json"), &document.to_json())
            .await?;
        ctx.table.set_value(row, columns::METADATA_CID, cid.as_str())?;
        *changed = true;
        debug!(row, cid = %cid, "Record metadata pinned");
        Ok(())
    }

    /// Point every minted instance at its metadata document.
    async fn set_instance_metadata(&self, ctx: &mut WorkflowContext) -> Result<usize> {
        if self.config.instance.metadata.is_none() {
            debug!("No instance metadata configured, skipping metadata batches");
            return Ok(0);
        }
        let class_id = required_class_id(ctx)?;
        if ctx.table.record_count() == 0 {
            return Ok(0);
        }
        ctx.table
            .require_at_range_bounds(&[columns::METADATA_CID, columns::INSTANCE_ID])?;

        let runner = self.runner(ctx)?;
        let table = &ctx.table;
        let ledger = ctx.ledger.as_ref();
        let class = class_id.as_str();

        let applied = runner
            .run(BatchKind::Metadata, &mut ctx.batches, move |range, dry_run| async move {
                let calls = range
                    .map(|row| -> Result<LedgerCall> {
                        Ok(LedgerCall::SetMetadata {
                            class_id: class.to_string(),
                            instance_id: parse_instance_id(table, row)?,
                            cid: table.require(row, columns::METADATA_CID)?.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                ledger.submit_batch(BatchKind::Metadata, &calls, dry_run).await
            })
            .await?;

        info!(batches = applied, "Instance metadata set");
        Ok(applied)
    }

    /// Send the initial fund to every beneficiary address.
    async fn send_funds(&self, ctx: &mut WorkflowContext) -> Result<usize> {
        let Some(amount) = self.config.initial_fund_units()? else {
            debug!("No initial fund configured, skipping transfers");
            return Ok(0);
        };
        if ctx.table.record_count() == 0 {
            return Ok(0);
        }
        ctx.table.require_at_range_bounds(&[columns::ADDRESS])?;

        let runner = self.runner(ctx)?;
        let table = &ctx.table;
        let ledger = ctx.ledger.as_ref();

        let applied = runner
            .run(BatchKind::Funds, &mut ctx.batches, move |range, dry_run| async move {
                let calls = range
                    .map(|row| -> Result<LedgerCall> {
                        Ok(LedgerCall::Transfer {
                            dest: table.require(row, columns::ADDRESS)?.to_string(),
                            amount,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                ledger.submit_batch(BatchKind::Funds, &calls, dry_run).await
            })
            .await?;

        info!(batches = applied, amount, "Funds sent");
        Ok(applied)
    }

    /// Write the output table and remove the checkpoints.
    fn finalize(&self, ctx: &mut WorkflowContext) -> Result<()> {
        let output = self.config.instance.data.output_path();
        ctx.finalize(&output)
    }

    /// Clear published metadata for the range so it is pinned and set again.
    fn reset_metadata(&self, ctx: &mut WorkflowContext) -> Result<()> {
        ctx.table.require_at_range_bounds(&[columns::INSTANCE_ID])?;

        let mut images = column_values(&ctx.table, columns::IMAGE_CID);
        let mut documents = column_values(&ctx.table, columns::METADATA_CID);
        for row in ctx.table.record_range() {
            images[row].clear();
            documents[row].clear();
        }
        ctx.table.set_columns(vec![
            Column::new(columns::IMAGE_CID, images),
            Column::new(columns::METADATA_CID, documents),
        ])?;

        ctx.batches.last_metadata_batch = 0;
        ctx.class.class_id = Some(self.config.class.id.clone());

        ctx.checkpoint_class()?;
        ctx.checkpoint_batches()?;
        ctx.checkpoint_table()?;
        info!(records = ctx.table.record_count(), "Metadata reset for update");
        Ok(())
    }

    fn runner(&self, ctx: &WorkflowContext) -> Result<BatchRunner> {
        BatchRunner::new(
            ctx.table.record_range(),
            self.config.instance.batch_size,
            ctx.dry_run,
        )
    }
}

fn required_class_id(ctx: &WorkflowContext) -> Result<String> {
    ctx.class
        .class_id
        .clone()
        .ok_or_else(|| GiftdropError::StateConsistency("no class id is checkpointed".to_string()))
}

/// Whether any batch has completed or any record in range has an instance id.
fn has_minting_progress(ctx: &WorkflowContext) -> bool {
    let batches = &ctx.batches;
    let counted = [BatchKind::Mint, BatchKind::Metadata, BatchKind::Funds]
        .into_iter()
        .any(|kind| batches.get(kind) > 0);
    counted
        || ctx
            .table
            .record_range()
            .any(|row| ctx.table.value(row, columns::INSTANCE_ID).is_some())
}

/// Existing values of `title`, or empty values when the column is new.
fn column_values(table: &DataTable, title: &str) -> Vec<String> {
    table
        .get_columns(&[title])
        .pop()
        .flatten()
        .map(|c| c.values)
        .unwrap_or_else(|| vec![String::new(); table.row_count()])
}

fn instance_id_for(row: usize, first: usize) -> u64 {
    (row - first) as u64
}

fn parse_instance_id(table: &DataTable, row: usize) -> Result<u64> {
    let raw = table.require(row, columns::INSTANCE_ID)?;
    raw.trim().parse().map_err(|_| {
        GiftdropError::StateConsistency(format!(
            "instance id '{raw}' for record {row} is not a number"
        ))
    })
}
