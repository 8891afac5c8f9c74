use anyhow::Result;
use chrono::Utc;
use tracing::{instrument, warn};

use crate::alerts;
use crate::app::AppContext;
use crate::roster::{assign_indices, Entity};
use crate::state::RosterEntry;
use crate::store::insert_samples_with_retry;
use crate::vitals::{next_value, walk_rng, BaselineProfile, HealthGroup, MetricKind, MetricSample};

/// One live telemetry tick: evolve every metric of every active entity from
/// its latest stored sample, persist the results, then hand the fresh batch
/// to the alert emitter.
#[instrument(skip_all)]
pub async fn run(ctx: &AppContext) -> Result<()> {
    let now = Utc::now();
    let ids = ctx.roster.active_entities().await?;
    if ids.is_empty() {
        warn!("active roster is empty; live tick is a no-op");
        return Ok(());
    }

    let entities = assign_indices(ids);
    let split = ctx.config.population.split();

    let mut tick_samples = Vec::with_capacity(entities.len() * MetricKind::ALL.len());
    for entity in &entities {
        let profile = BaselineProfile::assign(entity.index, entity.population, split);
        let batch = match generate_entity_batch(ctx, entity, &profile).await {
            Ok(batch) => batch,
            Err(err) => {
                // One entity's store trouble must not starve the rest of the
                // population of samples.
                warn!(entity = %entity.id, error = ?err, "skipping entity this tick");
                continue;
            }
        };

        match insert_samples_with_retry(ctx.samples.as_ref(), &batch).await {
            Some(_) => {
                for sample in &batch {
                    ctx.metrics.add_samples_generated(sample.metric.as_str(), 1);
                }
                tick_samples.extend(batch);
            }
            None => {
                ctx.metrics.inc_dropped_batches();
            }
        }
    }

    publish_overview(ctx, &entities, split, tick_samples.len()).await;

    alerts::emit_for_tick(ctx, &entities, &tick_samples, now).await;
    Ok(())
}

async fn generate_entity_batch(
    ctx: &AppContext,
    entity: &Entity,
    profile: &BaselineProfile,
) -> Result<Vec<MetricSample>> {
    let now = Utc::now();
    let mut batch = Vec::with_capacity(MetricKind::ALL.len());
    for &metric in MetricKind::ALL {
        let prev = ctx.samples.latest_sample(entity.id, metric).await?;
        let mut rng = walk_rng(&entity.id, metric, now);
        let value = next_value(metric, profile, prev.as_ref(), now, &mut rng);
        batch.push(MetricSample::device(entity.id, metric, value, now));
    }
    Ok(batch)
}

async fn publish_overview(
    ctx: &AppContext,
    entities: &[Entity],
    split: crate::vitals::PopulationSplit,
    samples_written: usize,
) {
    let mut healthy = 0usize;
    let mut warning = 0usize;
    let mut critical = 0usize;
    let mut roster_entries = Vec::with_capacity(entities.len());
    for entity in entities {
        let group = crate::vitals::health_group(entity.index, entity.population, split);
        match group {
            HealthGroup::Healthy => healthy += 1,
            HealthGroup::Warning => warning += 1,
            HealthGroup::Critical => critical += 1,
        }
        roster_entries.push(RosterEntry {
            id: entity.id,
            index: entity.index,
            group,
        });
    }

    let fleet = ctx.fleet_name();
    ctx.metrics.set_population(fleet, "healthy", healthy);
    ctx.metrics.set_population(fleet, "warning", warning);
    ctx.metrics.set_population(fleet, "critical", critical);

    ctx.state.update_roster(roster_entries).await;
    ctx.state
        .update_overview_with(|overview| {
            overview.generated_at = Some(Utc::now());
            overview.population = entities.len();
            overview.healthy = healthy;
            overview.warning = warning;
            overview.critical = critical;
            overview.samples_last_tick = samples_written;
            overview.samples_total += samples_written as u64;
        })
        .await;
}
