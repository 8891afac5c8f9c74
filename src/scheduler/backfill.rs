use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tracing::{debug, info, instrument, warn};

use crate::app::AppContext;
use crate::roster::{assign_indices, Entity};
use crate::store::insert_samples_with_retry;
use crate::vitals::{next_value, walk_rng, BaselineProfile, MetricKind, MetricSample};

/// Reading slots generated per day, inclusive bounds.
const SLOTS_PER_DAY_MIN: u32 = 6;
const SLOTS_PER_DAY_MAX: u32 = 8;
/// Slots are laid out inside the 06:00–22:00 window.
const FIRST_SLOT_HOUR: i64 = 6;
const SLOT_SPAN_HOURS: i64 = 16;

/// Generate a dense retroactive series for every active entity.
///
/// Idempotent at entity granularity: an entity already holding at least the
/// minimum expected sample count for the window is skipped, so re-running the
/// job is cheap and writes nothing new.
#[instrument(skip_all)]
pub async fn run(ctx: &AppContext) -> Result<u64> {
    let days = ctx.config.backfill.days;
    if days == 0 {
        info!("backfill disabled (days = 0)");
        return Ok(0);
    }

    let ids = ctx.roster.active_entities().await?;
    if ids.is_empty() {
        warn!("active roster is empty; backfill is a no-op");
        return Ok(0);
    }
    let entities = assign_indices(ids);
    let split = ctx.config.population.split();
    let threshold = u64::from(days) * u64::from(SLOTS_PER_DAY_MIN) * MetricKind::ALL.len() as u64;

    let now = Utc::now();
    let mut total_written = 0u64;
    for entity in &entities {
        let existing = match ctx.samples.sample_count(entity.id).await {
            Ok(count) => count,
            Err(err) => {
                warn!(entity = %entity.id, error = ?err, "sample count lookup failed; skipping entity");
                continue;
            }
        };
        if existing >= threshold {
            debug!(entity = %entity.id, existing, threshold, "already backfilled; skipping");
            continue;
        }

        let profile = BaselineProfile::assign(entity.index, entity.population, split);
        match backfill_entity(ctx, entity, &profile, days, now).await {
            Ok(written) => {
                total_written += written;
                ctx.metrics.add_backfill_samples(written);
                info!(entity = %entity.id, written, "entity backfill complete");
            }
            Err(err) => {
                warn!(entity = %entity.id, error = ?err, "entity backfill failed; continuing");
            }
        }
    }

    ctx.state
        .update_overview_with(|overview| overview.backfill_samples_total += total_written)
        .await;
    Ok(total_written)
}

async fn backfill_entity(
    ctx: &AppContext,
    entity: &Entity,
    profile: &BaselineProfile,
    days: u32,
    now: DateTime<Utc>,
) -> Result<u64> {
    let batch_size = ctx.config.backfill.batch_size;
    let mut batch: Vec<MetricSample> = Vec::with_capacity(batch_size);
    let mut written = 0u64;

    // Oldest day first so per-metric ordering matches insertion order.
    for day_offset in (1..=i64::from(days)).rev() {
        let day = (now - Duration::days(day_offset)).date_naive();
        let Some(day_start) = day.and_hms_opt(0, 0, 0) else {
            continue;
        };
        let day_start = day_start.and_utc();

        // Slot layout is deterministic per (entity, day) so re-runs target the
        // same timestamps and collide into duplicate-key skips.
        let mut layout_rng = day_layout_rng(entity, day_offset);
        let slots = layout_rng.gen_range(SLOTS_PER_DAY_MIN..=SLOTS_PER_DAY_MAX);

        // Continuity is within-day only: each day's first reading cold-starts
        // from the baseline.
        let mut last_of_day: HashMap<MetricKind, MetricSample> = HashMap::new();
        for slot in 0..slots {
            let hour = FIRST_SLOT_HOUR + (i64::from(slot) * SLOT_SPAN_HOURS) / i64::from(slots);
            let minute = layout_rng.gen_range(0..60i64);
            let at = day_start + Duration::hours(hour) + Duration::minutes(minute);

            for &metric in MetricKind::ALL {
                let mut rng = walk_rng(&entity.id, metric, at);
                let value = next_value(metric, profile, last_of_day.get(&metric), at, &mut rng);
                let sample = MetricSample::device(entity.id, metric, value, at);
                last_of_day.insert(metric, sample.clone());
                batch.push(sample);

                if batch.len() >= batch_size {
                    written += flush(ctx, &mut batch).await;
                }
            }
        }
    }

    written += flush(ctx, &mut batch).await;
    Ok(written)
}

async fn flush(ctx: &AppContext, batch: &mut Vec<MetricSample>) -> u64 {
    if batch.is_empty() {
        return 0;
    }
    let written = match insert_samples_with_retry(ctx.samples.as_ref(), batch).await {
        Some(written) => written,
        None => {
            ctx.metrics.inc_dropped_batches();
            0
        }
    };
    batch.clear();
    written
}

fn day_layout_rng(entity: &Entity, day_offset: i64) -> Pcg64 {
    let mut seed = 0xcbf2_9ce4_8422_2325u64;
    for &byte in entity.id.as_bytes() {
        seed ^= u64::from(byte);
        seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
    }
    Pcg64::seed_from_u64(seed ^ (day_offset as u64))
}
