use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use sqlx::PgPool;
use uuid::Uuid;

use crate::economy::gems::GemType;
use crate::models::attempt::COAL_THRESHOLD_DAYS;

/// Aggregate outcome of one daily run. Per-couple failures are
/// collected here; only a failure listing the couples aborts the run.
#[derive(Debug, Default)]
pub struct DailyJobSummary {
    pub couples_processed: u64,
    pub coal_transitions: u64,
    pub weekly_diamonds: u64,
    pub anniversary_diamonds: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ActiveCouple {
    id: Uuid,
    anniversary_date: Option<NaiveDate>,
}

/// Monday 00:00 of the week containing `today` (ISO week).
fn week_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

fn is_anniversary(anniversary: NaiveDate, today: NaiveDate) -> bool {
    anniversary.month() == today.month() && anniversary.day() == today.day()
}

/// Solid attempts created strictly before this instant age into coal.
fn coal_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(COAL_THRESHOLD_DAYS)
}

/// Run the daily coal/diamond pass for every active couple.
pub async fn run_daily_job(db: &PgPool) -> Result<DailyJobSummary, sqlx::Error> {
    let today = Utc::now().date_naive();
    let mut summary = DailyJobSummary::default();

    let couples = sqlx::query_as::<_, ActiveCouple>(
        "SELECT id, anniversary_date FROM couples WHERE status = 'active'",
    )
    .fetch_all(db)
    .await?;

    tracing::info!(count = couples.len(), "Daily job: processing active couples");

    for couple in &couples {
        match process_couple(db, couple, today).await {
            Ok(outcome) => {
                summary.coal_transitions += outcome.coal_transitions;
                if outcome.weekly_diamond {
                    summary.weekly_diamonds += 1;
                }
                if outcome.anniversary_diamond {
                    summary.anniversary_diamonds += 1;
                }
                summary.couples_processed += 1;
            }
            Err(e) => {
                tracing::error!(couple_id = %couple.id, error = %e, "Daily job: couple failed");
                summary.errors.push(format!("couple {}: {}", couple.id, e));
            }
        }
    }

    tracing::info!(
        couples_processed = summary.couples_processed,
        coal_transitions = summary.coal_transitions,
        weekly_diamonds = summary.weekly_diamonds,
        anniversary_diamonds = summary.anniversary_diamonds,
        errors = summary.errors.len(),
        "Daily job completed"
    );

    Ok(summary)
}

#[derive(Debug, Default)]
struct CoupleOutcome {
    coal_transitions: u64,
    weekly_diamond: bool,
    anniversary_diamond: bool,
}

async fn process_couple(
    db: &PgPool,
    couple: &ActiveCouple,
    today: NaiveDate,
) -> Result<CoupleOutcome, sqlx::Error> {
    let mut outcome = CoupleOutcome {
        coal_transitions: process_coal_transitions(db, couple.id).await?,
        ..Default::default()
    };

    // Weekly reflection is checked on the last day of the ISO week.
    if today.weekday() == Weekday::Sun && both_partners_logged_this_week(db, couple.id, today).await?
    {
        award_diamond_to_couple(db, couple.id, "weekly_reflection").await?;
        outcome.weekly_diamond = true;
    }

    if let Some(anniversary) = couple.anniversary_date {
        if is_anniversary(anniversary, today) {
            award_diamond_to_couple(db, couple.id, "anniversary").await?;
            outcome.anniversary_diamond = true;
        }
    }

    Ok(outcome)
}

/// Age stale solid gems into coal. The gem_state guard makes this
/// idempotent: re-running finds nothing for already-coal attempts.
async fn process_coal_transitions(db: &PgPool, couple_id: Uuid) -> Result<u64, sqlx::Error> {
    let threshold = coal_cutoff(Utc::now());

    let result = sqlx::query(
        r#"
        UPDATE attempts SET gem_state = 'coal', coal_at = NOW()
        WHERE couple_id = $1
          AND acknowledged = false
          AND created_at < $2
          AND gem_state <> 'coal'
        "#,
    )
    .bind(couple_id)
    .bind(threshold)
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}

async fn both_partners_logged_this_week(
    db: &PgPool,
    couple_id: Uuid,
    today: NaiveDate,
) -> Result<bool, sqlx::Error> {
    let since = week_start(today).and_time(NaiveTime::MIN).and_utc();

    let partner_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE couple_id = $1")
            .bind(couple_id)
            .fetch_one(db)
            .await?;
    if partner_count < 2 {
        return Ok(false);
    }

    let loggers: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT by_player_id) FROM attempts
        WHERE couple_id = $1 AND created_at >= $2
        "#,
    )
    .bind(couple_id)
    .bind(since)
    .fetch_one(db)
    .await?;

    Ok(loggers >= partner_count)
}

/// One diamond to each partner: gem count, lifetime breakdown and
/// liquid breakdown all move together.
async fn award_diamond_to_couple(
    db: &PgPool,
    couple_id: Uuid,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE players SET
            gem_count = gem_count + $2,
            gems_diamond = gems_diamond + 1,
            liquid_diamond = liquid_diamond + 1
        WHERE couple_id = $1
        "#,
    )
    .bind(couple_id)
    .bind(GemType::Diamond.value())
    .execute(db)
    .await?;

    tracing::info!(couple_id = %couple_id, reason = reason, "Awarded diamond to both partners");
    Ok(())
}

fn next_fire_time(now: DateTime<Utc>, hour_utc: u32) -> DateTime<Utc> {
    let today_fire = now
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(hour_utc, 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc();
    if today_fire > now {
        today_fire
    } else {
        today_fire + Duration::days(1)
    }
}

/// Spawn the daily scheduler loop. Concurrent or repeated runs are
/// safe: the coal transition is idempotent by its state guard.
pub fn spawn_daily_scheduler(db: PgPool, hour_utc: u32) {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let fire_at = next_fire_time(now, hour_utc);
            let sleep_for = (fire_at - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60));
            tracing::info!(fire_at = %fire_at, "Daily job scheduled");
            tokio::time::sleep(sleep_for).await;

            if let Err(e) = run_daily_job(&db).await {
                tracing::error!(error = %e, "Daily job failed to enumerate couples");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn week_start_is_monday() {
        // 2024-06-16 is a Sunday; its ISO week began Monday 2024-06-10.
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        assert_eq!(
            week_start(sunday),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
        );

        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn anniversary_matches_month_and_day_only() {
        let anniversary = NaiveDate::from_ymd_opt(2019, 3, 14).unwrap();
        assert!(is_anniversary(
            anniversary,
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
        ));
        assert!(!is_anniversary(
            anniversary,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        ));
    }

    #[test]
    fn coal_cutoff_catches_only_attempts_older_than_fourteen_days() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 16)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
            .and_utc();
        let cutoff = coal_cutoff(now);

        // The coal scan matches created_at < cutoff.
        assert!(now - Duration::days(15) < cutoff);
        assert!(!(now - Duration::days(10) < cutoff));
        // Exactly fourteen days old stays solid until the next run.
        assert!(!(now - Duration::days(14) < cutoff));
    }

    #[test]
    fn next_fire_time_rolls_to_tomorrow_after_the_hour() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 16)
            .unwrap()
            .and_hms_opt(5, 30, 0)
            .unwrap()
            .and_utc();

        let later_today = next_fire_time(now, 6);
        assert_eq!(later_today.hour(), 6);
        assert_eq!(later_today.date_naive(), now.date_naive());

        let tomorrow = next_fire_time(now, 5);
        assert_eq!(tomorrow.date_naive(), now.date_naive() + Duration::days(1));
    }
}
