//! SQL schema for the Queuecast SQLite history store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per attraction per 5-minute slot of its source update time.
-- Re-ingesting a slot is ignored via the primary key.
CREATE TABLE IF NOT EXISTS wait_observations (
    park_id       TEXT    NOT NULL,
    attraction_id TEXT    NOT NULL,
    slot_5m       INTEGER NOT NULL,
    observed_ms   INTEGER NOT NULL,   -- source_updated_at, epoch millis
    ingested_at   TEXT    NOT NULL,   -- RFC 3339 UTC
    day_of_week   INTEGER NOT NULL,   -- park-local, 0 = Sunday
    bucket_15m    INTEGER NOT NULL,   -- park-local, 0..96
    hour_of_day   INTEGER NOT NULL,   -- park-local
    name          TEXT    NOT NULL,
    land          TEXT,
    status        TEXT    NOT NULL,   -- 'OPERATING' | 'DOWN' | ...
    queue_kind    TEXT    NOT NULL,
    wait_minutes  INTEGER,            -- NULL when no queue signal
    provider      TEXT    NOT NULL,
    PRIMARY KEY (park_id, attraction_id, slot_5m)
);

CREATE INDEX IF NOT EXISTS idx_observations_recent
    ON wait_observations (park_id, attraction_id, observed_ms);
CREATE INDEX IF NOT EXISTS idx_observations_age
    ON wait_observations (observed_ms);

-- Pre-aggregated medians, rebuilt wholesale by refresh_baselines.
CREATE TABLE IF NOT EXISTS wait_baseline_15m (
    park_id             TEXT    NOT NULL,
    day_of_week         INTEGER NOT NULL,
    bucket_15m          INTEGER NOT NULL,
    attraction_id       TEXT    NOT NULL,
    median_wait_minutes INTEGER NOT NULL,
    sample_count        INTEGER NOT NULL,
    refreshed_at        TEXT    NOT NULL,
    PRIMARY KEY (park_id, day_of_week, bucket_15m, attraction_id)
);

CREATE TABLE IF NOT EXISTS wait_baseline_hour (
    park_id             TEXT    NOT NULL,
    hour_of_day         INTEGER NOT NULL,
    attraction_id       TEXT    NOT NULL,
    median_wait_minutes INTEGER NOT NULL,
    sample_count        INTEGER NOT NULL,
    refreshed_at        TEXT    NOT NULL,
    PRIMARY KEY (park_id, hour_of_day, attraction_id)
);

CREATE TABLE IF NOT EXISTS wait_baseline_global (
    park_id             TEXT    NOT NULL,
    attraction_id       TEXT    NOT NULL,
    median_wait_minutes INTEGER NOT NULL,
    sample_count        INTEGER NOT NULL,
    refreshed_at        TEXT    NOT NULL,
    PRIMARY KEY (park_id, attraction_id)
);
";
