//! Database schema definitions for SquadRun.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Squads table
CREATE TABLE IF NOT EXISTS squads (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    owner_id TEXT NOT NULL,
    is_private INTEGER NOT NULL DEFAULT 0,
    total_points INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Live squad membership
CREATE TABLE IF NOT EXISTS squad_members (
    squad_id TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
    member_id TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (squad_id, member_id)
);

CREATE INDEX IF NOT EXISTS idx_squad_members_member ON squad_members(member_id);

-- Run log (distances normalized to km)
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    member_id TEXT NOT NULL,
    distance_km REAL NOT NULL,
    duration_minutes REAL NOT NULL,
    unit_entered TEXT NOT NULL DEFAULT 'km',
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_member_time ON runs(member_id, recorded_at);

-- Weekly squad goals
CREATE TABLE IF NOT EXISTS weekly_goals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    squad_id TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
    week_start TEXT NOT NULL,
    target_distance_km REAL NOT NULL DEFAULT 0,
    unit_entered TEXT NOT NULL DEFAULT 'km',
    total_distance_km REAL NOT NULL DEFAULT 0,
    achieved INTEGER NOT NULL DEFAULT 0,
    points_awarded INTEGER NOT NULL DEFAULT 0,
    closed_out INTEGER NOT NULL DEFAULT 0,
    closed_at TEXT,
    UNIQUE(squad_id, week_start)
);

CREATE INDEX IF NOT EXISTS idx_weekly_goals_week ON weekly_goals(week_start);

-- Per-member streaks within a squad
CREATE TABLE IF NOT EXISTS member_streaks (
    squad_id TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
    member_id TEXT NOT NULL,
    current_streak INTEGER NOT NULL DEFAULT 0,
    longest_streak INTEGER NOT NULL DEFAULT 0,
    last_week_achieved INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (squad_id, member_id)
);

-- Closeout audit trail
CREATE TABLE IF NOT EXISTS weekly_result_logs (
    member_id TEXT NOT NULL,
    squad_id TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
    week_start TEXT NOT NULL,
    points_change INTEGER NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (member_id, squad_id, week_start)
);
"#;

/// Schema version table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;
