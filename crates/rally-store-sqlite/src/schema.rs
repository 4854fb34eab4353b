//! SQL schema for the Rally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS matches (
    match_id           TEXT PRIMARY KEY,
    scheduled_start    TEXT NOT NULL,
    scheduled_end      TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    closed_at          TEXT,              -- NULL until the closure job runs
    mutually_cancelled INTEGER NOT NULL DEFAULT 0,
    CHECK (scheduled_end > scheduled_start)
);

CREATE TABLE IF NOT EXISTS match_participants (
    match_id      TEXT NOT NULL REFERENCES matches(match_id),
    player_id     TEXT NOT NULL,
    joined_at     TEXT NOT NULL,
    match_outcome TEXT,                   -- 'played' | 'mutual_cancel' | 'opponent_no_show'
    showed_up     INTEGER,                -- aggregated
    was_late      INTEGER,                -- aggregated
    star_rating   INTEGER CHECK (star_rating BETWEEN 1 AND 5),
    aggregated_at TEXT,
    PRIMARY KEY (match_id, player_id)
);

-- Feedback is strictly append-only.
CREATE TABLE IF NOT EXISTS match_feedback (
    feedback_id  TEXT PRIMARY KEY,
    match_id     TEXT NOT NULL,
    reviewer_id  TEXT NOT NULL,
    opponent_id  TEXT NOT NULL,
    showed_up    INTEGER NOT NULL,
    was_late     INTEGER,
    star_rating  INTEGER CHECK (star_rating BETWEEN 1 AND 5),
    comment      TEXT,
    submitted_at TEXT NOT NULL,
    UNIQUE (match_id, reviewer_id, opponent_id),
    CHECK  (reviewer_id != opponent_id),
    FOREIGN KEY (match_id, reviewer_id) REFERENCES match_participants(match_id, player_id),
    FOREIGN KEY (match_id, opponent_id) REFERENCES match_participants(match_id, player_id)
);

CREATE TABLE IF NOT EXISTS reputation_config (
    event_type     TEXT PRIMARY KEY,
    default_impact INTEGER NOT NULL
);

-- The reputation ledger. No UPDATE or DELETE is ever issued against it.
CREATE TABLE IF NOT EXISTS reputation_events (
    event_id          TEXT PRIMARY KEY,
    player_id         TEXT NOT NULL,
    event_type        TEXT NOT NULL,
    base_impact       INTEGER NOT NULL,
    match_id          TEXT REFERENCES matches(match_id),
    metadata          TEXT NOT NULL DEFAULT '{}',
    event_occurred_at TEXT NOT NULL,
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS matches_open_idx     ON matches(closed_at, scheduled_end);
CREATE INDEX IF NOT EXISTS feedback_match_idx   ON match_feedback(match_id);
CREATE INDEX IF NOT EXISTS events_player_idx    ON reputation_events(player_id);

PRAGMA user_version = 1;
";
