use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                display_name    TEXT NOT NULL,
                photo_url       TEXT,
                business_name   TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE categories (
                id      TEXT PRIMARY KEY,
                name    TEXT NOT NULL,
                icon    TEXT
            );

            CREATE TABLE listings (
                id                  TEXT PRIMARY KEY,
                owner_id            TEXT NOT NULL REFERENCES users(id),
                owner_name          TEXT NOT NULL,
                business_name       TEXT NOT NULL,
                description         TEXT NOT NULL,
                category            TEXT NOT NULL REFERENCES categories(id),
                address             TEXT NOT NULL,
                lat                 REAL NOT NULL DEFAULT 0,
                lng                 REAL NOT NULL DEFAULT 0,
                offers_delivery     INTEGER NOT NULL DEFAULT 0,
                is_special_offer    INTEGER NOT NULL DEFAULT 0,
                likes               INTEGER NOT NULL DEFAULT 0,
                saves               INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_listings_feed ON listings(created_at DESC, id DESC);
            CREATE INDEX idx_listings_category ON listings(category, created_at DESC);
            CREATE INDEX idx_listings_owner ON listings(owner_id, created_at DESC);

            CREATE TABLE listing_images (
                listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                blob_key    TEXT,
                url         TEXT NOT NULL,
                PRIMARY KEY (listing_id, position)
            );

            CREATE TABLE user_interactions (
                user_id     TEXT NOT NULL REFERENCES users(id),
                listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                liked       INTEGER NOT NULL DEFAULT 0,
                saved       INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, listing_id)
            );

            CREATE INDEX idx_interactions_listing ON user_interactions(listing_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (interaction saved_at)");
        conn.execute_batch(
            "
            ALTER TABLE user_interactions ADD COLUMN saved_at TEXT;
            UPDATE user_interactions SET saved_at = updated_at WHERE saved = 1;
            CREATE INDEX idx_interactions_saved ON user_interactions(user_id, saved_at DESC);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
