use anyhow::Result;
use rusqlite::{OptionalExtension, types::ToSql};

use crate::Database;
use crate::listings::query_listings;
use crate::models::{InteractionRow, ListingRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Like,
    Save,
}

impl InteractionKind {
    fn flag_column(self) -> &'static str {
        match self {
            Self::Like => "liked",
            Self::Save => "saved",
        }
    }

    fn counter_column(self) -> &'static str {
        match self {
            Self::Like => "likes",
            Self::Save => "saves",
        }
    }
}

/// State after a toggle: the caller's flags and the listing's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub liked: bool,
    pub saved: bool,
    pub likes: i64,
    pub saves: i64,
}

impl Database {
    pub fn get_interaction(&self, user_id: &str, listing_id: &str) -> Result<Option<InteractionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, listing_id, liked, saved, created_at, updated_at
                     FROM user_interactions WHERE user_id = ?1 AND listing_id = ?2",
                    (user_id, listing_id),
                    |row| {
                        Ok(InteractionRow {
                            user_id: row.get(0)?,
                            listing_id: row.get(1)?,
                            liked: row.get(2)?,
                            saved: row.get(3)?,
                            created_at: row.get(4)?,
                            updated_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Flip the user's like/save flag on a listing and move the listing's
    /// counter with it, in one transaction. A first interaction creates the
    /// record with the flag set. Returns `None` if the listing does not exist.
    pub fn toggle_interaction(
        &self,
        user_id: &str,
        listing_id: &str,
        kind: InteractionKind,
        now: &str,
    ) -> Result<Option<ToggleOutcome>> {
        let flag = kind.flag_column();
        let counter = kind.counter_column();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let exists = tx
                .query_row("SELECT 1 FROM listings WHERE id = ?1", [listing_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }

            let current: Option<bool> = tx
                .query_row(
                    &format!("SELECT {flag} FROM user_interactions WHERE user_id = ?1 AND listing_id = ?2"),
                    (user_id, listing_id),
                    |row| row.get(0),
                )
                .optional()?;

            let now_set = match current {
                Some(was_set) => {
                    tx.execute(
                        &format!(
                            "UPDATE user_interactions SET {flag} = ?3, updated_at = ?4
                             WHERE user_id = ?1 AND listing_id = ?2"
                        ),
                        rusqlite::params![user_id, listing_id, !was_set, now],
                    )?;
                    !was_set
                }
                None => {
                    tx.execute(
                        &format!(
                            "INSERT INTO user_interactions (user_id, listing_id, {flag}, created_at, updated_at)
                             VALUES (?1, ?2, 1, ?3, ?3)"
                        ),
                        (user_id, listing_id, now),
                    )?;
                    true
                }
            };

            if kind == InteractionKind::Save {
                let saved_at = now_set.then_some(now);
                tx.execute(
                    "UPDATE user_interactions SET saved_at = ?3 WHERE user_id = ?1 AND listing_id = ?2",
                    (user_id, listing_id, saved_at),
                )?;
            }

            let delta: i64 = if now_set { 1 } else { -1 };
            tx.execute(
                &format!("UPDATE listings SET {counter} = MAX(0, {counter} + ?2) WHERE id = ?1"),
                rusqlite::params![listing_id, delta],
            )?;

            let outcome = tx.query_row(
                "SELECT COALESCE(i.liked, 0), COALESCE(i.saved, 0), l.likes, l.saves
                 FROM listings l
                 LEFT JOIN user_interactions i ON i.listing_id = l.id AND i.user_id = ?2
                 WHERE l.id = ?1",
                (listing_id, user_id),
                |row| {
                    Ok(ToggleOutcome {
                        liked: row.get(0)?,
                        saved: row.get(1)?,
                        likes: row.get(2)?,
                        saves: row.get(3)?,
                    })
                },
            )?;

            tx.commit()?;
            Ok(Some(outcome))
        })
    }

    /// Listings the user has saved, most recently saved first.
    pub fn list_saved_listings(&self, user_id: &str) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM listings l
                 JOIN user_interactions i ON i.listing_id = l.id
                 WHERE i.user_id = ?1 AND i.saved = 1
                 ORDER BY i.saved_at DESC, l.id DESC",
                crate::listings::LISTING_COLUMNS
            );
            query_listings(conn, &sql, &[&user_id as &dyn ToSql])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{listing, seeded_db};

    const T1: &str = "2024-05-01T00:00:00.000Z";
    const T2: &str = "2024-05-01T00:01:00.000Z";
    const T3: &str = "2024-05-01T00:02:00.000Z";

    #[test]
    fn like_twice_restores_counter() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();

        let first = db.toggle_interaction("u2", "a", InteractionKind::Like, T1).unwrap().unwrap();
        assert!(first.liked);
        assert!(!first.saved);
        assert_eq!(first.likes, 1);

        let second = db.toggle_interaction("u2", "a", InteractionKind::Like, T2).unwrap().unwrap();
        assert!(!second.liked);
        assert_eq!(second.likes, 0);

        let record = db.get_interaction("u2", "a").unwrap().unwrap();
        assert!(!record.liked);
        assert_eq!(record.created_at, T1);
        assert_eq!(record.updated_at, T2);
    }

    #[test]
    fn counters_track_flags_across_users() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();

        db.toggle_interaction("u1", "a", InteractionKind::Like, T1).unwrap();
        db.toggle_interaction("u2", "a", InteractionKind::Like, T1).unwrap();
        db.toggle_interaction("u2", "a", InteractionKind::Save, T1).unwrap();
        let out = db.toggle_interaction("u1", "a", InteractionKind::Like, T2).unwrap().unwrap();

        // u1 un-liked; u2 still likes and saves
        assert!(!out.liked);
        assert_eq!(out.likes, 1);
        assert_eq!(out.saves, 1);

        let u2 = db.get_interaction("u2", "a").unwrap().unwrap();
        assert!(u2.liked && u2.saved);
    }

    #[test]
    fn toggle_on_missing_listing_is_none() {
        let db = seeded_db();
        assert!(db.toggle_interaction("u1", "ghost", InteractionKind::Save, T1).unwrap().is_none());
        assert!(db.get_interaction("u1", "ghost").unwrap().is_none());
    }

    #[test]
    fn saved_listings_follow_save_flag() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        db.insert_listing(&listing("b", "retail", 2)).unwrap();

        db.toggle_interaction("u2", "a", InteractionKind::Save, T1).unwrap();
        db.toggle_interaction("u2", "b", InteractionKind::Save, T2).unwrap();
        db.toggle_interaction("u2", "b", InteractionKind::Like, T2).unwrap();

        let saved: Vec<_> = db.list_saved_listings("u2").unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(saved, ["b", "a"]);

        db.toggle_interaction("u2", "a", InteractionKind::Save, T2).unwrap();
        let saved: Vec<_> = db.list_saved_listings("u2").unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(saved, ["b"]);
    }

    #[test]
    fn liking_does_not_reorder_saved_listings() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        db.insert_listing(&listing("b", "retail", 2)).unwrap();

        db.toggle_interaction("u2", "a", InteractionKind::Save, T1).unwrap();
        db.toggle_interaction("u2", "b", InteractionKind::Save, T2).unwrap();
        db.toggle_interaction("u2", "a", InteractionKind::Like, T3).unwrap();

        let saved: Vec<_> = db.list_saved_listings("u2").unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(saved, ["b", "a"]);
    }

    #[test]
    fn resaving_moves_listing_to_front() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        db.insert_listing(&listing("b", "retail", 2)).unwrap();

        db.toggle_interaction("u2", "a", InteractionKind::Save, T1).unwrap();
        db.toggle_interaction("u2", "b", InteractionKind::Save, T1).unwrap();
        db.toggle_interaction("u2", "a", InteractionKind::Save, T2).unwrap();
        db.toggle_interaction("u2", "a", InteractionKind::Save, T3).unwrap();

        let saved: Vec<_> = db.list_saved_listings("u2").unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(saved, ["a", "b"]);
    }

    #[test]
    fn deleting_listing_drops_interactions() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        db.toggle_interaction("u2", "a", InteractionKind::Like, T1).unwrap();

        db.delete_listing("a").unwrap();
        assert!(db.get_interaction("u2", "a").unwrap().is_none());
    }
}
