use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, types::ToSql};

use crate::Database;
use crate::models::{ImageRow, ListingRow};

/// Most images a single listing may carry.
pub const MAX_IMAGES_PER_LISTING: usize = 10;

pub(crate) const LISTING_COLUMNS: &str = "l.id, l.owner_id, l.owner_name, l.business_name, l.description, \
     l.category, l.address, l.lat, l.lng, l.offers_delivery, l.is_special_offer, \
     l.likes, l.saves, l.created_at, l.updated_at";

pub struct NewListing {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub business_name: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub offers_delivery: bool,
    pub is_special_offer: bool,
    pub created_at: String,
}

/// Owner edits. `None` leaves the column unchanged.
#[derive(Default)]
pub struct ListingChanges {
    pub business_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    pub offers_delivery: Option<bool>,
    pub is_special_offer: Option<bool>,
}

/// Exact-match filters evaluated by the store.
#[derive(Debug, Default, Clone)]
pub struct ListingFilter {
    pub category: Option<String>,
    pub location: Option<String>,
}

/// Position of the last record of a page in `(created_at DESC, id DESC)`
/// order. The next page starts strictly after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: String,
    pub id: String,
}

impl PageCursor {
    pub fn after(row: &ListingRow) -> Self {
        Self {
            created_at: row.created_at.clone(),
            id: row.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAppend {
    Appended,
    ListingMissing,
    /// The listing would exceed `MAX_IMAGES_PER_LISTING`; nothing was written.
    TooMany,
}

impl Database {
    pub fn insert_listing(&self, listing: &NewListing) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO listings (id, owner_id, owner_name, business_name, description, category,
                                       address, lat, lng, offers_delivery, is_special_offer,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                rusqlite::params![
                    listing.id,
                    listing.owner_id,
                    listing.owner_name,
                    listing.business_name,
                    listing.description,
                    listing.category,
                    listing.address,
                    listing.lat,
                    listing.lng,
                    listing.offers_delivery,
                    listing.is_special_offer,
                    listing.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_listing(&self, id: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {LISTING_COLUMNS} FROM listings l WHERE l.id = ?1");
            let Some(row) = conn.query_row(&sql, [id], listing_from_row).optional()? else {
                return Ok(None);
            };
            let mut rows = vec![row];
            attach_images(conn, &mut rows)?;
            Ok(rows.pop())
        })
    }

    /// One page of the feed, newest first. Returns at most `limit` rows.
    pub fn list_listings(
        &self,
        filter: &ListingFilter,
        after: Option<&PageCursor>,
        limit: u32,
    ) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l
                 WHERE (?1 IS NULL OR l.category = ?1)
                   AND (?2 IS NULL OR l.address = ?2)
                   AND (?3 IS NULL OR l.created_at < ?3 OR (l.created_at = ?3 AND l.id < ?4))
                 ORDER BY l.created_at DESC, l.id DESC
                 LIMIT ?5"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(
                    rusqlite::params![
                        filter.category,
                        filter.location,
                        after.map(|c| c.created_at.as_str()),
                        after.map(|c| c.id.as_str()),
                        limit,
                    ],
                    listing_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_images(conn, &mut rows)?;
            Ok(rows)
        })
    }

    pub fn list_special_offers(&self, limit: u32) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l
                 WHERE l.is_special_offer = 1
                 ORDER BY l.created_at DESC, l.id DESC
                 LIMIT ?1"
            );
            query_listings(conn, &sql, &[&limit as &dyn ToSql])
        })
    }

    pub fn list_listings_by_owner(&self, owner_id: &str) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l
                 WHERE l.owner_id = ?1
                 ORDER BY l.created_at DESC, l.id DESC"
            );
            query_listings(conn, &sql, &[&owner_id as &dyn ToSql])
        })
    }

    pub fn count_listings_by_owner(&self, owner_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count =
                conn.query_row("SELECT COUNT(*) FROM listings WHERE owner_id = ?1", [owner_id], |row| {
                    row.get(0)
                })?;
            Ok(count)
        })
    }

    /// Listings with known coordinates, for map markers.
    pub fn list_located_listings(&self, category: Option<&str>) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listings l
                 WHERE NOT (l.lat = 0 AND l.lng = 0)
                   AND (?1 IS NULL OR l.category = ?1)
                 ORDER BY l.created_at DESC, l.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([category], listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply owner edits and bump `updated_at`. Returns false if the listing
    /// does not exist.
    pub fn update_listing(&self, id: &str, changes: &ListingChanges, updated_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let (lat, lng) = match changes.coordinates {
                Some((lat, lng)) => (Some(lat), Some(lng)),
                None => (None, None),
            };
            let updated = conn.execute(
                "UPDATE listings SET
                    business_name    = COALESCE(?2, business_name),
                    description      = COALESCE(?3, description),
                    category         = COALESCE(?4, category),
                    address          = COALESCE(?5, address),
                    lat              = COALESCE(?6, lat),
                    lng              = COALESCE(?7, lng),
                    offers_delivery  = COALESCE(?8, offers_delivery),
                    is_special_offer = COALESCE(?9, is_special_offer),
                    updated_at       = ?10
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    changes.business_name,
                    changes.description,
                    changes.category,
                    changes.address,
                    lat,
                    lng,
                    changes.offers_delivery,
                    changes.is_special_offer,
                    updated_at,
                ],
            )?;
            Ok(updated > 0)
        })
    }

    /// Append images after the listing's existing ones, as `(blob_key, url)`.
    pub fn append_listing_images(
        &self,
        listing_id: &str,
        images: &[(Option<String>, String)],
        updated_at: &str,
    ) -> Result<ImageAppend> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let exists = tx
                .query_row("SELECT 1 FROM listings WHERE id = ?1", [listing_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(ImageAppend::ListingMissing);
            }

            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM listing_images WHERE listing_id = ?1",
                [listing_id],
                |row| row.get(0),
            )?;
            if next as usize + images.len() > MAX_IMAGES_PER_LISTING {
                return Ok(ImageAppend::TooMany);
            }

            for (offset, (blob_key, url)) in images.iter().enumerate() {
                tx.execute(
                    "INSERT INTO listing_images (listing_id, position, blob_key, url) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![listing_id, next + offset as i64, blob_key, url],
                )?;
            }
            tx.execute(
                "UPDATE listings SET updated_at = ?2 WHERE id = ?1",
                (listing_id, updated_at),
            )?;
            tx.commit()?;
            Ok(ImageAppend::Appended)
        })
    }

    /// Delete a listing along with its images and interactions. Returns the
    /// storage keys of the removed images, or `None` if nothing was deleted.
    pub fn delete_listing(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let keys = {
                let mut stmt = tx.prepare(
                    "SELECT blob_key FROM listing_images WHERE listing_id = ?1 AND blob_key IS NOT NULL",
                )?;
                stmt.query_map([id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            let deleted = tx.execute("DELETE FROM listings WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok((deleted > 0).then_some(keys))
        })
    }
}

pub(crate) fn query_listings(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<ListingRow>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt
        .query_map(params, listing_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    attach_images(conn, &mut rows)?;
    Ok(rows)
}

pub(crate) fn listing_from_row(row: &Row) -> rusqlite::Result<ListingRow> {
    Ok(ListingRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_name: row.get(2)?,
        business_name: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        address: row.get(6)?,
        lat: row.get(7)?,
        lng: row.get(8)?,
        offers_delivery: row.get(9)?,
        is_special_offer: row.get(10)?,
        likes: row.get(11)?,
        saves: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        images: Vec::new(),
    })
}

/// Batch-fetch images for a set of listings and attach them in position order.
fn attach_images(conn: &Connection, rows: &mut [ListingRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (1..=rows.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT listing_id, position, blob_key, url FROM listing_images
         WHERE listing_id IN ({})
         ORDER BY listing_id, position",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = rows.iter().map(|r| &r.id as &dyn ToSql).collect();
    let images = stmt
        .query_map(params.as_slice(), |row| {
            Ok(ImageRow {
                listing_id: row.get(0)?,
                position: row.get(1)?,
                blob_key: row.get(2)?,
                url: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_listing: HashMap<String, Vec<ImageRow>> = HashMap::new();
    for img in images {
        by_listing.entry(img.listing_id.clone()).or_default().push(img);
    }
    for row in rows.iter_mut() {
        if let Some(images) = by_listing.remove(&row.id) {
            row.images = images;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::testutil::{listing, seeded_db};

    #[test]
    fn pages_are_newest_first_without_duplicates() {
        let db = seeded_db();
        for i in 0..7 {
            db.insert_listing(&listing(&format!("l{i}"), "cafes", i)).unwrap();
        }
        // Same timestamp as l6: the id breaks the tie.
        db.insert_listing(&listing("l9", "cafes", 6)).unwrap();

        let filter = ListingFilter::default();
        let mut seen = Vec::new();
        let mut cursor: Option<PageCursor> = None;
        loop {
            let page = db.list_listings(&filter, cursor.as_ref(), 3).unwrap();
            let full = page.len() == 3;
            cursor = page.last().map(PageCursor::after);
            seen.extend(page.into_iter().map(|r| r.id));
            if !full {
                break;
            }
        }

        assert_eq!(seen, ["l9", "l6", "l5", "l4", "l3", "l2", "l1", "l0"]);
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), seen.len());
    }

    #[test]
    fn category_and_location_filters_are_exact() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        db.insert_listing(&listing("b", "retail", 2)).unwrap();
        let mut elsewhere = listing("c", "cafes", 3);
        elsewhere.address = "9 Side St".to_string();
        db.insert_listing(&elsewhere).unwrap();

        let cafes = ListingFilter {
            category: Some("cafes".to_string()),
            location: None,
        };
        let rows = db.list_listings(&cafes, None, 10).unwrap();
        assert!(rows.iter().all(|r| r.category == "cafes"));
        assert_eq!(rows.len(), 2);

        let main_st_cafes = ListingFilter {
            category: Some("cafes".to_string()),
            location: Some("1 Main St".to_string()),
        };
        let rows = db.list_listings(&main_st_cafes, None, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
    }

    #[test]
    fn images_keep_upload_order() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        let first = db
            .append_listing_images("a", &[(Some("k1".into()), "/images/k1".into())], "2024-02-01T00:00:00.000Z")
            .unwrap();
        assert_eq!(first, ImageAppend::Appended);
        db.append_listing_images(
            "a",
            &[(Some("k2".into()), "/images/k2".into()), (None, "https://cdn/x.jpg".into())],
            "2024-02-02T00:00:00.000Z",
        )
        .unwrap();

        let row = db.get_listing("a").unwrap().unwrap();
        let urls: Vec<_> = row.images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, ["/images/k1", "/images/k2", "https://cdn/x.jpg"]);
        assert_eq!(row.updated_at, "2024-02-02T00:00:00.000Z");
    }

    #[test]
    fn image_cap_is_checked_against_stored_rows() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        let nine: Vec<_> = (0..9).map(|i| (Some(format!("k{i}")), format!("/images/k{i}"))).collect();
        assert_eq!(
            db.append_listing_images("a", &nine, "2024-02-01T00:00:00.000Z").unwrap(),
            ImageAppend::Appended
        );

        let two = [(Some("x".into()), "/images/x".into()), (Some("y".into()), "/images/y".into())];
        assert_eq!(
            db.append_listing_images("a", &two, "2024-02-02T00:00:00.000Z").unwrap(),
            ImageAppend::TooMany
        );
        let row = db.get_listing("a").unwrap().unwrap();
        assert_eq!(row.images.len(), 9);
        assert_eq!(row.updated_at, "2024-02-01T00:00:00.000Z");

        assert_eq!(
            db.append_listing_images("a", &two[..1], "2024-02-03T00:00:00.000Z").unwrap(),
            ImageAppend::Appended
        );
        assert_eq!(db.get_listing("a").unwrap().unwrap().images.len(), MAX_IMAGES_PER_LISTING);
    }

    #[test]
    fn appending_to_missing_listing_writes_nothing() {
        let db = seeded_db();
        let one = [(Some("k".into()), "/images/k".into())];
        assert_eq!(
            db.append_listing_images("gone", &one, "2024-02-01T00:00:00.000Z").unwrap(),
            ImageAppend::ListingMissing
        );
    }

    #[test]
    fn update_applies_only_given_fields() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();

        let changes = ListingChanges {
            business_name: Some("Renamed".into()),
            is_special_offer: Some(true),
            ..Default::default()
        };
        assert!(db.update_listing("a", &changes, "2024-03-01T00:00:00.000Z").unwrap());
        assert!(!db.update_listing("missing", &changes, "2024-03-01T00:00:00.000Z").unwrap());

        let row = db.get_listing("a").unwrap().unwrap();
        assert_eq!(row.business_name, "Renamed");
        assert!(row.is_special_offer);
        assert_eq!(row.description, "A neighbourhood business");
        assert_eq!(row.updated_at, "2024-03-01T00:00:00.000Z");

        let offers = db.list_special_offers(5).unwrap();
        assert_eq!(offers.len(), 1);
    }

    #[test]
    fn delete_returns_blob_keys() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        db.append_listing_images(
            "a",
            &[(Some("k1".into()), "/images/k1".into()), (None, "https://cdn/x.jpg".into())],
            "2024-02-01T00:00:00.000Z",
        )
        .unwrap();

        assert_eq!(db.delete_listing("a").unwrap(), Some(vec!["k1".to_string()]));
        assert!(db.get_listing("a").unwrap().is_none());
        assert_eq!(db.delete_listing("a").unwrap(), None);
    }

    #[test]
    fn unlocated_listings_have_no_marker() {
        let db = seeded_db();
        db.insert_listing(&listing("a", "cafes", 1)).unwrap();
        let mut unknown = listing("b", "cafes", 2);
        unknown.lat = 0.0;
        unknown.lng = 0.0;
        db.insert_listing(&unknown).unwrap();

        let rows = db.list_located_listings(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
        assert!(db.list_located_listings(Some("retail")).unwrap().is_empty());
    }
}
