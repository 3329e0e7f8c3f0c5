use anyhow::Result;

use crate::Database;
use crate::models::CategoryRow;

/// Reference categories as (id, name, icon).
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    ("restaurants", "Restaurants", "utensils"),
    ("cafes", "Cafes", "coffee"),
    ("retail", "Retail", "shopping-bag"),
    ("real-estate", "Real Estate", "home"),
    ("automotive", "Automotive", "car"),
    ("professional-services", "Professional Services", "briefcase"),
    ("health-beauty", "Health & Beauty", "heart"),
    ("salons", "Salons", "scissors"),
    ("fashion", "Fashion", "shirt"),
];

impl Database {
    pub fn list_categories(&self) -> Result<Vec<CategoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, icon FROM categories ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CategoryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        icon: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn category_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 =
                conn.query_row("SELECT COUNT(*) FROM categories WHERE id = ?1", [id], |row| row.get(0))?;
            Ok(found > 0)
        })
    }

    /// Insert the default categories, leaving existing ids untouched.
    /// Returns how many rows were added.
    pub fn seed_categories(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            for (id, name, icon) in DEFAULT_CATEGORIES {
                added += tx.execute(
                    "INSERT OR IGNORE INTO categories (id, name, icon) VALUES (?1, ?2, ?3)",
                    (id, name, icon),
                )?;
            }
            tx.commit()?;
            Ok(added)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.list_categories().unwrap().is_empty());

        assert_eq!(db.seed_categories().unwrap(), DEFAULT_CATEGORIES.len());
        assert_eq!(db.seed_categories().unwrap(), 0);

        let cats = db.list_categories().unwrap();
        assert_eq!(cats.len(), DEFAULT_CATEGORIES.len());
        assert!(db.category_exists("cafes").unwrap());
        assert!(!db.category_exists("bakeries").unwrap());
    }
}
