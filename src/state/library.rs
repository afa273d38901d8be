use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::data::{Eligibility, ImageId, ImageMetadata, ImageRecord};
use super::ratings::{RatingBook, Sentiment, Tier, TierRound};
use crate::curation::Stage;
use crate::error::{Error, Result};

const SAMPLE_STAGE: &str = "sample";

const IMAGE_COLUMNS: &str = "id, filename, path, metadata_json, \
     scrape_eligible, gallery_eligible, sample_eligible";

/// The Library manages the SQLite catalog database.
/// It stores image records, their tag metadata, eligibility flags,
/// every rating the client has given and the current curation stage.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

impl Library {
    /// Open (or create) the catalog at `db_path` and initialize the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        info!("Catalog opened at {}", db_path.display());

        let mut library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Throwaway catalog, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut library = Library {
            conn,
            db_path: PathBuf::from(":memory:"),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Get the path where the catalog should be stored by default:
    /// - Linux: ~/.local/share/gallery-curator/catalog.db
    /// - macOS: ~/Library/Application Support/gallery-curator/catalog.db
    /// - Windows: %APPDATA%\gallery-curator\catalog.db
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| Error::Config("Could not determine user data directory".to_string()))?;

        path.push("gallery-curator");
        path.push("catalog.db");
        Ok(path)
    }

    /// Create all tables and indexes if they don't exist.
    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS images (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                path             TEXT NOT NULL UNIQUE,
                filename         TEXT NOT NULL,
                imported_at      INTEGER NOT NULL,
                analyzed_at      INTEGER,
                metadata_json    TEXT NOT NULL DEFAULT '{}',
                scrape_eligible  INTEGER NOT NULL DEFAULT 1,
                gallery_eligible INTEGER NOT NULL DEFAULT 1,
                sample_eligible  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS ratings (
                image_id  INTEGER NOT NULL,
                stage     TEXT NOT NULL,
                value     TEXT NOT NULL,
                PRIMARY KEY (image_id, stage),
                FOREIGN KEY(image_id) REFERENCES images(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS session (
                key    TEXT PRIMARY KEY,
                value  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_images_analyzed_at
                ON images(analyzed_at);",
        )?;

        debug!("Catalog schema initialized");
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get a count of images in the library
    pub fn image_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Import a new image into the library.
    ///
    /// Returns the new id, or `None` when the path is already catalogued.
    pub fn import_image(&self, path: &str, filename: &str) -> Result<Option<ImageId>> {
        let record = ImageRecord::new(ImageId(0), filename, path);
        let metadata_json = serde_json::to_string(&record.metadata)?;

        let result = self.conn.execute(
            "INSERT INTO images (path, filename, imported_at, metadata_json) VALUES (?1, ?2, ?3, ?4)",
            params![path, filename, Utc::now().timestamp(), metadata_json],
        );

        match result {
            Ok(_) => Ok(Some(ImageId(self.conn.last_insert_rowid()))),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                debug!("Skipping duplicate {}", path);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All images, in import order
    pub fn get_all_images(&self) -> Result<Vec<ImageRecord>> {
        let sql = format!("SELECT {} FROM images ORDER BY id ASC", IMAGE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let images = stmt
            .query_map([], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    pub fn get_image(&self, id: ImageId) -> Result<ImageRecord> {
        let sql = format!("SELECT {} FROM images WHERE id = ?1", IMAGE_COLUMNS);
        self.conn
            .query_row(&sql, params![id.0], image_from_row)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("image {}", id)))
    }

    /// Images that have never been through feature extraction
    pub fn get_pending_analysis(&self, limit: usize) -> Result<Vec<ImageRecord>> {
        let sql = format!(
            "SELECT {} FROM images WHERE analyzed_at IS NULL ORDER BY id ASC LIMIT ?1",
            IMAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let images = stmt
            .query_map(params![limit as i64], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    /// Store new metadata for an image; `analyzed` stamps the extraction time
    pub fn update_metadata(&self, id: ImageId, metadata: &ImageMetadata, analyzed: bool) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        let changed = if analyzed {
            self.conn.execute(
                "UPDATE images SET metadata_json = ?1, analyzed_at = ?2 WHERE id = ?3",
                params![json, Utc::now().timestamp(), id.0],
            )?
        } else {
            self.conn.execute(
                "UPDATE images SET metadata_json = ?1 WHERE id = ?2",
                params![json, id.0],
            )?
        };
        expect_row(changed, id)
    }

    pub fn set_eligibility(&self, id: ImageId, eligibility: Eligibility) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET scrape_eligible = ?1, gallery_eligible = ?2, sample_eligible = ?3
             WHERE id = ?4",
            params![
                eligibility.scrape_eligible,
                eligibility.gallery_eligible,
                eligibility.sample_eligible,
                id.0
            ],
        )?;
        expect_row(changed, id)
    }

    /// Read every stored rating into a snapshot
    pub fn load_ratings(&self) -> Result<RatingBook> {
        let mut book = RatingBook::new();

        let mut stmt = self
            .conn
            .prepare("SELECT image_id, stage, value FROM ratings ORDER BY image_id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (image_id, stage, value) in rows {
            let id = ImageId(image_id);
            if stage == SAMPLE_STAGE {
                let sentiment: Sentiment = value.parse().map_err(Error::InvalidInput)?;
                book.rate_sample(id, sentiment);
            } else {
                let round: TierRound = stage.parse().map_err(Error::InvalidInput)?;
                let code: u8 = value
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad tier code '{}'", value)))?;
                book.set_tier(round, id, Tier::try_from(code).map_err(Error::InvalidInput)?);
            }
        }

        let revision = self
            .session_value("ratings_revision")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        book.set_revision(revision);
        Ok(book)
    }

    /// Replace the stored ratings with `book`
    pub fn save_ratings(&mut self, book: &RatingBook) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM ratings", [])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO ratings (image_id, stage, value) VALUES (?1, ?2, ?3)")?;
            for (id, sentiment) in book.samples() {
                insert.execute(params![id.0, SAMPLE_STAGE, sentiment.as_str()])?;
            }
            for round in [TierRound::Round1, TierRound::Round2] {
                for (id, tier) in book.tiers(round) {
                    insert.execute(params![id.0, round.as_str(), u8::from(*tier).to_string()])?;
                }
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO session (key, value) VALUES ('ratings_revision', ?1)",
            params![book.revision().to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_stage(&self) -> Result<Stage> {
        match self.session_value("stage")? {
            Some(value) => value.parse().map_err(Error::InvalidInput),
            None => Ok(Stage::default()),
        }
    }

    pub fn save_stage(&self, stage: Stage) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO session (key, value) VALUES ('stage', ?1)",
            params![stage.as_str()],
        )?;
        Ok(())
    }

    fn session_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM session WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let metadata_json: String = row.get(3)?;
    let metadata: ImageMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(ImageRecord {
        id: ImageId(row.get(0)?),
        name: row.get(1)?,
        source: row.get(2)?,
        metadata: metadata.normalized(),
        eligibility: Eligibility {
            scrape_eligible: row.get(4)?,
            gallery_eligible: row.get(5)?,
            sample_eligible: row.get(6)?,
        },
    })
}

fn expect_row(changed: usize, id: ImageId) -> Result<()> {
    if changed == 0 {
        Err(Error::NotFound(format!("image {}", id)))
    } else {
        Ok(())
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
