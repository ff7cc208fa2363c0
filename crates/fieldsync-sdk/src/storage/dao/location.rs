//! 定位采样 DAO - location_sample 表

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::storage::entities::LocationSample;
use crate::utils::GeoCoordinate;

pub struct LocationDao<'a> {
    conn: &'a Connection,
}

impl<'a> LocationDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn append(&self, coordinate: &GeoCoordinate, accuracy: f64, recorded_at: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO location_sample (latitude, longitude, accuracy, recorded_at, forwarded) VALUES (?1, ?2, ?3, ?4, 0)",
            params![coordinate.latitude, coordinate.longitude, accuracy, recorded_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_unforwarded(&self, limit: usize) -> Result<Vec<LocationSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, latitude, longitude, accuracy, recorded_at, forwarded FROM location_sample WHERE forwarded = 0 ORDER BY recorded_at ASC, id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(LocationSample {
                id: row.get(0)?,
                coordinate: GeoCoordinate::new(row.get(1)?, row.get(2)?),
                accuracy: row.get(3)?,
                recorded_at: row.get(4)?,
                forwarded: row.get::<_, i32>(5)? != 0,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn mark_forwarded(&self, id: i64) -> Result<()> {
        self.conn.execute("UPDATE location_sample SET forwarded = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn count_unforwarded(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM location_sample WHERE forwarded = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
