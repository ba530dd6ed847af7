//! Append-only redemption log.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::code::ContentType;
use crate::error::Result;

/// One recorded use of a promo code. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoRedemption {
    pub id: Uuid,
    pub code: String,
    pub email: String,
    pub content_type: ContentType,
    pub content_id: String,
    /// Discount the code granted at the time of redemption
    pub discount_percent: u8,
    pub redeemed_at: DateTime<Utc>,
}

/// Writes redemptions to a JSON Lines file, one object per line.
#[derive(Debug)]
pub struct RedemptionLog {
    path: PathBuf,
    /// Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl RedemptionLog {
    /// Log to `path`; the file is created on first append.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one redemption.
    pub fn append(&self, redemption: &PromoRedemption) -> Result<()> {
        let mut line = serde_json::to_string(redemption)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back every redemption in the order it was written.
    ///
    /// A missing file is an empty log. Lines that fail to parse, such as a
    /// write torn by a crash, are skipped with a warning.
    pub fn load(&self) -> Result<Vec<PromoRedemption>> {
        let _guard = self.write_lock.lock();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut redemptions = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(redemption) => redemptions.push(redemption),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable redemption log line"
                ),
            }
        }
        Ok(redemptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redemption(email: &str) -> PromoRedemption {
        PromoRedemption {
            id: Uuid::new_v4(),
            code: "SAVE20".to_string(),
            email: email.to_string(),
            content_type: ContentType::Meditation,
            content_id: "morning-mindfulness".to_string(),
            discount_percent: 20,
            redeemed_at: Utc::now(),
        }
    }

    #[test]
    fn test_appends_json_lines() {
        let path = std::env::temp_dir().join(format!("redemptions-{}.jsonl", Uuid::new_v4()));
        let log = RedemptionLog::new(&path);

        let first = redemption("a@example.com");
        let second = redemption("b@example.com");
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        std::fs::remove_file(&path).unwrap();

        let parsed: Vec<PromoRedemption> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, vec![first, second]);
        assert!(contents.contains("\"content_type\":\"meditation\""));
    }

    #[test]
    fn test_load_reads_back_appended_lines() {
        let path = std::env::temp_dir().join(format!("redemptions-{}.jsonl", Uuid::new_v4()));
        let log = RedemptionLog::new(&path);

        let first = redemption("a@example.com");
        let second = redemption("b@example.com");
        log.append(&first).unwrap();
        log.append(&second).unwrap();
        let loaded = log.load().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let path = std::env::temp_dir().join(format!("redemptions-{}.jsonl", Uuid::new_v4()));
        assert!(RedemptionLog::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn test_load_skips_torn_lines() {
        let path = std::env::temp_dir().join(format!("redemptions-{}.jsonl", Uuid::new_v4()));
        let log = RedemptionLog::new(&path);

        let kept = redemption("a@example.com");
        log.append(&kept).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\n{\"id\":\"trunc").unwrap();
        drop(file);

        let loaded = log.load().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, vec![kept]);
    }

    #[test]
    fn test_unwritable_path_errors() {
        let log = RedemptionLog::new("/nonexistent-dir/redemptions.jsonl");
        assert!(log.append(&redemption("a@example.com")).is_err());
    }
}
