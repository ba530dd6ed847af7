//! In-process promo code table and redemption history.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::audit::{PromoRedemption, RedemptionLog};
use super::catalog::PromoCatalog;
use super::code::{normalize_code, ContentType, NewPromoCode, PromoCode, PromoCodeUpdate};
use super::validation::{PromoRejection, PromoValidation};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreguardError};

/// Redemptions kept in memory by default. Older ones survive only in the
/// audit log.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Default)]
struct PromoState {
    codes: HashMap<String, PromoCode>,
    redemptions: VecDeque<PromoRedemption>,
}

impl PromoState {
    fn remember(&mut self, redemption: PromoRedemption, limit: usize) {
        self.redemptions.push_back(redemption);
        while self.redemptions.len() > limit {
            self.redemptions.pop_front();
        }
    }
}

/// Promo codes keyed by normalized code, plus every redemption made.
///
/// Checking ([`PromoStore::validate`]) and committing
/// ([`PromoStore::record_usage`]) are separate calls, so two concurrent
/// redemptions can both pass a nearly exhausted `max_uses`.
/// [`PromoStore::redeem`] does both under one write lock and cannot overshoot.
pub struct PromoStore<C: Clock = SystemClock> {
    state: RwLock<PromoState>,
    clock: C,
    audit: Option<RedemptionLog>,
    history_limit: usize,
}

impl PromoStore<SystemClock> {
    /// Create an empty store reading wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for PromoStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> PromoStore<C> {
    /// Create an empty store driven by `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: RwLock::new(PromoState::default()),
            clock,
            audit: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Also append every redemption to `log`.
    pub fn with_audit_log(mut self, log: RedemptionLog) -> Self {
        self.audit = Some(log);
        self
    }

    /// Keep at most `limit` redemptions in memory, dropping the oldest.
    ///
    /// Usage counts are unaffected.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Check whether `code` can be used for the given content right now.
    pub fn validate(&self, code: &str, content_type: ContentType, content_id: &str) -> PromoValidation {
        let now = self.clock.now();
        let key = normalize_code(code);
        let state = self.state.read();

        let result = match state.codes.get(&key) {
            Some(promo) => promo.check(now, content_type, content_id),
            None => Err(PromoRejection::NotFound),
        };

        debug!(
            code = %key,
            content_type = %content_type,
            content_id = %content_id,
            result = ?result,
            "Validated promo code"
        );

        result.into()
    }

    /// Record a use of `code` without re-validating it.
    ///
    /// Callers are expected to have validated first. Returns `None` when the
    /// code does not exist.
    pub fn record_usage(
        &self,
        code: &str,
        email: &str,
        content_type: ContentType,
        content_id: &str,
    ) -> Option<PromoRedemption> {
        let now = self.clock.now();
        let key = normalize_code(code);

        let redemption = {
            let mut state = self.state.write();
            let promo = state.codes.get_mut(&key)?;
            promo.used_count = promo.used_count.saturating_add(1);
            let discount = promo.discount_percent;

            let redemption = new_redemption(key, email, content_type, content_id, discount, now);
            state.remember(redemption.clone(), self.history_limit);
            redemption
        };

        self.after_redemption(&redemption);
        Some(redemption)
    }

    /// Validate and record in one step.
    ///
    /// The usage-limit check and the increment happen under the same write
    /// lock, so concurrent redemptions never exceed `max_uses`.
    pub fn redeem(
        &self,
        code: &str,
        email: &str,
        content_type: ContentType,
        content_id: &str,
    ) -> std::result::Result<PromoRedemption, PromoRejection> {
        let now = self.clock.now();
        let key = normalize_code(code);

        let redemption = {
            let mut state = self.state.write();
            let promo = state
                .codes
                .get_mut(&key)
                .ok_or(PromoRejection::NotFound)?;
            let discount = promo.check(now, content_type, content_id)?;
            promo.used_count = promo.used_count.saturating_add(1);

            let redemption = new_redemption(key, email, content_type, content_id, discount, now);
            state.remember(redemption.clone(), self.history_limit);
            redemption
        };

        self.after_redemption(&redemption);
        Ok(redemption)
    }

    /// Add a new code.
    pub fn create(&self, data: NewPromoCode) -> Result<PromoCode> {
        let promo = data.into_promo_code()?;

        let mut state = self.state.write();
        if state.codes.contains_key(&promo.code) {
            return Err(StoreguardError::validation(format!(
                "promo code {} already exists",
                promo.code
            )));
        }
        state.codes.insert(promo.code.clone(), promo.clone());

        info!(
            code = %promo.code,
            discount = promo.discount_percent,
            "Promo code created"
        );
        Ok(promo)
    }

    /// Merge `update` into an existing code.
    ///
    /// Returns `Ok(None)` when the code does not exist.
    pub fn update(&self, code: &str, update: PromoCodeUpdate) -> Result<Option<PromoCode>> {
        let key = normalize_code(code);
        let mut state = self.state.write();

        let Some(current) = state.codes.get_mut(&key) else {
            return Ok(None);
        };
        let updated = update.apply(current)?;
        *current = updated.clone();

        info!(code = %key, "Promo code updated");
        Ok(Some(updated))
    }

    /// Remove a code, reporting whether it existed.
    ///
    /// Past redemptions of the code are kept.
    pub fn delete(&self, code: &str) -> bool {
        let key = normalize_code(code);
        let removed = self.state.write().codes.remove(&key).is_some();
        if removed {
            info!(code = %key, "Promo code deleted");
        }
        removed
    }

    /// Look up a single code.
    pub fn get(&self, code: &str) -> Option<PromoCode> {
        self.state.read().codes.get(&normalize_code(code)).cloned()
    }

    /// Every code, ordered by code string.
    pub fn list(&self) -> Vec<PromoCode> {
        let mut codes: Vec<PromoCode> = self.state.read().codes.values().cloned().collect();
        codes.sort_by(|a, b| a.code.cmp(&b.code));
        codes
    }

    /// Redemptions in the order they were made, optionally for one code.
    pub fn redemptions(&self, code: Option<&str>) -> Vec<PromoRedemption> {
        let state = self.state.read();
        match code.map(normalize_code) {
            Some(key) => state
                .redemptions
                .iter()
                .filter(|r| r.code == key)
                .cloned()
                .collect(),
            None => state.redemptions.iter().cloned().collect(),
        }
    }

    /// Seed the store from a catalog, returning how many codes were added.
    pub fn load_catalog(&self, catalog: PromoCatalog) -> Result<usize> {
        let mut loaded = 0;
        for entry in catalog.promo_codes {
            self.create(entry)?;
            loaded += 1;
        }
        info!(count = loaded, "Loaded promo catalog");
        Ok(loaded)
    }

    /// Rebuild usage counts and history from the audit log.
    ///
    /// Call after seeding codes: every logged redemption of a known code
    /// counts against its `max_uses` again. Redemptions of codes that no
    /// longer exist are kept in the history only. Returns how many
    /// redemptions were replayed.
    pub fn replay_audit_log(&self) -> Result<usize> {
        let Some(log) = &self.audit else {
            return Ok(0);
        };
        let redemptions = log.load()?;
        let replayed = redemptions.len();

        let mut state = self.state.write();
        let mut orphaned = 0;
        for redemption in redemptions {
            match state.codes.get_mut(&redemption.code) {
                Some(promo) => promo.used_count = promo.used_count.saturating_add(1),
                None => orphaned += 1,
            }
            state.remember(redemption, self.history_limit);
        }

        info!(
            path = %log.path().display(),
            replayed = replayed,
            orphaned = orphaned,
            "Replayed redemption log"
        );
        Ok(replayed)
    }

    fn after_redemption(&self, redemption: &PromoRedemption) {
        info!(
            code = %redemption.code,
            content_type = %redemption.content_type,
            content_id = %redemption.content_id,
            redemption_id = %redemption.id,
            "Promo code redeemed"
        );

        if let Some(log) = &self.audit {
            if let Err(e) = log.append(redemption) {
                warn!(
                    error = %e,
                    path = %log.path().display(),
                    "Failed to append redemption to audit log"
                );
            }
        }
    }
}

fn new_redemption(
    code: String,
    email: &str,
    content_type: ContentType,
    content_id: &str,
    discount_percent: u8,
    now: chrono::DateTime<chrono::Utc>,
) -> PromoRedemption {
    PromoRedemption {
        id: Uuid::new_v4(),
        code,
        email: email.trim().to_string(),
        content_type,
        content_id: content_id.trim().to_string(),
        discount_percent,
        redeemed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn store() -> (PromoStore<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (PromoStore::with_clock(clock.clone()), clock)
    }

    fn save20() -> NewPromoCode {
        NewPromoCode::new("SAVE20", 20).for_content_type(ContentType::Meditation)
    }

    #[test]
    fn test_validate_matching_code() {
        let (store, _) = store();
        assert_ok!(store.create(save20()));

        let result = store.validate("SAVE20", ContentType::Meditation, "morning-mindfulness");
        assert!(result.valid);
        assert_eq!(result.discount, 20);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let (store, _) = store();
        assert_ok!(store.create(save20()));

        assert!(store.validate(" save20 ", ContentType::Meditation, "x").valid);
        assert!(store.get("Save20").is_some());
    }

    #[test]
    fn test_unknown_code() {
        let (store, _) = store();
        let result = store.validate("NOPE", ContentType::Book, "field-notes");

        assert!(!result.valid);
        assert_eq!(result.message, "Code not found");
    }

    #[test]
    fn test_usage_limit() {
        let (store, _) = store();
        assert_ok!(store.create(save20().with_max_uses(2)));

        for email in ["a@example.com", "b@example.com"] {
            assert!(store.validate("SAVE20", ContentType::Meditation, "m1").valid);
            assert!(store
                .record_usage("SAVE20", email, ContentType::Meditation, "m1")
                .is_some());
        }

        let result = store.validate("SAVE20", ContentType::Meditation, "m1");
        assert!(!result.valid);
        assert!(result.message.contains("usage limit"));
    }

    #[test]
    fn test_expired_code() {
        let (store, clock) = store();
        let until = clock.now() + Duration::days(1);
        assert_ok!(store.create(save20().valid_between(None, Some(until))));

        clock.advance(Duration::days(2));

        let result = store.validate("SAVE20", ContentType::Meditation, "m1");
        assert!(!result.valid);
        assert!(result.message.contains("expired"));
    }

    #[test]
    fn test_record_usage_increments_once() {
        let (store, clock) = store();
        assert_ok!(store.create(save20()));

        let redemption = store
            .record_usage("save20", "fan@example.com", ContentType::Meditation, "morning-mindfulness")
            .unwrap();

        assert_eq!(store.get("SAVE20").unwrap().used_count, 1);
        let redemptions = store.redemptions(Some("SAVE20"));
        assert_eq!(redemptions, vec![redemption.clone()]);
        assert_eq!(redemption.code, "SAVE20");
        assert_eq!(redemption.email, "fan@example.com");
        assert_eq!(redemption.content_type, ContentType::Meditation);
        assert_eq!(redemption.content_id, "morning-mindfulness");
        assert_eq!(redemption.discount_percent, 20);
        assert_eq!(redemption.redeemed_at, clock.now());
    }

    #[test]
    fn test_record_usage_unknown_code() {
        let (store, _) = store();
        assert!(store
            .record_usage("GHOST", "a@example.com", ContentType::Book, "b1")
            .is_none());
        assert!(store.redemptions(None).is_empty());
    }

    #[test]
    fn test_record_usage_does_not_revalidate() {
        let (store, _) = store();
        assert_ok!(store.create(save20().with_max_uses(1)));

        assert!(store.record_usage("SAVE20", "a@example.com", ContentType::Meditation, "m").is_some());
        assert!(store.record_usage("SAVE20", "b@example.com", ContentType::Meditation, "m").is_some());
        assert_eq!(store.get("SAVE20").unwrap().used_count, 2);
    }

    #[test]
    fn test_redeem_is_atomic_check_and_commit() {
        let (store, _) = store();
        assert_ok!(store.create(save20().with_max_uses(1)));

        assert_ok!(store.redeem("SAVE20", "a@example.com", ContentType::Meditation, "m"));
        let rejection = assert_err!(store.redeem("SAVE20", "b@example.com", ContentType::Meditation, "m"));

        assert_eq!(rejection, PromoRejection::UsageLimitReached);
        assert_eq!(store.get("SAVE20").unwrap().used_count, 1);
        assert_eq!(store.redemptions(None).len(), 1);
    }

    #[test]
    fn test_concurrent_redeem_never_overshoots() {
        let store = Arc::new(PromoStore::new());
        assert_ok!(store.create(NewPromoCode::new("LIMITED", 50).with_max_uses(10)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..5)
                        .filter(|j| {
                            store
                                .redeem(
                                    "LIMITED",
                                    &format!("user{}-{}@example.com", i, j),
                                    ContentType::Book,
                                    "b1",
                                )
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();
        let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(succeeded, 10);
        assert_eq!(store.get("LIMITED").unwrap().used_count, 10);
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let (store, _) = store();
        assert_ok!(store.create(save20()));

        let err = assert_err!(store.create(NewPromoCode::new("save20", 5)));
        assert!(matches!(err, StoreguardError::Validation(_)));
        assert_eq!(store.get("SAVE20").unwrap().discount_percent, 20);
    }

    #[test]
    fn test_create_then_delete() {
        let (store, _) = store();
        assert_ok!(store.create(save20()));
        assert!(store.validate("SAVE20", ContentType::Meditation, "m").valid);

        assert!(store.delete("save20"));
        assert!(!store.delete("save20"));

        let result = store.validate("SAVE20", ContentType::Meditation, "m");
        assert_eq!(result.message, "Code not found");
    }

    #[test]
    fn test_update() {
        let (store, _) = store();
        assert_ok!(store.create(save20()));

        let updated = assert_ok!(store.update(
            "SAVE20",
            PromoCodeUpdate {
                active: Some(false),
                ..Default::default()
            }
        ));
        assert_eq!(updated.map(|p| p.active), Some(false));

        let result = store.validate("SAVE20", ContentType::Meditation, "m");
        assert_eq!(result.message, "Code is no longer active");

        assert_eq!(
            assert_ok!(store.update("MISSING", PromoCodeUpdate::default())),
            None
        );
    }

    #[test]
    fn test_invalid_update_leaves_code_untouched() {
        let (store, _) = store();
        assert_ok!(store.create(save20()));

        assert_err!(store.update(
            "SAVE20",
            PromoCodeUpdate {
                discount_percent: Some(150),
                ..Default::default()
            }
        ));
        assert_eq!(store.get("SAVE20").unwrap().discount_percent, 20);
    }

    #[test]
    fn test_list_is_sorted() {
        let (store, _) = store();
        for code in ["ZEN", "BOOKWORM", "CALM"] {
            assert_ok!(store.create(NewPromoCode::new(code, 10)));
        }

        let codes: Vec<String> = store.list().into_iter().map(|p| p.code).collect();
        assert_eq!(codes, vec!["BOOKWORM", "CALM", "ZEN"]);
    }

    #[test]
    fn test_redemptions_are_written_to_audit_log() {
        let path = std::env::temp_dir().join(format!("storeguard-audit-{}.jsonl", Uuid::new_v4()));
        let store = PromoStore::new().with_audit_log(RedemptionLog::new(&path));
        assert_ok!(store.create(NewPromoCode::new("FREEBOOK", 100)));

        assert_ok!(store.redeem("FREEBOOK", "reader@example.com", ContentType::Book, "field-notes"));

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("reader@example.com"));
    }

    fn restarted_store(catalog: &str, log: &std::path::Path) -> PromoStore {
        let store = PromoStore::new().with_audit_log(RedemptionLog::new(log));
        assert_ok!(store.load_catalog(assert_ok!(PromoCatalog::from_yaml(catalog))));
        assert_ok!(store.replay_audit_log());
        store
    }

    #[test]
    fn test_usage_limit_survives_restart() {
        let path = std::env::temp_dir().join(format!("storeguard-audit-{}.jsonl", Uuid::new_v4()));
        let catalog = "- code: ONCE\n  discount_percent: 50\n  max_uses: 1\n";

        let first = restarted_store(catalog, &path);
        assert_ok!(first.redeem("ONCE", "a@example.com", ContentType::Book, "b1"));
        drop(first);

        let second = restarted_store(catalog, &path);
        let rejection = assert_err!(second.redeem("ONCE", "b@example.com", ContentType::Book, "b1"));
        let history = second.redemptions(Some("ONCE"));
        let used = second.get("ONCE").unwrap().used_count;
        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(rejection, PromoRejection::UsageLimitReached);
        assert_eq!(used, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].email, "a@example.com");
        assert_eq!(lines, 1);
    }

    #[test]
    fn test_replay_keeps_redemptions_of_removed_codes() {
        let path = std::env::temp_dir().join(format!("storeguard-audit-{}.jsonl", Uuid::new_v4()));

        let first = restarted_store("- code: GONE\n  discount_percent: 10\n", &path);
        assert_ok!(first.redeem("GONE", "a@example.com", ContentType::Meditation, "m"));
        drop(first);

        let second = restarted_store("- code: OTHER\n  discount_percent: 10\n", &path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(second.redemptions(Some("GONE")).len(), 1);
        assert_eq!(second.get("OTHER").unwrap().used_count, 0);
    }

    #[test]
    fn test_replay_without_audit_log_is_noop() {
        let (store, _) = store();
        assert_eq!(assert_ok!(store.replay_audit_log()), 0);
    }

    #[test]
    fn test_history_limit_drops_oldest() {
        let store = PromoStore::new().with_history_limit(2);
        assert_ok!(store.create(NewPromoCode::new("CALM", 10)));

        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            assert_ok!(store.redeem("CALM", email, ContentType::Meditation, "m"));
        }

        let emails: Vec<String> = store.redemptions(None).into_iter().map(|r| r.email).collect();
        assert_eq!(emails, vec!["b@example.com", "c@example.com"]);
        assert_eq!(store.get("CALM").unwrap().used_count, 3);
    }
}
