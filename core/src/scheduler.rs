//! # Priority Scheduler
//!
//! Decides which access point to harvest next. A [`Scorer`] turns a record into a
//! number; the [`Scheduler`] keeps records ordered by that number and remembers when
//! each target may be tried again.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use harvestr_common::config::{SchedulerConfig, ScoringRule, Weights};
use harvestr_common::error::ConfigError;
use harvestr_common::models::ap::{ApRecord, WpsState};
use harvestr_common::models::harvest::TransactionOutcome;
use harvestr_common::network::mac::{Bssid, Oui};
use regex::Regex;
use tokio::time::Instant;
use tracing::debug;

/// Weighted sum of four signals: vulnerable vendor, signal strength, unlocked WPS and
/// a matching ESSID. Holds no state beyond its configuration.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: Weights,
    ouis: HashSet<Oui>,
    patterns: Vec<Regex>,
    rssi_floor: i16,
    rssi_ceiling: i16,
}

impl Scorer {
    pub fn new(rule: &ScoringRule) -> Result<Self, ConfigError> {
        if rule.rssi_floor >= rule.rssi_ceiling {
            return Err(ConfigError::Invalid(format!(
                "rssi_floor ({}) must be below rssi_ceiling ({})",
                rule.rssi_floor, rule.rssi_ceiling
            )));
        }
        let patterns = rule
            .essid_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            weights: rule.weights,
            ouis: rule.vulnerable_ouis.iter().copied().collect(),
            patterns,
            rssi_floor: rule.rssi_floor,
            rssi_ceiling: rule.rssi_ceiling,
        })
    }

    pub fn score(&self, record: &ApRecord) -> f64 {
        let w = &self.weights;
        let oui = flag(self.ouis.contains(&record.oui()));
        let unlocked = flag(record.wps_state == WpsState::Unlocked);
        let essid = flag(
            !record.is_hidden() && self.patterns.iter().any(|p| p.is_match(&record.essid)),
        );

        w.oui * oui + w.rssi * self.normalized_rssi(record.rssi) + w.wps_unlocked * unlocked + w.essid * essid
    }

    /// Maps dBm onto [0, 1] between the configured floor and ceiling.
    pub fn normalized_rssi(&self, rssi: i16) -> f64 {
        let floor = i32::from(self.rssi_floor);
        let span = f64::from(i32::from(self.rssi_ceiling) - floor);
        (f64::from(i32::from(rssi) - floor) / span).clamp(0.0, 1.0)
    }
}

fn flag(on: bool) -> f64 {
    if on { 1.0 } else { 0.0 }
}

/// A target handed out by [`Scheduler::pop`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarvestQueueEntry {
    pub bssid: Bssid,
    pub score: f64,
    /// When the previous cooldown ended, if the target was tried before.
    pub cooldown_until: Option<Instant>,
}

/// Queue position: score descending, then discovery order, then address.
#[derive(Debug, Clone, Copy)]
struct Rank {
    score: f64,
    discovered: u64,
    bssid: Bssid,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.discovered.cmp(&other.discovered))
            .then_with(|| self.bssid.octets().cmp(&other.bssid.octets()))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

#[derive(Debug)]
pub struct Scheduler {
    scorer: Scorer,
    cooldown: Duration,
    require_wps: bool,
    entries: HashMap<Bssid, Rank>,
    order: BTreeSet<Rank>,
    /// Outlive queue entries, so an evicted AP that comes back still rests.
    cooldowns: HashMap<Bssid, Instant>,
    in_flight: HashSet<Bssid>,
}

impl Scheduler {
    pub fn new(scorer: Scorer, config: &SchedulerConfig) -> Self {
        Self {
            scorer,
            cooldown: config.cooldown,
            require_wps: config.require_wps,
            entries: HashMap::new(),
            order: BTreeSet::new(),
            cooldowns: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Rescores `record` and moves it to its new place. Returns the score.
    pub fn update(&mut self, record: &ApRecord) -> f64 {
        let score = self.scorer.score(record);
        if let Some(old) = self.entries.remove(&record.bssid) {
            self.order.remove(&old);
        }

        if self.is_eligible(record) {
            let rank = Rank {
                score,
                discovered: record.discovered,
                bssid: record.bssid,
            };
            self.entries.insert(record.bssid, rank);
            self.order.insert(rank);
        }
        score
    }

    /// The best target that is neither resting nor already in flight.
    ///
    /// The target stays queued but cannot be popped again until
    /// [`Scheduler::mark_attempted`] or [`Scheduler::release`].
    pub fn pop(&mut self, now: Instant) -> Option<HarvestQueueEntry> {
        let rank = self
            .order
            .iter()
            .find(|rank| !self.in_flight.contains(&rank.bssid) && self.is_rested(&rank.bssid, now))
            .copied()?;

        self.in_flight.insert(rank.bssid);
        Some(HarvestQueueEntry {
            bssid: rank.bssid,
            score: rank.score,
            cooldown_until: self.cooldowns.get(&rank.bssid).copied(),
        })
    }

    /// Starts the cooldown for `bssid`, whatever the outcome. Returns when it ends.
    pub fn mark_attempted(&mut self, bssid: Bssid, outcome: TransactionOutcome, now: Instant) -> Instant {
        self.in_flight.remove(&bssid);
        let until = now + self.cooldown;
        self.cooldowns.insert(bssid, until);
        debug!(bssid = %bssid, %outcome, "cooling down for {:?}", self.cooldown);
        until
    }

    /// Hands a popped target back without an attempt having been made.
    pub fn release(&mut self, bssid: Bssid) {
        self.in_flight.remove(&bssid);
    }

    /// Drops the queue entry. Any cooldown stays on record.
    pub fn remove(&mut self, bssid: &Bssid) {
        if let Some(rank) = self.entries.remove(bssid) {
            self.order.remove(&rank);
        }
    }

    /// Earliest moment a queued, idle target becomes poppable.
    pub fn next_ready(&self, now: Instant) -> Option<Instant> {
        self.order
            .iter()
            .filter(|rank| !self.in_flight.contains(&rank.bssid))
            .map(|rank| self.cooldowns.get(&rank.bssid).copied().unwrap_or(now).max(now))
            .min()
    }

    /// Forgets cooldowns that have run out. Returns how many were dropped.
    pub fn prune_cooldowns(&mut self, now: Instant) -> usize {
        let before = self.cooldowns.len();
        self.cooldowns.retain(|_, until| *until > now);
        before - self.cooldowns.len()
    }

    pub fn ranked(&self) -> Vec<(Bssid, f64)> {
        self.order.iter().map(|rank| (rank.bssid, rank.score)).collect()
    }

    pub fn cooldown_until(&self, bssid: &Bssid) -> Option<Instant> {
        self.cooldowns.get(bssid).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn is_eligible(&self, record: &ApRecord) -> bool {
        !self.require_wps || record.wps_state == WpsState::Unlocked
    }

    fn is_rested(&self, bssid: &Bssid, now: Instant) -> bool {
        self.cooldowns.get(bssid).is_none_or(|until| now >= *until)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use harvestr_common::models::ap::Sighting;

    fn record(last: u8, rssi: i16, wps: WpsState, discovered: u64) -> ApRecord {
        let mut s = Sighting::new(Bssid::new(0x00, 0x11, 0x22, 0x33, 0x44, last));
        s.essid = format!("ap-{last}");
        s.rssi = rssi;
        s.wps_state = wps;
        ApRecord::from_sighting(s, discovered, Instant::now())
    }

    fn rule() -> ScoringRule {
        ScoringRule {
            vulnerable_ouis: vec![Oui([0xC8, 0x3A, 0x35])],
            essid_patterns: vec!["^lab".into()],
            ..ScoringRule::default()
        }
    }

    fn scheduler(require_wps: bool, cooldown: Duration) -> Scheduler {
        let config = SchedulerConfig {
            cooldown,
            require_wps,
        };
        Scheduler::new(Scorer::new(&rule()).unwrap(), &config)
    }

    #[test]
    fn score_is_weighted_sum() {
        let scorer = Scorer::new(&rule()).unwrap();

        let mut vulnerable = record(1, -30, WpsState::Unlocked, 0);
        vulnerable.bssid = Bssid::new(0xC8, 0x3A, 0x35, 0, 0, 1);
        vulnerable.essid = "lab-router".into();
        assert_eq!(scorer.score(&vulnerable), 100.0);

        let floor = record(2, -100, WpsState::Locked, 0);
        assert_eq!(scorer.score(&floor), 0.0);

        let mid = record(3, -65, WpsState::None, 0);
        assert!((scorer.score(&mid) - 15.0).abs() < 1e-9);
        assert_eq!(scorer.score(&mid), scorer.score(&mid.clone()));
    }

    #[test]
    fn rssi_is_clamped() {
        let scorer = Scorer::new(&rule()).unwrap();
        assert_eq!(scorer.normalized_rssi(-120), 0.0);
        assert_eq!(scorer.normalized_rssi(-10), 1.0);
    }

    #[test]
    fn wide_rssi_range_does_not_overflow() {
        let scorer = Scorer::new(&ScoringRule {
            rssi_floor: -200,
            rssi_ceiling: i16::MAX,
            ..ScoringRule::default()
        })
        .unwrap();
        let normalized = scorer.normalized_rssi(-40);
        assert!(normalized > 0.0 && normalized < 0.01, "{normalized}");
        assert_eq!(scorer.normalized_rssi(i16::MIN), 0.0);
        assert_eq!(scorer.normalized_rssi(i16::MAX), 1.0);
    }

    #[test]
    fn hidden_essid_never_matches() {
        let scorer = Scorer::new(&ScoringRule {
            essid_patterns: vec![".*".into()],
            ..ScoringRule::default()
        })
        .unwrap();
        let mut hidden = record(1, -100, WpsState::None, 0);
        hidden.essid.clear();
        assert_eq!(scorer.score(&hidden), 0.0);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let bad = ScoringRule {
            essid_patterns: vec!["(".into()],
            ..ScoringRule::default()
        };
        assert!(matches!(Scorer::new(&bad), Err(ConfigError::Pattern { .. })));
    }

    #[test]
    fn pop_returns_best_and_breaks_ties_by_discovery() {
        let mut sched = scheduler(false, Duration::from_secs(60));
        let now = Instant::now();
        sched.update(&record(1, -60, WpsState::None, 2));
        sched.update(&record(2, -60, WpsState::None, 1));
        sched.update(&record(3, -80, WpsState::None, 0));

        assert_eq!(sched.pop(now).unwrap().bssid, record(2, 0, WpsState::None, 0).bssid);
        assert_eq!(sched.pop(now).unwrap().bssid, record(1, 0, WpsState::None, 0).bssid);
        assert_eq!(sched.pop(now).unwrap().bssid, record(3, 0, WpsState::None, 0).bssid);
        assert!(sched.pop(now).is_none());
    }

    #[test]
    fn update_repositions() {
        let mut sched = scheduler(false, Duration::from_secs(60));
        let weak = record(1, -90, WpsState::None, 0);
        sched.update(&weak);
        sched.update(&record(2, -60, WpsState::None, 1));

        let mut stronger = weak.clone();
        stronger.rssi = -30;
        sched.update(&stronger);

        assert_eq!(sched.len(), 2);
        assert_eq!(sched.ranked()[0].0, weak.bssid);
    }

    #[test]
    fn cooldown_blocks_second_pop() {
        let mut sched = scheduler(false, Duration::from_secs(60));
        let target = record(1, -50, WpsState::Unlocked, 0);
        sched.update(&target);
        let t0 = Instant::now();

        let first = sched.pop(t0).unwrap();
        assert!(first.cooldown_until.is_none());
        assert!(sched.pop(t0).is_none(), "in flight");

        let until = sched.mark_attempted(target.bssid, TransactionOutcome::Timeout, t0);
        assert_eq!(until, t0 + Duration::from_secs(60));
        assert!(sched.pop(t0 + Duration::from_secs(59)).is_none());
        assert_eq!(sched.next_ready(t0), Some(until));

        let again = sched.pop(t0 + Duration::from_secs(60)).unwrap();
        assert_eq!(again.cooldown_until, Some(until));
    }

    #[test]
    fn release_skips_cooldown() {
        let mut sched = scheduler(false, Duration::from_secs(60));
        let target = record(1, -50, WpsState::Unlocked, 0);
        sched.update(&target);
        let now = Instant::now();

        sched.pop(now).unwrap();
        sched.release(target.bssid);
        assert!(sched.pop(now).is_some());
    }

    #[test]
    fn cooldown_survives_removal() {
        let mut sched = scheduler(false, Duration::from_secs(60));
        let target = record(1, -50, WpsState::Unlocked, 0);
        sched.update(&target);
        let now = Instant::now();

        sched.pop(now).unwrap();
        sched.mark_attempted(target.bssid, TransactionOutcome::Error, now);
        sched.remove(&target.bssid);
        assert!(sched.is_empty());

        sched.update(&target);
        assert!(sched.pop(now + Duration::from_secs(1)).is_none());
        assert!(sched.pop(now + Duration::from_secs(61)).is_some());
    }

    #[test]
    fn expired_cooldowns_are_pruned() {
        let mut sched = scheduler(false, Duration::from_secs(60));
        let t0 = Instant::now();
        let early = record(1, -50, WpsState::Unlocked, 0);
        let late = record(2, -50, WpsState::Unlocked, 1);

        sched.mark_attempted(early.bssid, TransactionOutcome::Timeout, t0);
        sched.mark_attempted(late.bssid, TransactionOutcome::Timeout, t0 + Duration::from_secs(30));

        assert_eq!(sched.prune_cooldowns(t0 + Duration::from_secs(59)), 0);
        assert_eq!(sched.prune_cooldowns(t0 + Duration::from_secs(60)), 1);
        assert_eq!(sched.cooldown_until(&early.bssid), None);
        assert!(sched.cooldown_until(&late.bssid).is_some());

        // A pruned target is immediately poppable again.
        sched.update(&early);
        assert!(sched.pop(t0 + Duration::from_secs(60)).is_some());
    }

    #[test]
    fn require_wps_filters_queue() {
        let mut sched = scheduler(true, Duration::from_secs(60));
        let mut target = record(1, -50, WpsState::Unlocked, 0);
        sched.update(&target);
        sched.update(&record(2, -40, WpsState::Locked, 1));
        sched.update(&record(3, -40, WpsState::None, 2));
        assert_eq!(sched.len(), 1);

        target.wps_state = WpsState::Locked;
        sched.update(&target);
        assert!(sched.is_empty());
        assert!(sched.pop(Instant::now()).is_none());
    }
}
