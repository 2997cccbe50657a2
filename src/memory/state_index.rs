//! Resolving screens to stored states by fingerprint similarity

use super::records::State;
use super::store::MemoryStore;
use crate::core::error::Result;
use crate::core::types::{Fingerprint, Screen, StateId};
use crate::perception::image_ops::encode_png;
use crate::tree::SearchTree;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub struct StateIndex {
    pub sim_threshold: f64,
    /// Where screenshots of new states are written, if anywhere
    pub dump_dir: Option<PathBuf>,
}

/// Most similar candidate at or above `threshold`
///
/// Candidates are scanned in the order given; only a strictly greater
/// similarity replaces the current best, so ties go to the earlier one.
pub fn best_match(
    candidates: &[(StateId, Fingerprint)],
    fingerprint: &Fingerprint,
    threshold: f64,
) -> Option<(StateId, f64)> {
    let mut best: Option<(StateId, f64)> = None;
    for (id, candidate) in candidates {
        let sim = fingerprint.cosine_similarity(candidate);
        if best.map(|(_, b)| sim > b).unwrap_or(true) {
            best = Some((*id, sim));
        }
    }
    best.filter(|(_, sim)| *sim >= threshold)
}

impl StateIndex {
    pub fn new(sim_threshold: f64) -> Self {
        Self {
            sim_threshold,
            dump_dir: None,
        }
    }

    pub fn with_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }

    /// Stored state matching the fingerprint, scanning in ascending id order
    pub fn resolve(&self, store: &MemoryStore, fingerprint: &Fingerprint) -> Result<Option<State>> {
        let candidates = store.state_fingerprints()?;
        match best_match(&candidates, fingerprint, self.sim_threshold) {
            Some((id, sim)) => {
                debug!(state_id = %id, similarity = sim, "resolved state");
                store.get_state(id)
            }
            None => Ok(None),
        }
    }

    /// Persist a new state with a fresh tree and no objects or clusters
    pub fn create(
        &self,
        store: &MemoryStore,
        fingerprint: &Fingerprint,
        screenshot: &Screen,
    ) -> Result<State> {
        let state = store.insert_state(fingerprint, &SearchTree::new(), Some(screenshot))?;
        info!(state_id = %state.id, "created state");
        if let Some(dir) = &self.dump_dir {
            // the dump is an audit aid; the state is already stored
            if let Err(e) = self.dump_screenshot(dir, state.id, screenshot) {
                warn!(state_id = %state.id, error = %e, "failed to write state screenshot");
            }
        }
        Ok(state)
    }

    pub fn resolve_or_create(
        &self,
        store: &MemoryStore,
        fingerprint: &Fingerprint,
        screenshot: &Screen,
    ) -> Result<State> {
        match self.resolve(store, fingerprint)? {
            Some(state) => Ok(state),
            None => self.create(store, fingerprint, screenshot),
        }
    }

    fn dump_screenshot(&self, dir: &PathBuf, id: StateId, screenshot: &Screen) -> Result<()> {
        fs::create_dir_all(dir)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let path = dir.join(format!("state_{}_{}.png", id, millis));
        fs::write(path, encode_png(screenshot)?)?;
        Ok(())
    }
}
